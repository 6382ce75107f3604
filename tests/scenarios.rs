#![allow(missing_docs)]

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use reclaim_engine::daemon::automation::{
        AutomationSettings, MAX_INTERVAL_MINUTES, MAX_TOP_ITEMS, MIN_INTERVAL_MINUTES, MIN_TOP_ITEMS,
    };
    use reclaim_engine::scanner::protection::PathSafetyClassifier;
    use reclaim_engine::scanner::retention::CrashDumpRetentionPolicy;
    use reclaim_engine::scanner::scoring::ScoringEngine;
    use reclaim_engine::scanner::target::{FileContext, TargetCategory, TargetDefinition};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 20, 9, 0, 0).single().expect("valid")
    }

    fn file(path: &str, size_bytes: u64, age: Duration) -> FileContext {
        let full_path = PathBuf::from(path);
        let name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = reclaim_engine::scanner::target::extension_of(&name);
        let modified = now() - age;
        FileContext {
            name,
            full_path,
            extension,
            size_bytes,
            last_modified: modified,
            last_accessed: modified,
            created: modified,
            is_hidden: false,
            is_system: false,
            is_recently_modified: false,
        }
    }

    #[test]
    fn stale_large_temp_file_is_included() {
        let engine = ScoringEngine::default();
        let target = TargetDefinition::new(TargetCategory::Temp, "Temporary files", "/var/tmp");
        let context = file("/var/tmp/setup-cache.tmp", 150 * 1024 * 1024, Duration::days(90));

        let result = engine.evaluate_file(&target, &context, now());
        assert!(result.should_include);
        assert!(result.confidence >= 0.55, "{result:?}");
        assert!(
            result.signals.iter().any(|s| s.contains("Temporary extension")),
            "{:?}",
            result.signals
        );
    }

    #[test]
    fn fresh_system_library_scores_low() {
        let engine = ScoringEngine::default();
        let target = TargetDefinition::new(TargetCategory::Cache, "App cache", "/opt/app/cache");
        let mut context = file("/opt/app/cache/render.dll", 25 * 1024 * 1024, Duration::minutes(10));
        context.is_system = true;
        context.is_recently_modified = true;

        let result = engine.evaluate_file(&target, &context, now());
        assert!(!result.should_include);
        assert!(result.confidence <= 0.2, "{result:?}");
        assert!(result.signals.iter().any(|s| s.contains("System")), "{:?}", result.signals);
    }

    #[test]
    fn stale_temp_outranks_fresh_system_under_any_threshold() {
        let engine = ScoringEngine::default();
        let target = TargetDefinition::new(TargetCategory::Temp, "Temporary files", "/var/tmp");
        let stale = file("/var/tmp/a.tmp", 1024, Duration::days(30));
        let mut fresh = file("/var/tmp/b.sys", 1024, Duration::minutes(1));
        fresh.is_system = true;
        fresh.is_recently_modified = true;
        let stale_score = engine.evaluate_file(&target, &stale, now()).confidence;
        let fresh_score = engine.evaluate_file(&target, &fresh, now()).confidence;
        assert!(stale_score > fresh_score);
    }

    #[test]
    fn retention_protects_the_newest_dumps_of_each_program() {
        let dumps: Vec<_> = (1..=4)
            .map(|i| file(&format!("/dumps/editor.{i}.dmp"), 4096, Duration::days(10 - i)))
            .collect();
        let protected = CrashDumpRetentionPolicy::new(2).paths_to_protect(&dumps);

        assert_eq!(protected.len(), 2);
        assert!(protected.contains(&PathBuf::from("/dumps/editor.4.dmp")));
        assert!(protected.contains(&PathBuf::from("/dumps/editor.3.dmp")));
        assert!(!protected.contains(&PathBuf::from("/dumps/editor.1.dmp")));
        assert!(!protected.contains(&PathBuf::from("/dumps/editor.2.dmp")));
    }

    #[test]
    fn retention_keeps_small_groups_whole() {
        let dumps = vec![
            file("/dumps/solo.1.dmp", 10, Duration::days(3)),
            file("/dumps/other.1.dmp", 10, Duration::days(2)),
        ];
        let protected = CrashDumpRetentionPolicy::new(2).paths_to_protect(&dumps);
        assert_eq!(protected.len(), 2);
    }

    #[test]
    fn out_of_range_settings_clamp_on_normalization() {
        let low = AutomationSettings {
            interval_minutes: MIN_INTERVAL_MINUTES - 1,
            ..AutomationSettings::default()
        }
        .normalized();
        assert_eq!(low.interval_minutes, MIN_INTERVAL_MINUTES);

        let high = AutomationSettings {
            top_item_count: MAX_TOP_ITEMS + 1,
            ..AutomationSettings::default()
        }
        .normalized();
        assert_eq!(high.top_item_count, MAX_TOP_ITEMS);
    }

    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-zA-Z0-9_-]{1,12}",
            Just("..".to_string()),
            Just(".".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn classification_is_deterministic(segments in prop::collection::vec(segment(), 0..8)) {
            let classifier = PathSafetyClassifier::with_additional_roots(&["/srv/critical"]).expect("classifier");
            let raw = format!("/{}", segments.join("/"));
            let first = classifier.classify(&raw).map_err(|e| e.code());
            let second = classifier.classify(&raw).map_err(|e| e.code());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn traversal_cannot_escape_into_an_unprotected_verdict(
            prefix in prop::collection::vec("[a-z]{1,8}", 1..4),
            leaf in "[a-z]{1,8}"
        ) {
            let classifier = PathSafetyClassifier::builtin();
            let ups = "../".repeat(prefix.len());
            let raw = format!("/{}/{ups}etc/{leaf}", prefix.join("/"));
            prop_assert!(classifier.is_critical_path(&raw).expect("absolute path"));
        }

        #[test]
        fn relative_and_blank_input_is_rejected(leaf in "[a-z]{1,8}", blanks in " {0,4}") {
            let classifier = PathSafetyClassifier::builtin();
            let relative = format!("relative/{leaf}");
            prop_assert!(classifier.classify(&relative).is_err());
            prop_assert!(classifier.classify(&blanks).is_err());
        }

        #[test]
        fn normalized_settings_always_land_in_range(interval in any::<u32>(), top in any::<usize>()) {
            let settings = AutomationSettings {
                interval_minutes: interval,
                top_item_count: top,
                ..AutomationSettings::default()
            }
            .normalized();
            prop_assert!((MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&settings.interval_minutes));
            prop_assert!((MIN_TOP_ITEMS..=MAX_TOP_ITEMS).contains(&settings.top_item_count));
            prop_assert_eq!(settings.clone().normalized(), settings);
        }
    }
}
