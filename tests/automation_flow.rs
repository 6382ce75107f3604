#![allow(missing_docs)]

mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use filetime::FileTime;

    use reclaim_engine::core::cancel::CancellationToken;
    use reclaim_engine::core::clock::{Clock, FixedClock};
    use reclaim_engine::core::config::Config;
    use reclaim_engine::daemon::automation::AutomationSettings;
    use reclaim_engine::daemon::scheduler::{AutomationScheduler, RunOutcome, SchedulerParts};
    use reclaim_engine::daemon::settings_store::MemorySettingsStore;
    use reclaim_engine::deletion::model::{DeletionDisposition, DeletionOptions};
    use reclaim_engine::deletion::pipeline::DeletionPipeline;
    use reclaim_engine::logger::MemoryAuditSink;
    use reclaim_engine::platform::locks::NoLockInspector;
    use reclaim_engine::platform::pal::Platform;
    use reclaim_engine::scanner::preview::PreviewBuilder;
    use reclaim_engine::scanner::protection::PathSafetyClassifier;
    use reclaim_engine::scanner::target::{TargetCategory, TargetDefinition};

    use super::common::{native_platform, write_file};

    #[test]
    fn scheduled_run_cleans_and_keeps_newest_dumps() {
        let state = tempfile::tempdir().expect("state dir");
        let temp_root = tempfile::tempdir().expect("temp target");
        let dump_parent = tempfile::tempdir().expect("dump parent");
        let dump_root = dump_parent.path().join("crashdumps");

        let stale_a = write_file(temp_root.path(), "installer.tmp", 2048);
        let stale_b = write_file(temp_root.path(), "render.tmp", 1024);
        let real_now = Utc::now();
        let dumps: Vec<_> = (1..=4_i64)
            .map(|i| {
                let path = write_file(&dump_root, &format!("app.{i}.dmp"), 512);
                let modified = real_now - Duration::hours(10 - i);
                filetime::set_file_mtime(&path, FileTime::from_unix_time(modified.timestamp(), 0))
                    .expect("set mtime");
                path
            })
            .collect();

        let clock = Arc::new(FixedClock::new(real_now + Duration::days(120)));
        let clock_dyn: Arc<dyn Clock> = clock;
        let platform: Arc<dyn Platform> = native_platform(state.path());
        let preview = Arc::new(PreviewBuilder::from_config(&Config::default(), Arc::clone(&platform)));
        let pipeline = Arc::new(DeletionPipeline::new(
            PathSafetyClassifier::builtin(),
            platform,
            Arc::clone(&clock_dyn),
        ));
        let store = Arc::new(MemorySettingsStore::with_settings(AutomationSettings {
            enabled: true,
            ..AutomationSettings::default()
        }));
        let audit = Arc::new(MemoryAuditSink::new());

        let scheduler = AutomationScheduler::new(SchedulerParts {
            preview,
            pipeline,
            store: store.clone(),
            audit: audit.clone(),
            locks: Arc::new(NoLockInspector),
            clock: clock_dyn,
            targets: vec![
                TargetDefinition::new(TargetCategory::Temp, "Temp", temp_root.path()),
                TargetDefinition::new(TargetCategory::CrashDumps, "Crash dumps", &dump_root),
            ],
            base_options: DeletionOptions::default(),
        })
        .expect("scheduler");

        let outcome = scheduler.run_once(&CancellationToken::new());
        let RunOutcome::Completed { result, locked_skipped } = outcome else {
            panic!("expected completed run, got {outcome:?}");
        };
        assert_eq!(locked_skipped, 0);
        assert_eq!(result.deleted_count, 3, "{result:?}");
        assert_eq!(result.failed_count, 0);
        assert!(result.entries.iter().all(|entry| entry.disposition == DeletionDisposition::Deleted));
        assert_eq!(result.bytes_freed, 2048 + 1024 + 512);

        assert!(!stale_a.exists());
        assert!(!stale_b.exists());
        assert!(!dumps[0].exists(), "oldest dump goes");
        assert!(dumps[1..].iter().all(|dump| dump.exists()), "three newest stay");

        assert!(scheduler.settings().last_run_utc.is_some());
        assert!(store.stored().and_then(|s| s.last_run_utc).is_some());
        assert_eq!(audit.len(), 1);

        let second = scheduler.run_once(&CancellationToken::new());
        assert!(
            matches!(second, RunOutcome::Skipped { ref reason } if reason == "No cleanup candidates found"),
            "{second:?}"
        );
        assert_eq!(audit.len(), 2);
        assert!(dumps[1..].iter().all(|dump| dump.exists()));
    }

    #[test]
    fn trimmed_run_deletes_only_the_largest_candidates() {
        let state = tempfile::tempdir().expect("state dir");
        let temp_root = tempfile::tempdir().expect("temp target");
        let big = write_file(temp_root.path(), "big.tmp", 8192);
        let small: Vec<_> = (0..12)
            .map(|i| write_file(temp_root.path(), &format!("small{i:02}.tmp"), 16))
            .collect();

        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now() + Duration::days(120)));
        let platform: Arc<dyn Platform> = native_platform(state.path());
        let scheduler = AutomationScheduler::new(SchedulerParts {
            preview: Arc::new(PreviewBuilder::from_config(&Config::default(), Arc::clone(&platform))),
            pipeline: Arc::new(DeletionPipeline::new(
                PathSafetyClassifier::builtin(),
                platform,
                Arc::clone(&clock),
            )),
            store: Arc::new(MemorySettingsStore::with_settings(AutomationSettings {
                enabled: true,
                top_item_count: 10,
                ..AutomationSettings::default()
            })),
            audit: Arc::new(MemoryAuditSink::new()),
            locks: Arc::new(NoLockInspector),
            clock,
            targets: vec![TargetDefinition::new(TargetCategory::Temp, "Temp", temp_root.path())],
            base_options: DeletionOptions::default(),
        })
        .expect("scheduler");

        let outcome = scheduler.run_once(&CancellationToken::new());
        let RunOutcome::Completed { result, .. } = outcome else {
            panic!("expected completed run, got {outcome:?}");
        };
        assert_eq!(result.deleted_count, 10);
        assert!(!big.exists());
        // Ties on size rank by path, so the last three names survive.
        assert!(small[..9].iter().all(|p| !p.exists()));
        assert!(small[9..].iter().all(|p| p.exists()));
    }
}
