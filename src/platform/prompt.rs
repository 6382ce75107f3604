//! Confirmation prompts before destructive actions.

#![allow(missing_docs)]

use std::io::{self, BufRead, Write};

/// Asks the operator to approve an action.
pub trait Confirmer {
    fn confirm(&self, title: &str, message: &str) -> bool;
}

/// Reads a `y`/`yes` answer from stdin. Anything else, including EOF, declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, title: &str, message: &str) -> bool {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        ask(&mut stdin.lock(), &mut stdout, title, message)
    }
}

/// Fixed answer, for `--yes` and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirmer(pub bool);

impl Confirmer for StaticConfirmer {
    fn confirm(&self, _title: &str, _message: &str) -> bool {
        self.0
    }
}

fn ask(input: &mut dyn BufRead, output: &mut dyn Write, title: &str, message: &str) -> bool {
    if writeln!(output, "{title}").is_err() || write!(output, "{message} [y/N] ").is_err() {
        return false;
    }
    let _ = output.flush();
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => is_affirmative(&answer),
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
