//! Progress reporting with TTY detection.
//!
//! Shows a spinner for the running step when stderr is a terminal and falls
//! back to plain `[n/6]` lines otherwise (CI logs, pipes, tests).

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use boxpub::publisher::Reporter;
use boxpub::types::{PublishStep, StepOutcome, StepRecord};

/// Detects whether stderr is connected to a TTY.
pub fn is_tty() -> bool {
    std::io::stderr().is_terminal()
}

pub struct ProgressReporter {
    is_tty: bool,
    total_steps: usize,
    spinner: Option<ProgressBar>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(total_steps: usize) -> Self {
        Self {
            is_tty: is_tty(),
            total_steps,
            spinner: None,
            start_time: Instant::now(),
        }
    }

    /// Never draws a spinner, regardless of TTY.
    #[cfg(test)]
    pub fn silent(total_steps: usize) -> Self {
        Self {
            is_tty: false,
            total_steps,
            spinner: None,
            start_time: Instant::now(),
        }
    }

    /// Clears the spinner, if one is showing.
    pub fn finish(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    fn println(&self, line: &str) {
        match &self.spinner {
            Some(pb) => pb.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }
    }

    fn prefix(&self, step: PublishStep) -> String {
        format!("[{}/{}]", step.position(), self.total_steps)
    }

    fn spinner(&mut self) -> &ProgressBar {
        self.spinner.get_or_insert_with(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        })
    }
}

/// One-line rendering of a finished step.
pub fn step_line(prefix: &str, record: &StepRecord) -> String {
    let outcome = match &record.outcome {
        StepOutcome::Failed { .. } => "failed".to_string(),
        other => other.to_string(),
    };
    format!(
        "{prefix} {}: {outcome} ({}ms)",
        record.step, record.duration_ms
    )
}

impl Reporter for ProgressReporter {
    fn info(&mut self, msg: &str) {
        self.println(&format!("[info] {msg}"));
    }

    fn warn(&mut self, msg: &str) {
        self.println(&format!("[warn] {msg}"));
    }

    fn error(&mut self, msg: &str) {
        self.println(&format!("[error] {msg}"));
    }

    fn step_started(&mut self, step: PublishStep) {
        let msg = format!("{} {step}...", self.prefix(step));
        if self.is_tty {
            self.spinner().set_message(msg);
        } else {
            eprintln!("{msg} ({:?} elapsed)", self.start_time.elapsed());
        }
    }

    fn step_finished(&mut self, record: &StepRecord) {
        let line = step_line(&self.prefix(record.step), record);
        self.println(&line);
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_reporter_never_creates_spinner() {
        let mut reporter = ProgressReporter::silent(6);
        reporter.step_started(PublishStep::EnsureBox);
        reporter.step_finished(&StepRecord {
            step: PublishStep::EnsureBox,
            outcome: StepOutcome::Applied,
            duration_ms: 3,
        });
        reporter.info("hello");
        assert!(reporter.spinner.is_none());
        reporter.finish();
    }

    #[test]
    fn step_line_formats_outcomes() {
        let ok = StepRecord {
            step: PublishStep::EnsureVersion,
            outcome: StepOutcome::AlreadyExists,
            duration_ms: 12,
        };
        assert_eq!(
            step_line("[2/6]", &ok),
            "[2/6] ensure_version: already exists (12ms)"
        );

        let failed = StepRecord {
            step: PublishStep::UploadArtifact,
            outcome: StepOutcome::Failed {
                message: "artifact upload returned HTTP 500".to_string(),
            },
            duration_ms: 40,
        };
        assert_eq!(
            step_line("[5/6]", &failed),
            "[5/6] upload_artifact: failed (40ms)"
        );
    }

    #[test]
    fn prefix_uses_step_position() {
        let reporter = ProgressReporter::silent(6);
        assert_eq!(reporter.prefix(PublishStep::ReleaseVersion), "[6/6]");
    }
}
