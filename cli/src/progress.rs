//! Progress bar sink for interactive terminals.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use breachkit_core::{AttackResult, AttackStatus, ScanEventSink};

pub struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "Attacking {bar:40} {pos:>3}/{len:3} ({percent:>3}%) [{elapsed_precise}]",
        ) {
            bar.set_style(style.progress_chars("⣿⣀ "));
        }
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ScanEventSink for ProgressSink {
    fn on_log(&self, level: &str, message: &str) {
        let line = match level {
            "error" => message.red().to_string(),
            "warn" => message.yellow().to_string(),
            _ => message.to_string(),
        };
        self.bar.println(line);
    }

    fn on_result(&self, result: &AttackResult) {
        let label = match result.status {
            AttackStatus::Breached => "[BREACHED]".red().bold(),
            AttackStatus::Error => "[ERROR]   ".yellow(),
            _ => return,
        };
        self.bar.println(format!("{} {} {}", label, result.attack_id.white().bold(), result.summary));
    }

    fn on_progress(&self, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
    }
}
