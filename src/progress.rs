//! Terminal progress for the enrichment and backfill phases.
//!
//! With `--log-only` the bars stay hidden and each phase emits a tracing line
//! every `interval` entries, which keeps output readable under `tail -f`.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} entries ({per_sec}, ETA: {eta})";

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Switch every bar created afterwards to hidden, line-logged output.
pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Elapsed time as `2.5s`, `1.5m` or `1.2h`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    match secs {
        s if s < 60.0 => format!("{:.1}s", s),
        s if s < 3600.0 => format!("{:.1}m", s / 60.0),
        s => format!("{:.1}h", s / 3600.0),
    }
}

/// Bar over `len` entries labelled `msg`; hidden in log-only mode.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = if is_log_only() {
        ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::hidden())
    } else {
        ProgressBar::new(len).with_style(
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap()
                .progress_chars("=> "),
        )
    };
    pb.set_message(msg.to_string());
    pb
}

fn progress_due(current: u64, total: u64, interval: u64) -> bool {
    total > 0 && (current == total || (interval > 0 && current % interval == 0))
}

/// Emit `[phase] current/total (pct%)` when a line is due. No-op unless log-only.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if is_log_only() && progress_due(current, total, interval) {
        let pct = 100.0 * current as f64 / total as f64;
        info!("[{}] {}/{} ({:.1}%)", phase, current, total, pct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1.5h");
    }

    #[test]
    fn test_progress_due() {
        assert!(progress_due(25, 100, 25));
        assert!(!progress_due(26, 100, 25));
        assert!(progress_due(100, 100, 30));
        assert!(!progress_due(0, 0, 25));
        assert!(!progress_due(3, 10, 0));
    }
}
