//! Human-readable rendering of device usage and occupancy.
//!
//! Output is Telegram Markdown (v1): gauges and command lines are wrapped
//! in backticks so they render monospaced.

use std::fmt::Write as _;

use chrono::NaiveDateTime;

use crate::marker::decorate_user;
use crate::{DeviceId, MemoryInfo, OccupancyLabel, OccupancyState, ProcessInfo, GIB};

/// Number of segments in the usage gauge of `/gpu` replies.
pub const USAGE_BAR_WIDTH: usize = 24;

/// Formats a byte count as gibibytes with one decimal.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.1}", bytes as f64 / GIB as f64)
}

/// Renders a fixed-width usage gauge such as `` `|######      |` ``.
///
/// The number of filled segments is `round(used / total * width) + 1`,
/// capped at `width`, so an idle device still shows one segment and a
/// full device fills the whole bar.
pub fn usage_bar(used: u64, total: u64, width: usize) -> String {
    let info = MemoryInfo::new(used, total, total.saturating_sub(used));
    let sep = (info.used_fraction() * width as f64).round() as usize;
    let filled = sep.saturating_add(1).min(width);

    let mut bar = String::with_capacity(width + 4);
    bar.push_str("`|");
    bar.extend(std::iter::repeat('#').take(filled));
    bar.extend(std::iter::repeat(' ').take(width - filled));
    bar.push_str("|`");
    bar
}

/// Renders the detailed `/gpu` message for one device.
pub fn usage_message(id: DeviceId, memory: &MemoryInfo, processes: &[ProcessInfo]) -> String {
    let mut msg = format!(
        "GPU {id} usage is {} / {} GB\n{}\n",
        format_gb(memory.used),
        format_gb(memory.total),
        usage_bar(memory.used, memory.total, USAGE_BAR_WIDTH),
    );

    for proc in processes {
        let _ = writeln!(msg, "😈 {}: `{}`", proc.username, proc.command_line());
    }
    if processes.is_empty() {
        let _ = writeln!(msg, "👻 Type `/occ {id}` to occupy the GPU");
    }
    msg
}

/// Renders a single occupancy label.
pub fn status_line(label: &OccupancyLabel) -> String {
    match label {
        OccupancyLabel::Available => "AVAILABLE".to_string(),
        OccupancyLabel::Occupied(users) => {
            let decorated: Vec<String> = users.iter().map(|u| decorate_user(u)).collect();
            format!("OCCUPIED by {}", decorated.join(", "))
        }
    }
}

/// Renders the multi-device report sent on change and for `/g`.
pub fn status_report(state: &OccupancyState, at: NaiveDateTime) -> String {
    let mut msg = format!("# New GPU Status at {}\n", at.format("%Y-%m-%d %H:%M:%S"));
    for (index, label) in state.labels().iter().enumerate() {
        let _ = writeln!(msg, "* GPU #{index}: {}", status_line(label));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn filled(bar: &str) -> usize {
        bar.chars().filter(|c| *c == '#').count()
    }

    #[test]
    fn test_usage_bar_empty_device_fills_one() {
        let bar = usage_bar(0, 16 * GIB, 24);
        assert_eq!(filled(&bar), 1);
        assert_eq!(bar.chars().count(), 24 + 4);
    }

    #[test]
    fn test_usage_bar_full_device_fills_all() {
        let bar = usage_bar(16 * GIB, 16 * GIB, 24);
        assert_eq!(filled(&bar), 24);
        assert_eq!(bar, format!("`|{}|`", "#".repeat(24)));
    }

    #[test]
    fn test_usage_bar_is_monotonic() {
        let total = 1000;
        let mut last = 0;
        for used in (0..=total).step_by(7) {
            let n = filled(&usage_bar(used, total, 24));
            assert!(n >= last, "bar shrank at used={used}");
            assert!((1..=24).contains(&n));
            last = n;
        }
    }

    #[test]
    fn test_usage_bar_half() {
        // round(0.5 * 10) + 1
        assert_eq!(usage_bar(50, 100, 10), "`|######    |`");
    }

    #[test]
    fn test_usage_bar_zero_total() {
        assert_eq!(filled(&usage_bar(0, 0, 8)), 1);
    }

    #[test]
    fn test_format_gb() {
        assert_eq!(format_gb(0), "0.0");
        assert_eq!(format_gb(2 * GIB), "2.0");
        assert_eq!(format_gb(GIB + GIB / 2), "1.5");
    }

    #[test]
    fn test_usage_message_with_processes() {
        let memory = MemoryInfo::new(2 * GIB, 16 * GIB, 14 * GIB);
        let procs = vec![ProcessInfo::new(
            7,
            "alice",
            vec!["python".to_string(), "train.py".to_string()],
        )];
        let msg = usage_message(DeviceId::new(0), &memory, &procs);

        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(lines.first(), Some(&"GPU 0 usage is 2.0 / 16.0 GB"));
        assert!(lines.get(1).is_some_and(|l| l.starts_with("`|")));
        assert_eq!(lines.get(2), Some(&"😈 alice: `python train.py`"));
        assert!(!msg.contains("/occ"));
    }

    #[test]
    fn test_usage_message_idle_offers_reservation() {
        let memory = MemoryInfo::new(0, 16 * GIB, 16 * GIB);
        let msg = usage_message(DeviceId::new(3), &memory, &[]);
        assert!(msg.ends_with("👻 Type `/occ 3` to occupy the GPU\n"));
    }

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(&OccupancyLabel::Available), "AVAILABLE");
        assert_eq!(
            status_line(&OccupancyLabel::Occupied(vec!["alice".into(), "cy54".into()])),
            "OCCUPIED by alice💸, cy54🎣"
        );
    }

    #[test]
    fn test_status_report() {
        let state = OccupancyState::new(vec![
            OccupancyLabel::Occupied(vec!["alice".into()]),
            OccupancyLabel::Available,
        ]);
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(9, 5, 0))
            .unwrap();

        assert_eq!(
            status_report(&state, at),
            "# New GPU Status at 2024-03-01 09:05:00\n\
             * GPU #0: OCCUPIED by alice💸\n\
             * GPU #1: AVAILABLE\n"
        );
    }
}
