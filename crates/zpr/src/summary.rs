//! 📊 summary.rs: "So how did it go?", asked once, at the very end.
//!
//! 🍽️ One row per archive, a table so comfy it has lumbar support, and a footer
//! that admits how long the whole thing took.

use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_HORIZONTAL_ONLY};

use crate::common::{JobOutcome, RunResult};

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 docs" → "1,000,000 docs", you're welcome, eyes.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS once the run has been going for an hour.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

fn outcome_label(outcome: &JobOutcome) -> String {
    match outcome {
        JobOutcome::Published(receipt) => format!("✅ {}", receipt.remote_key),
        JobOutcome::NothingToPublish => "🫙 empty, not published".to_string(),
        JobOutcome::Aborted { during, .. } => format!("💀 aborted while {during}"),
        JobOutcome::Panicked => "💥 panicked".to_string(),
    }
}

fn right(text: impl ToString) -> Cell {
    Cell::new(text.to_string()).set_alignment(CellAlignment::Right)
}

/// 🎨 Render the run as a table, plus a line for anything that never got to run.
pub fn render_summary(result: &RunResult) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_HORIZONTAL_ONLY);
    table.set_content_arrangement(ContentArrangement::Disabled);
    table.set_header(vec![
        "Archive", "Partition", "Listed", "Selected", "Archived", "Skipped", "Elapsed", "Outcome",
    ]);

    for report in &result.reports {
        let the_skipped =
            report.malformed_skipped + report.gone_skipped + report.duplicates_skipped;
        table.add_row(vec![
            Cell::new(&report.archive_name),
            Cell::new(report.partition.to_string()),
            right(format_number(report.candidates as u64)),
            right(format_number(report.selected as u64)),
            right(format_number(report.archived as u64)),
            right(format_number(the_skipped as u64)),
            right(format_duration(report.elapsed)),
            Cell::new(outcome_label(&report.outcome)),
        ]);
    }

    let mut the_footer = format!(
        "🏁 {} archive job(s), {} object(s) archived in {} (started {})",
        result.reports.len(),
        format_number(result.total_archived() as u64),
        format_duration(result.elapsed),
        result.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    if result.jobs_skipped > 0 {
        the_footer.push_str(&format!(
            "\n⏭️ {} job(s) never started because an earlier job failed",
            result.jobs_skipped
        ));
    }
    if let Some(err) = &result.first_error {
        the_footer.push_str(&format!("\n💀 first error: {err}"));
    }
    format!("{table}\n{the_footer}")
}
