use std::fmt::Write;

use chrono::{DateTime, Utc};
use mirror_console::{DispatchState, Dispatcher, DownloadView};
use mirror_contract::{format_age, format_size, TransferRecord, TransferStatus};

const BAR_WIDTH: usize = 20;

pub fn file_table(records: &[TransferRecord], now: DateTime<Utc>) -> String {
    if records.is_empty() {
        return "No transfers yet.\n".to_string();
    }

    let rows: Vec<[String; 5]> = records
        .iter()
        .map(|record| {
            [
                record.id.clone(),
                record.display_name().to_string(),
                record.status.as_str().to_lowercase(),
                format_size(record.size.as_deref()),
                format_age(record.created_at, now),
            ]
        })
        .collect();

    let headers = ["ID", "NAME", "STATUS", "SIZE", "CREATED"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &headers.map(str::to_string), &widths);
    for (row, record) in rows.iter().zip(records) {
        push_row(&mut out, row, &widths);
        if let Some(bar) = progress_bar(record) {
            let _ = writeln!(out, "  {bar}");
        }
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

/// Indeterminate while pending, percentage while downloading, nothing once
/// the job is terminal.
pub fn progress_bar(record: &TransferRecord) -> Option<String> {
    match record.status {
        TransferStatus::Pending => Some(format!("[{}] waiting", "~".repeat(BAR_WIDTH))),
        TransferStatus::Downloading => {
            let percent = record.display_progress().unwrap_or(0) as usize;
            let filled = percent * BAR_WIDTH / 100;
            Some(format!(
                "[{}{}] {percent}%",
                "#".repeat(filled),
                "-".repeat(BAR_WIDTH - filled)
            ))
        }
        TransferStatus::Completed | TransferStatus::Failed => None,
    }
}

pub fn download_view(view: &DownloadView, dispatcher: &Dispatcher, share_link: &str) -> String {
    let mut out = String::new();
    let name = view.target.file_name.as_deref().unwrap_or("Unknown file");
    let _ = writeln!(out, "{name}");
    let _ = writeln!(out, "share: {share_link}");

    if let Some(message) = view.empty_message() {
        let _ = writeln!(out, "{message}");
        return out;
    }
    for option in &view.options {
        let state = match (option.is_selectable(), dispatcher.state(&option.key)) {
            (false, _) => "unsupported",
            (true, DispatchState::Dispatching) => "starting",
            (true, DispatchState::Idle) => "ready",
        };
        let _ = writeln!(out, "  {:<18} {:<22} {state}", option.key, option.label);
    }
    out
}
