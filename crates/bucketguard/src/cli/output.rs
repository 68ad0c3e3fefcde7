//! Output formatting utilities for CLI commands

use anyhow::Result;
use bucketguard_av::ScanStatus;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<Cell>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}

pub fn color_for_status(status: Option<ScanStatus>) -> Color {
    match status {
        Some(ScanStatus::Clean) => Color::Green,
        Some(ScanStatus::Infected) => Color::Red,
        Some(ScanStatus::Error) => Color::Magenta,
        Some(ScanStatus::InProgress) => Color::Yellow,
        None => Color::Grey,
    }
}

/// Cell showing a scan status, `-` when the object was never tagged.
pub fn status_cell(status: Option<ScanStatus>) -> Cell {
    let text = status.map_or("-", |status| status.as_str());
    Cell::new(text).fg(color_for_status(status))
}
