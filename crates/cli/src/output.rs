//! Terminal rendering.

#![allow(clippy::print_stdout)]

use serde::Serialize;
use yoraa_core::{LineItem, format_money};
use yoraa_store::monitor::{ErrorRecord, ErrorStats};
use yoraa_store::selectors::Summary;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    pub const fn from_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Print any serializable value as pretty JSON.
pub fn json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a one-line status message (text mode only).
pub fn message(format: Format, text: &str) {
    if format == Format::Text {
        println!("{text}");
    }
}

fn dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Render entries as an aligned table.
pub fn items(items: &[&LineItem]) {
    if items.is_empty() {
        println!("(empty)");
        return;
    }

    println!(
        "{:<16} {:<28} {:<6} {:<10} {:>4} {:>10} {:>10}",
        "ID", "NAME", "SIZE", "COLOR", "QTY", "PRICE", "LINE"
    );
    for item in items {
        println!(
            "{:<16} {:<28} {:<6} {:<10} {:>4} {:>10} {:>10}",
            item.id.as_str(),
            dash(item.name.as_deref()),
            dash(item.size.as_deref()),
            dash(item.color.as_deref()),
            item.quantity,
            format_money(item.price),
            item.line_total().map_or_else(|| "-".to_string(), format_money),
        );
    }
}

/// Render a whole collection with its aggregates.
pub fn summary(summary: &Summary) {
    let mode = if summary.is_local { "local" } else { "synced" };
    println!("{} ({} items, {mode})", summary.kind, summary.count);

    let rows: Vec<&LineItem> = summary.items.iter().collect();
    items(&rows);

    if let Some(totals) = &summary.totals {
        println!();
        println!("{:>12} {:>10}", "Subtotal", format_money(totals.subtotal));
        println!("{:>12} {:>10}", "Tax", format_money(totals.tax));
        println!("{:>12} {:>10}", "Shipping", format_money(totals.shipping));
        println!("{:>12} {:>10}", "Total", format_money(totals.total));
    }
}

/// Render error records and per-category counts.
pub fn errors(records: &[ErrorRecord], stats: &ErrorStats) {
    if records.is_empty() {
        println!("No errors recorded");
        return;
    }

    for record in records {
        println!(
            "{} [{}] {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.category,
            record.message
        );
        for (key, value) in &record.context {
            println!("    {key}: {value}");
        }
    }

    println!();
    println!("{} total", stats.total);
    for (category, count) in &stats.by_category {
        println!("{category:>12} {count}");
    }
}
