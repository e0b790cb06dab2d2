//! Terminal output: record cards, detail view, stats and one-line notices

use campstock_sync::{
    ConnectivityStatus, InventoryRecord, PassOutcome, SkipReason, SyncStats,
};
use colored::*;

pub fn success(message: &str) {
    println!("{} {}", "✓".bright_green(), message.bright_green());
}

pub fn info(message: &str) {
    println!("{} {}", "ℹ".bright_blue(), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".bright_yellow(), message.bright_yellow());
}

pub fn failure(message: &str) {
    eprintln!("{} {}", "✗".bright_red(), message.bright_red());
}

fn badge(record: &InventoryRecord) -> ColoredString {
    if record.synced {
        "✓ Synced".bright_green()
    } else {
        "⏳ Pending".bright_yellow()
    }
}

pub fn record_list(records: &[InventoryRecord]) {
    if records.is_empty() {
        println!("{}", "No entries found".dimmed());
        return;
    }

    for record in records {
        println!(
            "{} {}  {}",
            format!("#{}", record.id).dimmed(),
            record.camp.bold(),
            badge(record)
        );
        println!(
            "    {} {}   {} {}   {} {}   {} {}",
            "Type:".dimmed(),
            record.inventory_type,
            "By:".dimmed(),
            record.entry_by,
            "Date:".dimmed(),
            record.entry_date,
            "Items:".dimmed(),
            record.items.len()
        );
    }
}

pub fn record_detail(record: &InventoryRecord) {
    println!("{}  {}", record.camp.bold().bright_cyan(), badge(record));
    println!();

    let mut fields = vec![
        ("Entry ID", record.id.to_string()),
        ("Entry By", record.entry_by.clone()),
        ("Date", record.entry_date.to_string()),
        ("Type", record.inventory_type.to_string()),
    ];
    for (label, value) in [
        ("Warehouse", &record.warehouse),
        ("Supplier", &record.supplier),
        ("PO", &record.po),
        ("GRN", &record.grn),
    ] {
        if let Some(value) = value {
            fields.push((label, value.clone()));
        }
    }
    fields.push(("Created", record.created_at.to_rfc3339()));

    for (label, value) in fields {
        println!("  {:<10} {}", format!("{}:", label).dimmed(), value);
    }

    println!();
    println!("{}", "Items".bold());
    for item in &record.items {
        println!("  {} {}", "•".bright_cyan(), item.name.bold());
        println!("      {} {}", "Category:".dimmed(), item.category);
        println!("      {} {}", "Code:".dimmed(), item.code);
        println!("      {} {} {}", "Quantity:".dimmed(), item.quantity, item.unit);
        if let Some(description) = &item.description {
            println!("      {} {}", "Description:".dimmed(), description);
        }
    }
}

pub fn stats(stats: &SyncStats, status: ConnectivityStatus) {
    let connectivity = match status {
        ConnectivityStatus::Online => "✓ Connected to Internet".bright_green(),
        ConnectivityStatus::Offline => "✗ Offline".bright_red(),
    };

    println!("{}", connectivity);
    println!("  {:<10} {}", "Total:".dimmed(), stats.total.to_string().bold());
    println!("  {:<10} {}", "Synced:".dimmed(), stats.synced.to_string().bright_green());
    println!("  {:<10} {}", "Pending:".dimmed(), stats.unsynced.to_string().bright_yellow());
}

/// Notices for a manual pass. A pass that uploaded nothing prints nothing
/// unless records failed.
pub fn pass_outcome(outcome: &PassOutcome) {
    match outcome {
        PassOutcome::Completed(summary) => {
            let synced = summary.synced_count();
            if synced > 0 {
                success(&format!("Synced {} entries", synced));
            }
            for error in summary.upload_errors() {
                warning(&error.to_string());
            }
        }
        PassOutcome::Skipped(SkipReason::AlreadyRunning) => {
            info("A sync is already in progress");
        }
        PassOutcome::Skipped(SkipReason::Offline) => {
            failure("No internet connection");
        }
    }
}
