//! Command handlers

use anyhow::{anyhow, bail, Context, Result};
use campstock_sync::{
    export, InventoryRecord, InventoryType, LineItem, NewInventoryRecord, RecordId, RecordQuery,
    SyncEngine,
};
use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use dialoguer::Confirm;
use std::io::{BufWriter, Read};
use std::path::PathBuf;

use crate::render;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a stock movement
    Add(AddArgs),

    /// List entries, newest first
    List {
        /// Match camp, entered-by or type (case-insensitive)
        #[arg(short, long)]
        search: Option<String>,

        /// Only show one inventory type
        #[arg(short = 't', long = "type")]
        inventory_type: Option<InventoryType>,
    },

    /// Show one entry in full
    Show { id: RecordId },

    /// Delete an entry
    Delete {
        id: RecordId,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Entry counts and connectivity
    Stats,

    /// Upload pending entries now
    Sync,

    /// Export all entries as CSV
    Export {
        /// Output file (default: inventory_export_<date>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Keep syncing in the background until interrupted
    Run,
}

#[derive(Args, Debug, Default)]
pub struct AddArgs {
    /// Read the entry as JSON from a file, or `-` for stdin
    #[arg(long, value_name = "FILE", conflicts_with_all = ["camp", "entry_by", "inventory_type", "items"])]
    pub json: Option<String>,

    #[arg(long)]
    pub camp: Option<String>,

    #[arg(long)]
    pub entry_by: Option<String>,

    /// Entry date (YYYY-MM-DD, default today)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[arg(short = 't', long = "type")]
    pub inventory_type: Option<InventoryType>,

    /// Purchase and Transfer only
    #[arg(long)]
    pub warehouse: Option<String>,

    /// Purchase only
    #[arg(long)]
    pub supplier: Option<String>,

    /// Purchase only
    #[arg(long)]
    pub po: Option<String>,

    /// Purchase only
    #[arg(long)]
    pub grn: Option<String>,

    /// Line item, repeatable
    #[arg(long = "item", value_name = "CATEGORY|NAME|UNIT|CODE|QTY[|DESCRIPTION]")]
    pub items: Vec<String>,
}

impl AddArgs {
    fn into_record(self, today: NaiveDate) -> Result<NewInventoryRecord> {
        if let Some(source) = &self.json {
            let text = read_source(source)?;
            return serde_json::from_str(&text).context("Invalid entry JSON");
        }

        let inventory_type = self
            .inventory_type
            .ok_or_else(|| anyhow!("--type is required (Purchase, Transfer or Issue)"))?;
        let items = self
            .items
            .iter()
            .map(|raw| parse_item(raw))
            .collect::<Result<Vec<_>>>()?;

        Ok(NewInventoryRecord {
            camp: self.camp.unwrap_or_default(),
            entry_by: self.entry_by.unwrap_or_default(),
            entry_date: self.date.unwrap_or(today),
            inventory_type,
            warehouse: self.warehouse,
            supplier: self.supplier,
            po: self.po,
            grn: self.grn,
            items,
        })
    }
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read entry from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))
    }
}

/// Parse `CATEGORY|NAME|UNIT|CODE|QTY[|DESCRIPTION]`
pub fn parse_item(raw: &str) -> Result<LineItem> {
    let parts: Vec<&str> = raw.split('|').map(str::trim).collect();
    let [category, name, unit, code, quantity, rest @ ..] = parts.as_slice() else {
        bail!("Item '{}' needs at least CATEGORY|NAME|UNIT|CODE|QTY", raw);
    };
    if rest.len() > 1 {
        bail!("Item '{}' has too many fields", raw);
    }

    let quantity: f64 = quantity
        .parse()
        .with_context(|| format!("Item '{}': quantity '{}' is not a number", raw, quantity))?;

    Ok(LineItem {
        category: category.to_string(),
        name: name.to_string(),
        unit: unit.to_string(),
        code: code.to_string(),
        quantity,
        description: rest.first().map(|d| d.to_string()),
    })
}

pub async fn run(command: Command, engine: &SyncEngine) -> Result<()> {
    match command {
        Command::Add(args) => add(engine, args).await,
        Command::List {
            search,
            inventory_type,
        } => list(engine, search, inventory_type).await,
        Command::Show { id } => show(engine, id).await,
        Command::Delete { id, yes } => delete(engine, id, yes).await,
        Command::Stats => stats(engine).await,
        Command::Sync => sync(engine).await,
        Command::Export { output } => export_csv(engine, output).await,
        Command::Run => run_background(engine).await,
    }
}

async fn add(engine: &SyncEngine, args: AddArgs) -> Result<()> {
    let record = args.into_record(Utc::now().date_naive())?.normalized();
    record.validate()?;

    let id = engine
        .store()
        .create(&record)
        .await
        .context("Error saving entry")?;

    render::success(&format!("Entry saved successfully! (#{})", id));
    Ok(())
}

async fn list(
    engine: &SyncEngine,
    search: Option<String>,
    inventory_type: Option<InventoryType>,
) -> Result<()> {
    let query = RecordQuery {
        search,
        inventory_type,
    };
    let records = query.apply(engine.store().get_all().await?);
    render::record_list(&records);
    Ok(())
}

async fn show(engine: &SyncEngine, id: RecordId) -> Result<()> {
    let record = engine.store().get_by_id(id).await?;
    render::record_detail(&record);
    Ok(())
}

async fn delete(engine: &SyncEngine, id: RecordId, yes: bool) -> Result<()> {
    let record = engine.store().get_by_id(id).await?;

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Are you sure you want to delete entry #{} ({})?",
                record.id, record.camp
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            render::info("Cancelled");
            return Ok(());
        }
    }

    engine
        .store()
        .delete(id)
        .await
        .context("Error deleting entry")?;
    render::success("Entry deleted");
    Ok(())
}

async fn stats(engine: &SyncEngine) -> Result<()> {
    let stats = engine.store().get_sync_stats().await?;
    let status = engine.check_connectivity().await;
    render::stats(&stats, status);
    Ok(())
}

async fn sync(engine: &SyncEngine) -> Result<()> {
    if !engine.has_remote() {
        bail!("No sync endpoint configured (set sync.endpoint or sync.dry_run)");
    }

    engine.check_connectivity().await;
    let outcome = engine.coordinator().sync_now().await?;
    render::pass_outcome(&outcome);
    Ok(())
}

async fn export_csv(engine: &SyncEngine, output: Option<PathBuf>) -> Result<()> {
    let mut records: Vec<InventoryRecord> = engine.store().get_all().await?;
    if records.is_empty() {
        render::info("No entries to export");
        return Ok(());
    }
    records.sort_by_key(|r| r.id);

    let path = output
        .unwrap_or_else(|| PathBuf::from(export::default_file_name(Utc::now().date_naive())));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let rows = export::write_csv(&records, BufWriter::new(file))?;

    render::success(&format!(
        "CSV exported successfully! ({} rows to {})",
        rows,
        path.display()
    ));
    Ok(())
}

async fn run_background(engine: &SyncEngine) -> Result<()> {
    if !engine.has_remote() {
        bail!("No sync endpoint configured (set sync.endpoint or sync.dry_run)");
    }

    let background = engine.start_background();
    render::info(&format!(
        "Syncing every {}s, press Ctrl-C to stop",
        engine.config().sync.interval.as_secs()
    ));

    let signal = tokio::signal::ctrl_c().await;
    background.shutdown().await;
    signal.context("Failed to listen for Ctrl-C")?;

    render::info("Stopped");
    Ok(())
}
