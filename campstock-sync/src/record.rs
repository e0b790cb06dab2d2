//! Inventory record data model
//!
//! A record is one stock movement (purchase, transfer or issue) with its line
//! items. The store owns `id`, `synced` and `created_at`; everything else comes
//! from the producer as a [`NewInventoryRecord`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SyncError, SyncResult};

/// Locally assigned record identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        s.trim()
            .parse::<i64>()
            .map(RecordId)
            .map_err(|_| SyncError::InvalidRecord(format!("Invalid entry id: {}", s)))
    }
}

/// Kind of stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InventoryType {
    Purchase,
    Transfer,
    Issue,
}

impl InventoryType {
    pub const ALL: [InventoryType; 3] = [Self::Purchase, Self::Transfer, Self::Issue];

    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryType::Purchase => "Purchase",
            InventoryType::Transfer => "Transfer",
            InventoryType::Issue => "Issue",
        }
    }

    /// Whether the entry form asks for a warehouse for this type.
    pub fn has_warehouse(&self) -> bool {
        matches!(self, InventoryType::Purchase | InventoryType::Transfer)
    }

    /// Whether the entry form asks for supplier, PO and GRN for this type.
    pub fn has_purchase_refs(&self) -> bool {
        matches!(self, InventoryType::Purchase)
    }
}

impl fmt::Display for InventoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryType {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SyncError::InvalidRecord(format!("Unknown inventory type: {}", s)))
    }
}

/// One stock-keeping-unit movement within a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub category: String,
    pub name: String,
    pub unit: String,
    pub code: String,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Record contents as produced by the entry form, before the store assigns
/// identity and bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInventoryRecord {
    pub camp: String,
    pub entry_by: String,
    pub entry_date: NaiveDate,
    pub inventory_type: InventoryType,
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub po: Option<String>,
    #[serde(default)]
    pub grn: Option<String>,
    pub items: Vec<LineItem>,
}

impl NewInventoryRecord {
    /// Producer-side checks. The store accepts anything well-typed; this is
    /// what the form enforces before calling `create`.
    pub fn validate(&self) -> SyncResult<()> {
        require("camp", &self.camp)?;
        require("entryBy", &self.entry_by)?;

        if self.items.is_empty() {
            return Err(SyncError::InvalidRecord("At least one item is required".to_string()));
        }

        for (index, item) in self.items.iter().enumerate() {
            let position = index + 1;
            for (field, value) in [
                ("category", &item.category),
                ("name", &item.name),
                ("unit", &item.unit),
                ("code", &item.code),
            ] {
                if value.trim().is_empty() {
                    return Err(SyncError::InvalidRecord(format!(
                        "Item {}: {} is required",
                        position, field
                    )));
                }
            }
            if !item.quantity.is_finite() || item.quantity < 0.0 {
                return Err(SyncError::InvalidRecord(format!(
                    "Item {}: quantity must be a non-negative number",
                    position
                )));
            }
        }

        Ok(())
    }

    /// Drop optional fields the selected inventory type does not carry and
    /// turn blank strings into `None`.
    pub fn normalized(mut self) -> Self {
        let kind = self.inventory_type;
        self.warehouse = blank_to_none(self.warehouse).filter(|_| kind.has_warehouse());
        self.supplier = blank_to_none(self.supplier).filter(|_| kind.has_purchase_refs());
        self.po = blank_to_none(self.po).filter(|_| kind.has_purchase_refs());
        self.grn = blank_to_none(self.grn).filter(|_| kind.has_purchase_refs());
        for item in &mut self.items {
            item.description = blank_to_none(item.description.take());
        }
        self
    }
}

fn require(field: &str, value: &str) -> SyncResult<()> {
    if value.trim().is_empty() {
        return Err(SyncError::InvalidRecord(format!("{} is required", field)));
    }
    Ok(())
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Persisted inventory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    pub id: RecordId,
    pub camp: String,
    pub entry_by: String,
    pub entry_date: NaiveDate,
    pub inventory_type: InventoryType,
    pub warehouse: Option<String>,
    pub supplier: Option<String>,
    pub po: Option<String>,
    pub grn: Option<String>,
    pub items: Vec<LineItem>,
    pub synced: bool,
    pub created_at: DateTime<Utc>,
}

impl InventoryRecord {
    pub fn status_label(&self) -> &'static str {
        if self.synced {
            "Synced"
        } else {
            "Pending"
        }
    }
}
