//! Listing filters over a full scan of the store

use crate::record::{InventoryRecord, InventoryType};

/// Search text and type filter as entered on the list view
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// Case-insensitive substring matched against camp, entry-by and type
    pub search: Option<String>,
    pub inventory_type: Option<InventoryType>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = if text.trim().is_empty() { None } else { Some(text) };
        self
    }

    pub fn inventory_type(mut self, inventory_type: InventoryType) -> Self {
        self.inventory_type = Some(inventory_type);
        self
    }

    pub fn matches(&self, record: &InventoryRecord) -> bool {
        if let Some(kind) = self.inventory_type {
            if record.inventory_type != kind {
                return false;
            }
        }

        match &self.search {
            Some(text) => {
                let needle = text.trim().to_lowercase();
                [
                    record.camp.as_str(),
                    record.entry_by.as_str(),
                    record.inventory_type.as_str(),
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }

    /// Keep matching records, newest first.
    pub fn apply(&self, records: Vec<InventoryRecord>) -> Vec<InventoryRecord> {
        let mut matched: Vec<InventoryRecord> =
            records.into_iter().filter(|r| self.matches(r)).collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matched
    }
}
