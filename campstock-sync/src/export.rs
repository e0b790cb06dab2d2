//! CSV export, one row per line item

use chrono::NaiveDate;
use std::io::Write;

use crate::error::SyncResult;
use crate::record::InventoryRecord;

pub const CSV_HEADER: [&str; 16] = [
    "Entry ID",
    "Camp",
    "Entry By",
    "Entry Date",
    "Inventory Type",
    "Warehouse",
    "Supplier",
    "PO",
    "GRN",
    "Item Category",
    "Item Name",
    "Unit",
    "Code",
    "Quantity",
    "Description",
    "Synced",
];

/// Write `records` as CSV. Returns the number of data rows written.
///
/// Fields containing a comma, quote or newline are quoted with inner quotes
/// doubled; absent optional fields are empty.
pub fn write_csv<W: Write>(records: &[InventoryRecord], writer: W) -> SyncResult<usize> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    csv_writer.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for record in records {
        let id = record.id.to_string();
        let entry_date = record.entry_date.format("%Y-%m-%d").to_string();
        let synced = if record.synced { "Yes" } else { "No" };

        for item in &record.items {
            let quantity = item.quantity.to_string();
            csv_writer.write_record([
                id.as_str(),
                record.camp.as_str(),
                record.entry_by.as_str(),
                entry_date.as_str(),
                record.inventory_type.as_str(),
                record.warehouse.as_deref().unwrap_or_default(),
                record.supplier.as_deref().unwrap_or_default(),
                record.po.as_deref().unwrap_or_default(),
                record.grn.as_deref().unwrap_or_default(),
                item.category.as_str(),
                item.name.as_str(),
                item.unit.as_str(),
                item.code.as_str(),
                quantity.as_str(),
                item.description.as_deref().unwrap_or_default(),
                synced,
            ])?;
            rows += 1;
        }
    }

    csv_writer.flush()?;
    Ok(rows)
}

pub fn to_csv_bytes(records: &[InventoryRecord]) -> SyncResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_csv(records, &mut buffer)?;
    Ok(buffer)
}

/// `inventory_export_YYYY-MM-DD.csv`
pub fn default_file_name(date: NaiveDate) -> String {
    format!("inventory_export_{}.csv", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::rice;
    use crate::record::{InventoryType, LineItem, RecordId};
    use chrono::Utc;

    fn stored(id: i64, camp: &str) -> InventoryRecord {
        InventoryRecord {
            id: RecordId(id),
            camp: camp.to_string(),
            entry_by: "J".to_string(),
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            inventory_type: InventoryType::Purchase,
            warehouse: Some("Main".to_string()),
            supplier: None,
            po: None,
            grn: None,
            items: vec![rice()],
            synced: false,
            created_at: Utc::now(),
        }
    }

    fn parse(bytes: &[u8]) -> Vec<csv::StringRecord> {
        csv::Reader::from_reader(bytes)
            .records()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_header_and_row_layout() {
        let text = String::from_utf8(to_csv_bytes(&[stored(1, "Alpha")]).unwrap()).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "Entry ID,Camp,Entry By,Entry Date,Inventory Type,Warehouse,Supplier,PO,GRN,\
             Item Category,Item Name,Unit,Code,Quantity,Description,Synced"
        );
        assert_eq!(
            lines.next().unwrap(),
            "1,Alpha,J,2024-01-01,Purchase,Main,,,,Food,Rice,kg,R1,50,,No"
        );
        assert!(text.ends_with('\n'));
        assert!(!text.contains('\r'));
    }

    #[test]
    fn test_quoting_round_trips() {
        let mut record = stored(7, "Camp \"A\", North");
        record.items[0].description = Some("two\nlines".to_string());
        record.synced = true;

        let bytes = to_csv_bytes(&[record]).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"Camp \"\"A\"\", North\""));

        let rows = parse(&bytes);
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][1], "Camp \"A\", North");
        assert_eq!(&rows[0][14], "two\nlines");
        assert_eq!(&rows[0][15], "Yes");
    }

    #[test]
    fn test_one_row_per_item() {
        let mut record = stored(3, "Bravo");
        record.items.push(LineItem {
            category: "Fuel".to_string(),
            name: "Diesel".to_string(),
            unit: "L".to_string(),
            code: "D9".to_string(),
            quantity: 12.5,
            description: Some("Generator".to_string()),
        });

        let mut buffer = Vec::new();
        let rows = write_csv(&[record, stored(4, "Charlie")], &mut buffer).unwrap();
        assert_eq!(rows, 3);

        let parsed = parse(&buffer);
        assert_eq!(&parsed[1][0], "3");
        assert_eq!(&parsed[1][13], "12.5");
        assert_eq!(&parsed[1][14], "Generator");
        assert_eq!(&parsed[2][0], "4");
    }

    #[test]
    fn test_empty_export_is_header_only() {
        let rows = parse(&to_csv_bytes(&[]).unwrap());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_default_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(default_file_name(date), "inventory_export_2024-03-09.csv");
    }
}
