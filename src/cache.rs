//! In-memory store of the latest fetched spreadsheet state.
//!
//! The single source of truth for every consumer: cell lookups, the HTTP read
//! API, and the variables export. Updates are wholesale replacements per
//! spreadsheet (metadata and value ranges replaced as whole snapshots, never
//! merged in place), so concurrent readers and the poll loop need no
//! coordination beyond the lock around the map.

use crate::a1;
use crate::sheets::types::{Spreadsheet, ValueRange};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub metadata: Spreadsheet,
    pub value_ranges: Vec<ValueRange>,
}

/// Summary handed to the HTTP `/spreadsheets` listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadsheetSummary {
    pub id: String,
    pub title: String,
    pub sheet_titles: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SheetCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

/// Match a value-range name (`Sheet1!A1:B2` or `'My Sheet'!A1:B2`) against a
/// sheet title. Multi-word titles come back single-quoted from the API.
fn range_matches(range: &str, sheet_title: &str) -> bool {
    let name = range.split('!').next().unwrap_or(range);
    name == sheet_title || name == format!("'{}'", sheet_title)
}

impl SheetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the metadata snapshot for a spreadsheet. Previously fetched
    /// values stay attached until the next values poll replaces them.
    pub fn set_metadata(&self, spreadsheet_id: &str, metadata: Spreadsheet) {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(spreadsheet_id) {
            Some(entry) => entry.metadata = metadata,
            None => {
                entries.insert(
                    spreadsheet_id.to_string(),
                    CacheEntry {
                        metadata,
                        value_ranges: Vec::new(),
                    },
                );
            }
        }
    }

    /// Replace the value ranges for a spreadsheet. A values snapshot without
    /// metadata has nothing to attach to and is dropped.
    pub fn set_values(&self, spreadsheet_id: &str, value_ranges: Vec<ValueRange>) {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(spreadsheet_id) {
            entry.value_ranges = value_ranges;
        }
    }

    /// Look up a single cell by `Sheet!A1` reference.
    ///
    /// Returns None for an unknown spreadsheet, unknown sheet, malformed
    /// reference, or a cell outside the fetched range. Trailing empty cells
    /// are not transmitted by the API, so "beyond the range" means absent.
    pub fn lookup_cell_value(&self, spreadsheet_id: &str, cell: &str) -> Option<String> {
        let (sheet_title, address) = cell.split_once('!')?;
        let cell_ref = a1::parse_cell_reference(address)?;

        let entries = self.entries.read().unwrap();
        let entry = entries.get(spreadsheet_id)?;
        let range = entry
            .value_ranges
            .iter()
            .find(|value_range| range_matches(&value_range.range, sheet_title))?;

        range
            .values
            .get(cell_ref.row)
            .and_then(|row| row.get(cell_ref.col))
            .cloned()
    }

    pub fn contains(&self, spreadsheet_id: &str) -> bool {
        self.entries.read().unwrap().contains_key(spreadsheet_id)
    }

    /// Sheet titles from cached metadata, in sheet order. Used to build the
    /// per-sheet ranges for a values poll.
    pub fn sheet_titles(&self, spreadsheet_id: &str) -> Option<Vec<String>> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(spreadsheet_id)?;
        Some(
            entry
                .metadata
                .sheets
                .iter()
                .map(|sheet| sheet.properties.title.clone())
                .collect(),
        )
    }

    /// Internal numeric sheet ID for a title, from cached metadata.
    pub fn sheet_id_by_title(&self, spreadsheet_id: &str, sheet_title: &str) -> Option<i64> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(spreadsheet_id)?;
        entry
            .metadata
            .sheets
            .iter()
            .find(|sheet| sheet.properties.title == sheet_title)
            .map(|sheet| sheet.properties.sheet_id)
    }

    pub fn sheet_count(&self, spreadsheet_id: &str) -> Option<usize> {
        let entries = self.entries.read().unwrap();
        entries
            .get(spreadsheet_id)
            .map(|entry| entry.metadata.sheets.len())
    }

    /// Full row snapshot of one sheet, for the HTTP export.
    pub fn sheet_rows(&self, spreadsheet_id: &str, sheet_title: &str) -> Option<Vec<Vec<String>>> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(spreadsheet_id)?;
        entry
            .value_ranges
            .iter()
            .find(|value_range| range_matches(&value_range.range, sheet_title))
            .map(|value_range| value_range.values.clone())
    }

    pub fn summaries(&self) -> Vec<SpreadsheetSummary> {
        let entries = self.entries.read().unwrap();
        let mut summaries: Vec<SpreadsheetSummary> = entries
            .iter()
            .map(|(id, entry)| SpreadsheetSummary {
                id: id.clone(),
                title: entry.metadata.properties.title.clone(),
                sheet_titles: entry
                    .metadata
                    .sheets
                    .iter()
                    .map(|sheet| sheet.properties.title.clone())
                    .collect(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Snapshot of every entry, for the variables export.
    pub fn entries(&self) -> Vec<(String, CacheEntry)> {
        let entries = self.entries.read().unwrap();
        let mut snapshot: Vec<(String, CacheEntry)> = entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }
}
