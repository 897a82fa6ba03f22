use serde::{Deserialize, Serialize};

// https://developers.google.com/sheets/api/reference/rest/v4/spreadsheets#Spreadsheet
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Spreadsheet {
    pub spreadsheet_id: String,
    pub properties: SpreadsheetProperties,
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SpreadsheetProperties {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Sheet {
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
    #[serde(default)]
    pub index: i64,
}

// https://developers.google.com/sheets/api/reference/rest/v4/spreadsheets.values#ValueRange
//
// Trailing empty rows and cells are not transmitted, so `values` is sparse;
// a missing cell means absent, not empty string.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ValueRange {
    pub range: String,
    #[serde(default)]
    pub values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BatchGetResponse {
    #[serde(default)]
    pub(super) value_ranges: Vec<ValueRange>,
}

/// One request in the batch-update vocabulary.
///
/// Externally tagged so each variant serializes to the wire shape Google
/// expects, e.g. `{"addSheet": {"properties": {"title": "..."}}}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BatchRequest {
    AddSheet {
        properties: NewSheetProperties,
    },
    DuplicateSheet {
        source_sheet_id: i64,
        insert_sheet_index: i64,
        new_sheet_name: String,
    },
    /// With `fields: "userEnteredValue"` and a sheet-only range this clears
    /// every user-entered value on the sheet.
    UpdateCells {
        range: SheetScopedRange,
        fields: String,
    },
    DeleteDimension {
        range: DimensionRange,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewSheetProperties {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SheetScopedRange {
    pub sheet_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dimension {
    Rows,
    Columns,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DimensionRange {
    pub sheet_id: i64,
    pub dimension: Dimension,
    pub start_index: i64,
    pub end_index: i64,
}

impl BatchRequest {
    pub fn add_sheet(title: &str) -> Self {
        BatchRequest::AddSheet {
            properties: NewSheetProperties {
                title: title.to_string(),
            },
        }
    }

    pub fn duplicate_sheet(source_sheet_id: i64, insert_sheet_index: i64, new_name: &str) -> Self {
        BatchRequest::DuplicateSheet {
            source_sheet_id,
            insert_sheet_index,
            new_sheet_name: new_name.to_string(),
        }
    }

    pub fn clear_sheet(sheet_id: i64) -> Self {
        BatchRequest::UpdateCells {
            range: SheetScopedRange { sheet_id },
            fields: "userEnteredValue".to_string(),
        }
    }

    pub fn delete_dimension(sheet_id: i64, dimension: Dimension, start: i64, stop: i64) -> Self {
        BatchRequest::DeleteDimension {
            range: DimensionRange {
                sheet_id,
                dimension,
                start_index: start,
                end_index: stop,
            },
        }
    }
}
