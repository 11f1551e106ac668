//! Model metadata reporting

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::loader::load_workbook;
use crate::types::{SheetInfo, Workbook};

/// Sheet listing for an export.
///
/// `sheets` mirrors the manifest, including entries whose file failed to
/// load; `has_model` is true only when at least one sheet loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub sheets: Vec<SheetInfo>,
    pub active_sheet: String,
    pub has_model: bool,
}

impl ModelMetadata {
    pub fn from_workbook(workbook: &Workbook) -> Self {
        Self {
            sheets: workbook.sheets.clone(),
            active_sheet: workbook.active_sheet.clone(),
            has_model: workbook.has_model(),
        }
    }

    pub fn visible_sheets(&self) -> impl Iterator<Item = &SheetInfo> {
        self.sheets.iter().filter(|s| s.visibility == "visible")
    }
}

pub fn get_model_metadata(export_dir: &Path) -> ModelMetadata {
    ModelMetadata::from_workbook(&load_workbook(export_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sheet;

    #[test]
    fn test_empty_workbook_has_no_model() {
        let meta = ModelMetadata::from_workbook(&Workbook::new());
        assert_eq!(meta, ModelMetadata::default());
        assert!(!meta.has_model);
    }

    #[test]
    fn test_manifest_entries_are_listed() {
        let mut wb = Workbook::new();
        wb.sheets.push(SheetInfo {
            name: "Gone".to_string(),
            file: "Gone.json".to_string(),
            visibility: "visible".to_string(),
        });
        let mut hidden = Sheet::new("Calc");
        hidden.visibility = "hidden".to_string();
        wb.add_sheet(Sheet::new("Main"));
        wb.add_sheet(hidden);
        wb.active_sheet = "Main".to_string();

        let meta = ModelMetadata::from_workbook(&wb);
        let names: Vec<&str> = meta.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Gone", "Main", "Calc"]);
        assert_eq!(meta.active_sheet, "Main");
        assert!(meta.has_model);
        assert_eq!(meta.visible_sheets().count(), 2);
    }

    #[test]
    fn test_metadata_json_shape() {
        let mut wb = Workbook::new();
        wb.add_sheet(Sheet::new("Main"));
        let json = serde_json::to_value(ModelMetadata::from_workbook(&wb)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sheets": [{ "name": "Main", "file": "", "visibility": "visible" }],
                "active_sheet": "Main",
                "has_model": true
            })
        );
    }
}
