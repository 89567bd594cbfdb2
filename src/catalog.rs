use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InkfolioError;
use crate::utils::Utils;

pub const FIELD_ID: &str = "id";
pub const FIELD_IMAGE: &str = "image";
pub const FIELD_IMAGE_HIGH: &str = "imageHigh";

/// One artwork record. Only a handful of fields are interpreted; everything else
/// is carried through untouched and in its original order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artwork {
    fields: Map<String, Value>,
}

impl Artwork {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Artwork { fields }),
            _ => None,
        }
    }

    /// The record id as used for filenames. String ids are trimmed and numeric ids
    /// are rendered as their JSON text. Anything else yields an empty id.
    pub fn id(&self) -> String {
        match self.fields.get(FIELD_ID) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn set_id(&mut self, id: &str) {
        self.fields.insert(FIELD_ID.to_string(), Value::String(id.to_string()));
    }

    /// A string field, or empty when it is absent or not a string.
    pub fn str_field(&self, name: &str) -> &str {
        self.fields.get(name).and_then(Value::as_str).unwrap_or("")
    }

    pub fn set_str_field(&mut self, name: &str, value: &str) {
        self.fields.insert(name.to_string(), Value::String(value.to_string()));
    }

    pub fn title(&self) -> &str {
        self.str_field("title").trim()
    }

    pub fn title_en(&self) -> &str {
        self.str_field("titleEn")
    }

    pub fn size_cm(&self) -> &str {
        self.str_field("sizeCm")
    }

    /// The `year` field as text. Numbers are rendered as written; a missing or
    /// empty year is `None`.
    pub fn year(&self) -> Option<String> {
        match self.fields.get("year") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Raw access for fields that are reported verbatim (e.g. `format`).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    path: PathBuf,
    records: Vec<Artwork>,
}

impl Catalog {
    pub fn new(path: PathBuf, records: Vec<Artwork>) -> Self {
        Catalog { path, records }
    }

    /// Reads and parses the catalog. Any failure is reported as `CatalogUnreadable`
    /// so callers can abort before touching the filesystem.
    pub fn load(path: &Path) -> Result<Self, InkfolioError> {
        let unreadable = |reason: String| InkfolioError::CatalogUnreadable {
            path: path.to_owned(),
            reason,
        };

        if !path.is_file() {
            return Err(unreadable("file not found".to_string()));
        }

        let text = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| unreadable(format!("JSON parse failed: {}", e)))?;

        let Value::Array(items) = value else {
            return Err(unreadable("expected a JSON array of records".to_string()));
        };

        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let record = Artwork::from_value(item)
                .ok_or_else(|| unreadable(format!("record {} is not an object", index)))?;
            records.push(record);
        }

        info!("Loaded {} artworks from {}", records.len(), path.display());

        Ok(Catalog {
            path: path.to_owned(),
            records,
        })
    }

    pub fn save_as(&self, path: &Path) -> Result<(), InkfolioError> {
        Utils::write_json_pretty(path, &self.records)?;
        debug!("Wrote {} artworks to {}", self.records.len(), path.display());
        Ok(())
    }

    /// Copies the catalog file to `<file>.backup` before it gets rewritten in place.
    pub fn backup(&self) -> Result<PathBuf, InkfolioError> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".backup");
        let backup_path = PathBuf::from(name);
        fs::copy(&self.path, &backup_path)?;
        info!("Created backup: {}", backup_path.display());
        Ok(backup_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem of the catalog (`artworks` for `artworks.json`).
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artworks".to_string())
    }

    pub fn records(&self) -> &[Artwork] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<Artwork> {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<Artwork> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn artwork(value: Value) -> Artwork {
        Artwork::from_value(value).unwrap()
    }

    #[test]
    fn test_id_is_trimmed_and_numbers_are_rendered() {
        assert_eq!(artwork(json!({"id": " 2020_001 "})).id(), "2020_001");
        assert_eq!(artwork(json!({"id": 42})).id(), "42");
        assert_eq!(artwork(json!({"id": null})).id(), "");
        assert_eq!(artwork(json!({"title": "無題"})).id(), "");
    }

    #[test]
    fn test_year_text() {
        assert_eq!(artwork(json!({"year": 2020})).year().as_deref(), Some("2020"));
        assert_eq!(artwork(json!({"year": "2022.8"})).year().as_deref(), Some("2022.8"));
        assert_eq!(artwork(json!({"year": ""})).year(), None);
        assert_eq!(artwork(json!({})).year(), None);
    }

    #[test]
    fn test_load_missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let err = Catalog::load(&dir.path().join("artworks.json")).unwrap_err();
        assert!(matches!(err, InkfolioError::CatalogUnreadable { .. }));
    }

    #[test]
    fn test_load_malformed_json_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artworks.json");
        fs::write(&path, "[{\"id\": ").unwrap();
        let err = Catalog::load(&path).unwrap_err();
        match err {
            InkfolioError::CatalogUnreadable { reason, .. } => assert!(reason.contains("JSON parse failed")),
            other => panic!("unexpected error: {:?}", other),
        }

        fs::write(&path, "{\"id\": \"x\"}").unwrap();
        assert!(matches!(
            Catalog::load(&path).unwrap_err(),
            InkfolioError::CatalogUnreadable { .. }
        ));
    }

    #[test]
    fn test_save_preserves_field_order_and_unicode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artworks.json");
        let original = r#"[
  {
    "title": "黃山雲海",
    "id": "2020_001",
    "sizeCm": "68 x 45",
    "image": "./images/paintings/thumbnails/2020_001_thumb.png"
  }
]
"#;
        fs::write(&path, original).unwrap();

        let catalog = Catalog::load(&path).unwrap();
        let out = dir.path().join("out.json");
        catalog.save_as(&out).unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), original);
    }

    #[test]
    fn test_backup_copies_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artworks.json");
        fs::write(&path, "[]").unwrap();

        let catalog = Catalog::load(&path).unwrap();
        let backup = catalog.backup().unwrap();
        assert_eq!(backup, dir.path().join("artworks.json.backup"));
        assert_eq!(fs::read_to_string(backup).unwrap(), "[]");
        assert_eq!(catalog.stem(), "artworks");
    }
}
