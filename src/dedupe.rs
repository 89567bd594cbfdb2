use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::catalog::{Artwork, Catalog};
use crate::error::InkfolioError;
use crate::utils::Utils;

pub const DUPLICATE_REASON: &str = "Duplicate title";

/// One occurrence of a repeated title.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DuplicateEntry {
    pub id: Value,
    pub year: Value,
    pub format: Value,
    #[serde(rename = "sizeCm")]
    pub size_cm: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DuplicateTitle {
    pub title: String,
    /// In catalog order; the first is the one kept.
    pub entries: Vec<DuplicateEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RemovedDuplicate {
    pub id: Value,
    pub title: Value,
    pub year: Value,
    pub reason: String,
}

#[derive(Debug)]
pub struct DedupeOutcome {
    pub original: usize,
    pub kept: usize,
    pub duplicates: Vec<DuplicateTitle>,
    pub removed: Vec<RemovedDuplicate>,
    pub cleaned_path: PathBuf,
    pub removed_path: Option<PathBuf>,
}

fn field(record: &Artwork, name: &str) -> Value {
    record.get(name).cloned().unwrap_or(Value::Null)
}

/// Titles (trimmed, non-empty) that occur more than once, in order of first
/// appearance.
pub fn analyze_duplicates(records: &[Artwork]) -> Vec<DuplicateTitle> {
    let mut titles: Vec<DuplicateTitle> = Vec::new();

    for record in records {
        let title = record.title();
        if title.is_empty() {
            continue;
        }
        let entry = DuplicateEntry {
            id: field(record, "id"),
            year: field(record, "year"),
            format: field(record, "format"),
            size_cm: field(record, "sizeCm"),
        };
        match titles.iter_mut().find(|t| t.title == title) {
            Some(t) => t.entries.push(entry),
            None => titles.push(DuplicateTitle {
                title: title.to_string(),
                entries: vec![entry],
            }),
        }
    }

    titles.retain(|t| t.entries.len() > 1);
    titles
}

/// Keeps the first record of every title. Records without a title are always kept.
pub fn remove_duplicates_by_title(records: Vec<Artwork>) -> (Vec<Artwork>, Vec<RemovedDuplicate>) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());
    let mut removed = Vec::new();

    for record in records {
        let title = record.title().to_string();
        if title.is_empty() {
            warn!("Artwork '{}' has no title; keeping it", record.id());
            kept.push(record);
        } else if seen.insert(title.clone()) {
            kept.push(record);
        } else {
            info!("Removing duplicate '{}': {}", record.id(), title);
            removed.push(RemovedDuplicate {
                id: field(&record, "id"),
                title: field(&record, "title"),
                year: field(&record, "year"),
                reason: DUPLICATE_REASON.to_string(),
            });
        }
    }

    (kept, removed)
}

fn sibling(input: &Path, name: String) -> PathBuf {
    match input.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

pub fn print_duplicates(duplicates: &[DuplicateTitle]) {
    if duplicates.is_empty() {
        println!("No duplicates found");
        return;
    }
    println!("Found {} titles with duplicates:", duplicates.len());
    for dup in duplicates {
        println!();
        println!("Title: '{}' ({} occurrences)", dup.title, dup.entries.len());
        for (i, entry) in dup.entries.iter().enumerate() {
            let status = if i == 0 { "KEEPING" } else { "REMOVING" };
            println!(
                "  {:<8} {} ({}) - {} - {}",
                status,
                display_value(&entry.id),
                display_value(&entry.year),
                display_value(&entry.format),
                display_value(&entry.size_cm)
            );
        }
    }
}

pub struct Deduplicator;

impl Deduplicator {
    /// Writes `<stem>_cleaned.json` next to the input and, when anything was
    /// dropped, `<stem>_removed_duplicates.json`. The input is left as is.
    pub fn run(input: &Path) -> Result<DedupeOutcome, InkfolioError> {
        let catalog = Catalog::load(input)?;
        let stem = catalog.stem();
        let extension = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let duplicates = analyze_duplicates(catalog.records());
        let original = catalog.len();
        let (kept, removed) = remove_duplicates_by_title(catalog.into_records());

        let cleaned_path = sibling(input, format!("{}_cleaned{}", stem, extension));
        let cleaned = Catalog::new(cleaned_path.clone(), kept);
        cleaned.save_as(&cleaned_path)?;

        let removed_path = if removed.is_empty() {
            None
        } else {
            let path = sibling(input, format!("{}_removed_duplicates.json", stem));
            Utils::write_json_pretty(&path, &removed)?;
            Some(path)
        };

        Ok(DedupeOutcome {
            original,
            kept: cleaned.len(),
            duplicates,
            removed,
            cleaned_path,
            removed_path,
        })
    }
}

impl DedupeOutcome {
    pub fn print_summary(&self) {
        println!("{:<22} {}", "Original artworks:", self.original);
        println!("{:<22} {}", "Unique artworks:", self.kept);
        println!("{:<22} {}", "Duplicates removed:", self.removed.len());
        println!("Cleaned catalog: {}", self.cleaned_path.display());
        if let Some(path) = &self.removed_path {
            println!("Removed entries: {}", path.display());
        }
    }
}
