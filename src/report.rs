use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::InkfolioError;
use crate::ids::{IdMapEntry, IdScheme};
use crate::rename::{PlannedRename, SkippedSource, StrandedFile};
use crate::utils::Utils;

pub const CSV_HEADER: [&str; 5] = ["kind", "old_id", "new_id", "old_rel", "new_rel"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MigrationCounts {
    pub catalog_entries: usize,
    pub fs_ids_seen: usize,
    pub orphan_files: usize,
    pub missing_path_clears: usize,
    pub planned_moves: usize,
    pub executed_moves: usize,
    pub skipped_sources: usize,
    pub deleted_files: usize,
    pub malformed_records: usize,
}

/// A catalog path field blanked because the file it named did not exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MissingPathClear {
    pub entry_index: usize,
    pub field: String,
    pub old_value: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MigrationReport {
    pub timestamp: String,
    pub root: String,
    pub catalog_input: String,
    pub catalog_output: Option<String>,
    pub id_scheme: IdScheme,
    pub delete_orphans: bool,
    pub dry_run: bool,
    pub counts: MigrationCounts,
    pub missing_path_clears: Vec<MissingPathClear>,
    pub deleted_files: Vec<String>,
    pub skipped_sources: Vec<SkippedSource>,
    pub renames: Vec<PlannedRename>,
    /// `new_rel` of every move that reached its final name, in commit order.
    pub committed: Vec<String>,
    /// Files staged but never committed; recover them from `staged_rel`.
    pub stranded: Vec<StrandedFile>,
    pub id_map: Vec<IdMapEntry>,
    pub error: Option<String>,
}

/// Where the two report files of one run go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

impl ReportPaths {
    pub fn for_stamp(root: &Path, stamp: &str) -> Self {
        ReportPaths {
            json: root.join(format!("migration_report.{}.json", stamp)),
            csv: root.join(format!("migration_report.{}.csv", stamp)),
        }
    }
}

impl MigrationReport {
    /// Writes the structured and the tabular form. Both are always produced,
    /// dry run or not.
    pub fn write(&self, paths: &ReportPaths) -> Result<(), InkfolioError> {
        Utils::write_json_pretty(&paths.json, self)?;
        fs::write(&paths.csv, self.to_csv())?;
        Ok(())
    }

    pub fn to_csv(&self) -> String {
        let mut out = Utils::csv_row(&CSV_HEADER);
        for r in &self.renames {
            out.push_str(&Utils::csv_row(&[
                r.kind.as_ref(),
                &r.old_id,
                &r.new_id,
                &r.old_rel,
                &r.new_rel,
            ]));
        }
        out
    }

    pub fn print_summary(&self, root: &Path, paths: &ReportPaths) {
        let c = &self.counts;
        println!("Migration Summary{}", if self.dry_run { " (dry run)" } else { "" });
        println!("-----------------");
        println!("{:<22} {}", "Catalog entries:", c.catalog_entries);
        println!("{:<22} {}", "Ids on disk:", c.fs_ids_seen);
        println!("{:<22} {}", "Orphan files:", c.orphan_files);
        println!("{:<22} {}", "Missing path clears:", c.missing_path_clears);
        println!("{:<22} {}", "Planned moves:", c.planned_moves);
        println!("{:<22} {}", "Executed moves:", c.executed_moves);
        println!("{:<22} {}", "Skipped sources:", c.skipped_sources);
        println!("{:<22} {}", "Deleted files:", c.deleted_files);
        println!("{:<22} {}", "Malformed records:", c.malformed_records);
        println!();
        println!("Reports:");
        println!(" - {}", Utils::rel_from_root(root, &paths.json));
        println!(" - {}", Utils::rel_from_root(root, &paths.csv));
        match &self.catalog_output {
            Some(out) => println!("Migrated catalog: {}", out),
            None => println!("Migrated catalog: (dry run, not written)"),
        }
        if let Some(error) = &self.error {
            println!("Run aborted: {}", error);
        }
        if !self.stranded.is_empty() {
            println!("Files left in the staging area:");
            for file in &self.stranded {
                println!(" - {} (meant for {})", file.staged_rel, file.new_rel);
            }
        }
    }
}
