use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info, warn, Level};
use logging_timer::timer;

use crate::assets::{AssetIndex, AssetKind};
use crate::catalog::{Artwork, Catalog, FIELD_IMAGE, FIELD_IMAGE_HIGH};
use crate::error::InkfolioError;
use crate::ids::{IdMap, IdScheme};
use crate::rename::{AssetLayout, RenamePlan, RenameProgress};
use crate::report::{MigrationCounts, MigrationReport, MissingPathClear, ReportPaths};
use crate::utils::Utils;

#[derive(Clone, Debug)]
pub struct MigrateOptions {
    /// Project root containing the catalog and the image directories.
    pub root: PathBuf,
    /// Catalog file, absolute or relative to `root`.
    pub catalog: PathBuf,
    pub thumb_dir: String,
    pub large_dir: String,
    pub scheme: IdScheme,
    pub delete_orphans: bool,
    pub dry_run: bool,
    /// First value of the `numeric8` counter.
    pub start_index: u64,
}

impl MigrateOptions {
    pub fn catalog_path(&self) -> PathBuf {
        Utils::in_root(&self.root, &self.catalog)
    }
}

#[derive(Debug)]
pub struct MigrationOutcome {
    pub report: MigrationReport,
    pub report_paths: ReportPaths,
    pub catalog_output: Option<PathBuf>,
}

/// Catalog field that points at an asset of the given kind.
pub fn field_for(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Thumb => FIELD_IMAGE,
        AssetKind::Large => FIELD_IMAGE_HIGH,
    }
}

/// Blanks `image`/`imageHigh` values that do not name an existing file. This looks
/// at the literal recorded path only, not at the id-based asset index.
pub fn clear_missing_paths(root: &Path, records: &mut [Artwork]) -> Vec<MissingPathClear> {
    let mut clears = Vec::new();

    for (entry_index, record) in records.iter_mut().enumerate() {
        for field in [FIELD_IMAGE, FIELD_IMAGE_HIGH] {
            let value = record.str_field(field).to_string();
            if value.is_empty() || Utils::recorded_path_exists(root, &value) {
                continue;
            }
            info!("Record {}: clearing {} ({} does not exist)", entry_index, field, value);
            record.set_str_field(field, "");
            clears.push(MissingPathClear {
                entry_index,
                field: field.to_string(),
                old_value: value,
            });
        }
    }

    clears
}

/// Points every record at its new id and at the renamed assets. Assets that were
/// not found at move time keep whatever the missing-path pass left.
pub fn rewrite_records(
    records: &mut [Artwork],
    index: &AssetIndex,
    id_map: &IdMap,
    progress: &RenameProgress,
    layout: &AssetLayout,
) {
    for record in records.iter_mut() {
        let old_id = record.id();
        let Some(new_id) = id_map.get(&old_id) else {
            continue;
        };
        record.set_id(new_id);

        let Some(entry) = index.get(&old_id) else {
            continue;
        };
        for (kind, file) in entry.files() {
            if progress.is_skipped(&old_id, kind) {
                continue;
            }
            record.set_str_field(field_for(kind), &layout.catalog_path(kind, new_id, &file.ext));
        }
    }
}

/// State shared by the steps of one migration run.
struct MigrationRun<'a> {
    options: &'a MigrateOptions,
    root: PathBuf,
    stamp: String,
    layout: AssetLayout,
    report_paths: ReportPaths,
}

pub struct Migrator;

impl Migrator {
    pub fn run(options: &MigrateOptions) -> Result<MigrationOutcome, InkfolioError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        Self::run_at(options, &stamp)
    }

    /// Runs a migration whose output files carry `stamp`.
    pub fn run_at(options: &MigrateOptions, stamp: &str) -> Result<MigrationOutcome, InkfolioError> {
        let _tmr = timer!(Level::Debug; "Migrator::run");

        let root = options.root.clone();
        let run = MigrationRun {
            options,
            layout: AssetLayout::new(&root, &options.thumb_dir, &options.large_dir),
            report_paths: ReportPaths::for_stamp(&root, stamp),
            stamp: stamp.to_string(),
            root,
        };

        run.execute()
    }
}

impl MigrationRun<'_> {
    fn execute(&self) -> Result<MigrationOutcome, InkfolioError> {
        let options = self.options;
        let catalog_path = options.catalog_path();

        // Load and snapshot. Nothing on disk has been touched if either fails.
        let mut catalog = Catalog::load(&catalog_path)?;
        let index = AssetIndex::scan(
            &self.layout.dir(AssetKind::Thumb),
            &self.layout.dir(AssetKind::Large),
        )?;
        if index.is_empty() {
            warn!("No image assets found under {}", self.root.display());
        }

        let old_ids: Vec<String> = catalog.records().iter().map(Artwork::id).collect();
        let mut malformed_records = 0;
        for (record_index, id) in old_ids.iter().enumerate() {
            if id.is_empty() {
                warn!(
                    "{}; it will not be migrated",
                    InkfolioError::MalformedRecord {
                        index: record_index,
                        reason: "empty id".to_string()
                    }
                );
                malformed_records += 1;
            }
        }
        let catalog_ids: HashSet<&str> = old_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .collect();

        let orphans: Vec<PathBuf> = index
            .iter()
            .filter(|(id, _)| !catalog_ids.contains(id.as_str()))
            .flat_map(|(_, entry)| entry.files().map(|(_, file)| file.path.clone()))
            .collect();
        info!("Found {} orphaned files", orphans.len());

        let missing_path_clears = clear_missing_paths(&self.root, catalog.records_mut());

        let id_map = IdMap::generate(old_ids.iter().map(String::as_str), options.scheme, options.start_index)?;
        let plan = RenamePlan::build(&index, &id_map, &self.layout);
        if plan.is_empty() {
            info!("Every asset is already at its destination");
        }
        info!(
            "Planned {} renames for {} ids using {}",
            plan.len(),
            id_map.len(),
            options.scheme
        );

        let mut report = MigrationReport {
            timestamp: self.stamp.clone(),
            root: Utils::norm_path(&self.root),
            catalog_input: Utils::rel_from_root(&self.root, &catalog_path),
            catalog_output: None,
            id_scheme: options.scheme,
            delete_orphans: options.delete_orphans,
            dry_run: options.dry_run,
            counts: MigrationCounts {
                catalog_entries: catalog.len(),
                fs_ids_seen: index.len(),
                orphan_files: orphans.len(),
                missing_path_clears: missing_path_clears.len(),
                planned_moves: plan.len(),
                malformed_records,
                ..Default::default()
            },
            missing_path_clears,
            deleted_files: Vec::new(),
            skipped_sources: Vec::new(),
            renames: plan.renames().to_vec(),
            committed: Vec::new(),
            stranded: Vec::new(),
            id_map: id_map.entries().to_vec(),
            error: None,
        };

        // Mutation starts here. Whatever happens, the report gets written.
        let mut progress = RenameProgress::default();
        let applied = self.apply(&orphans, &plan, &mut progress, &mut report);

        report.counts.deleted_files = report.deleted_files.len();
        report.counts.executed_moves = progress.committed.len();
        report.counts.skipped_sources = progress.skipped.len();
        report.skipped_sources = progress.skipped.clone();
        report.committed = plan.committed_rels(&progress);
        report.stranded = plan.stranded_files(&progress);

        if let Err(e) = applied {
            report.error = Some(e.to_string());
            if let Err(write_err) = report.write(&self.report_paths) {
                error!(
                    "Failed to write report {}: {}",
                    self.report_paths.json.display(),
                    write_err
                );
            }
            return Err(e);
        }

        rewrite_records(catalog.records_mut(), &index, &id_map, &progress, &self.layout);

        let catalog_output = if options.dry_run {
            None
        } else {
            let out = self
                .root
                .join(format!("{}.migrated.{}.json", catalog.stem(), self.stamp));
            catalog.save_as(&out)?;
            report.catalog_output = Some(Utils::rel_from_root(&self.root, &out));
            Some(out)
        };

        report.write(&self.report_paths)?;

        Ok(MigrationOutcome {
            report,
            report_paths: self.report_paths.clone(),
            catalog_output,
        })
    }

    /// Orphan deletion followed by the two rename phases.
    fn apply(
        &self,
        orphans: &[PathBuf],
        plan: &RenamePlan,
        progress: &mut RenameProgress,
        report: &mut MigrationReport,
    ) -> Result<(), InkfolioError> {
        let dry_run = self.options.dry_run;

        if self.options.delete_orphans {
            for path in orphans {
                if !dry_run && path.is_file() {
                    fs::remove_file(path)?;
                    info!("Deleted orphan {}", path.display());
                }
                report.deleted_files.push(Utils::rel_from_root(&self.root, path));
            }
        }

        plan.execute(dry_run, progress)
    }
}
