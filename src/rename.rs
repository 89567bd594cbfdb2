use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn, Level};
use logging_timer::timer;
use serde::Serialize;

use crate::assets::{AssetIndex, AssetKind};
use crate::error::InkfolioError;
use crate::ids::IdMap;
use crate::utils::Utils;

/// Directory created next to each destination to hold files between the two phases.
pub const STAGING_DIR_NAME: &str = ".__moving";
pub const STAGING_SUFFIX: &str = ".__tmp";

/// Where assets live relative to the project root.
#[derive(Clone, Debug)]
pub struct AssetLayout {
    root: PathBuf,
    thumb_rel: String,
    large_rel: String,
}

impl AssetLayout {
    pub fn new(root: &Path, thumb_rel: &str, large_rel: &str) -> Self {
        AssetLayout {
            root: root.to_owned(),
            thumb_rel: Utils::clean_rel_dir(thumb_rel),
            large_rel: Utils::clean_rel_dir(large_rel),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rel_dir(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Thumb => &self.thumb_rel,
            AssetKind::Large => &self.large_rel,
        }
    }

    pub fn dir(&self, kind: AssetKind) -> PathBuf {
        self.root.join(self.rel_dir(kind))
    }

    /// `<dir>/<id>_<kind>.<ext>` relative to the root.
    pub fn rel_path(&self, kind: AssetKind, id: &str, ext: &str) -> String {
        let file_name = kind.file_name(id, ext);
        if self.rel_dir(kind).is_empty() {
            file_name
        } else {
            format!("{}/{}", self.rel_dir(kind), file_name)
        }
    }

    /// The form stored in the catalog: `./<dir>/<id>_<kind>.<ext>`.
    pub fn catalog_path(&self, kind: AssetKind, id: &str, ext: &str) -> String {
        format!("./{}", self.rel_path(kind, id, ext))
    }

    pub fn abs_path(&self, kind: AssetKind, id: &str, ext: &str) -> PathBuf {
        self.dir(kind).join(kind.file_name(id, ext))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlannedRename {
    pub kind: AssetKind,
    pub old_id: String,
    pub new_id: String,
    pub old_rel: String,
    pub new_rel: String,
    /// Where the file waits between the two phases, relative to the root.
    pub staged_rel: String,
    #[serde(skip)]
    pub source: PathBuf,
    #[serde(skip)]
    pub staged: PathBuf,
    #[serde(skip)]
    pub destination: PathBuf,
}

/// An asset that was indexed but gone by the time it was to be staged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub kind: AssetKind,
    pub old_id: String,
    pub old_rel: String,
}

/// A file left in the staging area by an aborted commit phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StrandedFile {
    pub kind: AssetKind,
    pub old_id: String,
    pub old_rel: String,
    pub staged_rel: String,
    pub new_rel: String,
}

/// What has happened so far. Kept outside the executor so a failed run can still
/// report every move that completed.
#[derive(Clone, Debug, Default)]
pub struct RenameProgress {
    pub skipped: Vec<SkippedSource>,
    pub staged: Vec<usize>,
    pub committed: Vec<usize>,
}

impl RenameProgress {
    pub fn is_skipped(&self, old_id: &str, kind: AssetKind) -> bool {
        self.skipped
            .iter()
            .any(|s| s.kind == kind && s.old_id == old_id)
    }

    /// Indices into the plan that were staged but never committed.
    pub fn stranded(&self) -> impl Iterator<Item = usize> + '_ {
        self.staged
            .iter()
            .copied()
            .filter(|i| !self.committed.contains(i))
    }
}

/// Every rename computed before anything on disk changes.
#[derive(Clone, Debug, Default)]
pub struct RenamePlan {
    renames: Vec<PlannedRename>,
}

impl RenamePlan {
    /// Plans a rename for every indexed asset whose id is in the map. Assets of ids
    /// outside the map (orphans) are left alone, as are assets already at their
    /// destination.
    pub fn build(index: &AssetIndex, id_map: &IdMap, layout: &AssetLayout) -> Self {
        let mut renames = Vec::new();

        for (old_id, entry) in index.iter() {
            let Some(new_id) = id_map.get(old_id) else {
                continue;
            };

            for (kind, file) in entry.files() {
                let destination = layout.abs_path(kind, new_id, &file.ext);
                if Utils::norm_path(&destination) == Utils::norm_path(&file.path) {
                    debug!("{} already at {}", old_id, destination.display());
                    continue;
                }

                let staged = Self::staging_path(&destination);
                renames.push(PlannedRename {
                    kind,
                    old_id: old_id.clone(),
                    new_id: new_id.to_string(),
                    old_rel: Utils::rel_from_root(layout.root(), &file.path),
                    new_rel: layout.rel_path(kind, new_id, &file.ext),
                    staged_rel: Utils::rel_from_root(layout.root(), &staged),
                    source: file.path.clone(),
                    staged,
                    destination,
                });
            }
        }

        RenamePlan { renames }
    }

    /// `<dest dir>/.__moving/<dest name>.__tmp`. Named after the destination so no
    /// two planned files can share a staging name.
    pub fn staging_path(destination: &Path) -> PathBuf {
        let base_dir = destination.parent().unwrap_or_else(|| Path::new(""));
        let mut name = destination
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(STAGING_SUFFIX);
        base_dir.join(STAGING_DIR_NAME).join(name)
    }

    pub fn renames(&self) -> &[PlannedRename] {
        &self.renames
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }

    /// Final names of the committed moves, in commit order.
    pub fn committed_rels(&self, progress: &RenameProgress) -> Vec<String> {
        progress
            .committed
            .iter()
            .map(|&i| self.renames[i].new_rel.clone())
            .collect()
    }

    pub fn stranded_files(&self, progress: &RenameProgress) -> Vec<StrandedFile> {
        progress
            .stranded()
            .map(|i| {
                let r = &self.renames[i];
                StrandedFile {
                    kind: r.kind,
                    old_id: r.old_id.clone(),
                    old_rel: r.old_rel.clone(),
                    staged_rel: r.staged_rel.clone(),
                    new_rel: r.new_rel.clone(),
                }
            })
            .collect()
    }

    /// Runs both phases. Nothing is committed until every source has been staged, so
    /// a source can never be overwritten by another file's final name.
    ///
    /// Under `dry_run` no file moves: sources are checked for existence and
    /// destinations for files the real run would refuse to overwrite.
    /// A destination that already exists aborts the run with `DestinationConflict`;
    /// moves completed before it are recorded in `progress` and are not undone.
    pub fn execute(&self, dry_run: bool, progress: &mut RenameProgress) -> Result<(), InkfolioError> {
        let mut movable = Vec::with_capacity(self.renames.len());
        {
            let _tmr = timer!(Level::Trace; "RenamePlan::stage", "{}", self.renames.len());
            for (i, rename) in self.renames.iter().enumerate() {
                if !rename.source.is_file() {
                    warn!("{}", InkfolioError::SourceMissing { path: rename.source.clone() });
                    progress.skipped.push(SkippedSource {
                        kind: rename.kind,
                        old_id: rename.old_id.clone(),
                        old_rel: rename.old_rel.clone(),
                    });
                    continue;
                }
                if dry_run {
                    movable.push(i);
                    continue;
                }
                Self::safe_rename(&rename.source, &rename.staged)?;
                progress.staged.push(i);
            }
        }

        if dry_run {
            return self.check_destinations(&movable);
        }

        {
            let _tmr = timer!(Level::Trace; "RenamePlan::commit", "{}", progress.staged.len());
            let staged = progress.staged.clone();
            for i in staged {
                let rename = &self.renames[i];
                Self::safe_rename(&rename.staged, &rename.destination)?;
                info!("{} -> {}", rename.old_rel, rename.new_rel);
                progress.committed.push(i);
            }
        }

        self.remove_staging_dirs();
        Ok(())
    }

    /// Fails like the commit phase would: a destination is free only if nothing is
    /// there or the file there is itself staged away first.
    fn check_destinations(&self, movable: &[usize]) -> Result<(), InkfolioError> {
        let vacated: HashSet<String> = movable
            .iter()
            .map(|&i| Utils::norm_path(&self.renames[i].source))
            .collect();

        for &i in movable {
            let destination = &self.renames[i].destination;
            if fs::symlink_metadata(destination).is_ok() && !vacated.contains(&Utils::norm_path(destination)) {
                return Err(InkfolioError::DestinationConflict {
                    path: destination.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Renames `src` to `dst`, creating the destination directory. Refuses to
    /// overwrite an existing destination.
    pub fn safe_rename(src: &Path, dst: &Path) -> Result<(), InkfolioError> {
        if Utils::norm_path(src) == Utils::norm_path(dst) {
            return Ok(());
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::symlink_metadata(dst).is_ok() {
            return Err(InkfolioError::DestinationConflict { path: dst.to_owned() });
        }
        fs::rename(src, dst)?;
        debug!("Moved {} -> {}", src.display(), dst.display());
        Ok(())
    }

    fn remove_staging_dirs(&self) {
        let dirs: BTreeSet<&Path> = self
            .renames
            .iter()
            .filter_map(|r| r.staged.parent())
            .collect();

        for dir in dirs {
            // Only succeeds when empty, which is what we want
            if let Err(e) = fs::remove_dir(dir) {
                debug!("Leaving staging directory {}: {}", dir.display(), e);
            }
        }
    }
}
