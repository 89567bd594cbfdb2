use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, trace, Level};
use logging_timer::timer;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use crate::error::InkfolioError;

/// Image extensions recognized in asset filenames (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

#[derive(AsRefStr, EnumString, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Thumb,
    Large,
}

impl AssetKind {
    /// The filename marker between the id and the extension.
    pub fn suffix(&self) -> &'static str {
        match self {
            AssetKind::Thumb => "_thumb",
            AssetKind::Large => "_large",
        }
    }

    pub fn file_name(&self, id: &str, ext: &str) -> String {
        format!("{}{}.{}", id, self.suffix(), ext)
    }
}

/// A single file on disk belonging to an artwork.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetFile {
    pub path: PathBuf,
    /// Lowercased extension without the dot.
    pub ext: String,
}

/// At most one thumb and one large per artwork id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetEntry {
    pub thumb: Option<AssetFile>,
    pub large: Option<AssetFile>,
}

impl AssetEntry {
    pub fn get(&self, kind: AssetKind) -> Option<&AssetFile> {
        match kind {
            AssetKind::Thumb => self.thumb.as_ref(),
            AssetKind::Large => self.large.as_ref(),
        }
    }

    fn set(&mut self, kind: AssetKind, file: AssetFile) {
        match kind {
            AssetKind::Thumb => self.thumb = Some(file),
            AssetKind::Large => self.large = Some(file),
        }
    }

    /// Present assets in (thumb, large) order.
    pub fn files(&self) -> impl Iterator<Item = (AssetKind, &AssetFile)> {
        [AssetKind::Thumb, AssetKind::Large]
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|file| (kind, file)))
    }
}

/// Splits an asset filename into `(id, kind, lowercased ext)`.
///
/// Accepts `<id>_thumb.<ext>` and `<id>_large.<ext>` where `<id>` is non-empty and
/// `<ext>` is one of [`IMAGE_EXTENSIONS`]. The marker and extension match
/// case-insensitively. Everything else is `None`.
pub fn parse_asset_name(file_name: &str) -> Option<(String, AssetKind, String)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }

    for kind in [AssetKind::Thumb, AssetKind::Large] {
        let suffix = kind.suffix();
        if stem.len() <= suffix.len() {
            continue;
        }
        let split = stem.len() - suffix.len();
        if !stem.is_char_boundary(split) {
            continue;
        }
        let (id, marker) = stem.split_at(split);
        if marker.eq_ignore_ascii_case(suffix) {
            return Some((id.to_string(), kind, ext));
        }
    }

    None
}

/// Snapshot of every conforming asset under the thumbnail and large directories,
/// keyed by artwork id.
#[derive(Clone, Debug, Default)]
pub struct AssetIndex {
    entries: BTreeMap<String, AssetEntry>,
}

impl AssetIndex {
    /// Scans both directories (thumbnails first). A later sighting of the same id
    /// and kind replaces an earlier one. Missing directories contribute nothing.
    pub fn scan(thumb_dir: &Path, large_dir: &Path) -> Result<Self, InkfolioError> {
        let _tmr = timer!(Level::Trace; "AssetIndex::scan");

        let mut index = AssetIndex::default();
        index.scan_dir(thumb_dir)?;
        index.scan_dir(large_dir)?;

        debug!("Indexed assets for {} ids", index.entries.len());
        Ok(index)
    }

    fn scan_dir(&mut self, dir: &Path) -> Result<(), InkfolioError> {
        let read_dir = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Asset directory {} does not exist", dir.display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            files.push(entry.path());
        }
        files.sort();

        for path in files {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                trace!("Ignoring non UTF-8 file name {:?}", path);
                continue;
            };

            match parse_asset_name(file_name) {
                Some((id, kind, ext)) => {
                    trace!("Indexed {} {} -> {}", kind, id, path.display());
                    self.insert(id, kind, AssetFile { path, ext });
                }
                None => trace!("Ignoring {}", path.display()),
            }
        }

        Ok(())
    }

    pub fn insert(&mut self, id: String, kind: AssetKind, file: AssetFile) {
        self.entries.entry(id).or_default().set(kind, file);
    }

    pub fn get(&self, id: &str) -> Option<&AssetEntry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AssetEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
