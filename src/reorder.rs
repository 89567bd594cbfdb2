use std::path::{Path, PathBuf};

use log::{info, warn, Level};
use logging_timer::timer;

use crate::assets::{AssetIndex, AssetKind};
use crate::catalog::{Artwork, Catalog};
use crate::error::InkfolioError;
use crate::ids::IdMap;
use crate::migrate::{clear_missing_paths, rewrite_records};
use crate::rename::{AssetLayout, RenamePlan, RenameProgress};
use crate::utils::Utils;

pub const UNKNOWN_YEAR: &str = "unknown";

/// Records sharing a `year`, as indices into the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YearGroup {
    pub year: String,
    pub members: Vec<usize>,
}

/// Current numbering of one year group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YearAnalysis {
    pub year: String,
    pub count: usize,
    /// Sequence numbers parsed from `<year>_<n>` ids, ascending.
    pub numbers: Vec<u32>,
    pub gaps: Vec<String>,
}

impl YearAnalysis {
    pub fn is_sequential(&self) -> bool {
        self.numbers.iter().copied().eq(1..=self.numbers.len() as u32)
    }
}

#[derive(Clone, Debug)]
pub struct ReorderOptions {
    pub root: PathBuf,
    pub catalog: PathBuf,
    pub thumb_dir: String,
    pub large_dir: String,
    pub dry_run: bool,
}

/// Outcome of a post-run check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verification {
    pub years: Vec<YearAnalysis>,
    /// `<id>_thumb` / `<id>_large` entries with no file on disk.
    pub missing_files: Vec<String>,
}

impl Verification {
    pub fn is_clean(&self) -> bool {
        self.missing_files.is_empty() && self.years.iter().all(YearAnalysis::is_sequential)
    }
}

#[derive(Debug)]
pub struct ReorderOutcome {
    pub analysis: Vec<YearAnalysis>,
    pub id_map: IdMap,
    pub plan: RenamePlan,
    pub backup: Option<PathBuf>,
    pub verification: Option<Verification>,
}

pub fn format_id(year: &str, number: u32) -> String {
    format!("{}_{:03}", year, number)
}

/// The `<n>` of an id shaped `<year>_<n>[_...]`.
pub fn sequence_number(id: &str, year: &str) -> Option<u32> {
    let rest = id.strip_prefix(year)?.strip_prefix('_')?;
    rest.split('_').next()?.parse().ok()
}

fn year_sort_key(year: &str) -> (u8, u64) {
    if !year.is_empty() && year.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = year.parse() {
            return (0, n);
        }
    }
    (1, 0)
}

/// Groups records by year. Numeric years come first in ascending order; every
/// other year (including `unknown`) follows in order of first appearance.
pub fn group_by_year(records: &[Artwork]) -> Vec<YearGroup> {
    let mut groups: Vec<YearGroup> = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let year = record.year().unwrap_or_else(|| UNKNOWN_YEAR.to_string());
        match groups.iter_mut().find(|g| g.year == year) {
            Some(group) => group.members.push(i),
            None => groups.push(YearGroup {
                year,
                members: vec![i],
            }),
        }
    }

    groups.sort_by_key(|g| year_sort_key(&g.year));
    groups
}

pub fn analyze(records: &[Artwork], groups: &[YearGroup]) -> Vec<YearAnalysis> {
    groups
        .iter()
        .map(|group| {
            let mut numbers: Vec<u32> = group
                .members
                .iter()
                .filter_map(|&i| sequence_number(&records[i].id(), &group.year))
                .collect();
            numbers.sort_unstable();

            let gaps = (1..=numbers.len() as u32)
                .filter(|n| numbers.binary_search(n).is_err())
                .map(|n| format_id(&group.year, n))
                .collect();

            YearAnalysis {
                year: group.year.clone(),
                count: group.members.len(),
                numbers,
                gaps,
            }
        })
        .collect()
}

/// New ids `<year>_001`, `<year>_002`, ... within each year, ordered by title.
/// Records without an id are left out; a repeated id is an error.
pub fn sequential_mapping(records: &[Artwork], groups: &[YearGroup]) -> Result<IdMap, InkfolioError> {
    let mut pairs = Vec::with_capacity(records.len());

    for group in groups {
        let mut members: Vec<(usize, &Artwork)> = Vec::with_capacity(group.members.len());
        for &i in &group.members {
            if records[i].id().is_empty() {
                warn!(
                    "{}; it keeps its place unnumbered",
                    InkfolioError::MalformedRecord {
                        index: i,
                        reason: "empty id".to_string()
                    }
                );
                continue;
            }
            members.push((i, &records[i]));
        }
        members.sort_by(|(_, a), (_, b)| a.str_field("title").cmp(b.str_field("title")));

        for (n, (_, record)) in members.iter().enumerate() {
            pairs.push((record.id(), format_id(&group.year, n as u32 + 1)));
        }
    }

    IdMap::from_pairs(pairs)
}

fn abbreviate(items: &[String], shown: usize) -> String {
    let mut text = items.iter().take(shown).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > shown {
        text.push_str(&format!(" +{} more", items.len() - shown));
    }
    text
}

pub fn print_analysis(analysis: &[YearAnalysis]) {
    println!("{:<10} {:<6} {:<30} Gaps", "Year", "Count", "Current IDs");
    println!("{}", "-".repeat(70));
    for year in analysis {
        let current: Vec<String> = year.numbers.iter().map(|&n| format_id(&year.year, n)).collect();
        let gaps = if year.gaps.is_empty() {
            "None".to_string()
        } else {
            abbreviate(&year.gaps, 5)
        };
        println!(
            "{:<10} {:<6} {:<30} {}",
            year.year,
            year.count,
            abbreviate(&current, 3),
            gaps
        );
    }
}

pub fn print_mapping(id_map: &IdMap) {
    for entry in id_map.entries() {
        if entry.old_id != entry.new_id {
            println!("  {} -> {}", entry.old_id, entry.new_id);
        }
    }
    println!();
    println!("{:<22} {}", "Artworks:", id_map.len());
    println!("{:<22} {}", "Id changes:", id_map.changed_count());
    println!("{:<22} {}", "Unchanged:", id_map.len() - id_map.changed_count());
}

pub fn print_verification(verification: &Verification) {
    println!("{:<10} {:<6} {:<20} Sequential", "Year", "Count", "Range");
    println!("{}", "-".repeat(50));
    for year in &verification.years {
        let range = match (year.numbers.first(), year.numbers.last()) {
            (Some(&first), Some(&last)) => {
                format!("{}-{}", format_id(&year.year, first), format_id(&year.year, last))
            }
            _ => "None".to_string(),
        };
        let status = if year.is_sequential() { "yes" } else { "no" };
        println!("{:<10} {:<6} {:<20} {}", year.year, year.count, range, status);
    }
    println!();
    println!("{:<22} {}", "Missing files:", verification.missing_files.len());
    for missing in verification.missing_files.iter().take(10) {
        println!(" - {}", missing);
    }
}

pub struct Reorderer;

impl Reorderer {
    pub fn run(options: &ReorderOptions) -> Result<ReorderOutcome, InkfolioError> {
        let _tmr = timer!(Level::Debug; "Reorderer::run");

        let layout = AssetLayout::new(&options.root, &options.thumb_dir, &options.large_dir);
        let catalog_path = Utils::in_root(&options.root, &options.catalog);
        let mut catalog = Catalog::load(&catalog_path)?;

        let groups = group_by_year(catalog.records());
        let analysis = analyze(catalog.records(), &groups);
        let id_map = sequential_mapping(catalog.records(), &groups)?;

        let index = Self::scan(&layout)?;
        let plan = RenamePlan::build(&index, &id_map, &layout);
        info!(
            "{} of {} ids change, {} files to rename",
            id_map.changed_count(),
            id_map.len(),
            plan.len()
        );

        let mut progress = RenameProgress::default();
        if options.dry_run {
            plan.execute(true, &mut progress)?;
            return Ok(ReorderOutcome {
                analysis,
                id_map,
                plan,
                backup: None,
                verification: None,
            });
        }

        let cleared = clear_missing_paths(layout.root(), catalog.records_mut());
        if !cleared.is_empty() {
            info!("Cleared {} dangling image paths", cleared.len());
        }

        plan.execute(false, &mut progress)?;

        rewrite_records(catalog.records_mut(), &index, &id_map, &progress, &layout);
        catalog.records_mut().sort_by_cached_key(Artwork::id);

        let backup = catalog.backup()?;
        catalog.save_as(catalog.path())?;
        info!("Saved {} artworks with sequential ids", catalog.len());

        let verification = Self::verify(&catalog_path, &layout)?;

        Ok(ReorderOutcome {
            analysis,
            id_map,
            plan,
            backup: Some(backup),
            verification: Some(verification),
        })
    }

    fn scan(layout: &AssetLayout) -> Result<AssetIndex, InkfolioError> {
        AssetIndex::scan(&layout.dir(AssetKind::Thumb), &layout.dir(AssetKind::Large))
    }

    /// Re-reads the catalog and the image directories and checks that every year is
    /// numbered `1..=n` and every record has both assets.
    pub fn verify(catalog_path: &Path, layout: &AssetLayout) -> Result<Verification, InkfolioError> {
        let catalog = Catalog::load(catalog_path)?;
        let index = Self::scan(layout)?;

        let groups = group_by_year(catalog.records());
        let years = analyze(catalog.records(), &groups);

        let mut missing_files = Vec::new();
        for record in catalog.records() {
            let id = record.id();
            if id.is_empty() {
                continue;
            }
            for kind in [AssetKind::Thumb, AssetKind::Large] {
                if index.get(&id).and_then(|e| e.get(kind)).is_none() {
                    missing_files.push(format!("{}{}", id, kind.suffix()));
                }
            }
        }

        Ok(Verification { years, missing_files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    const THUMBS: &str = "images/paintings/thumbnails";
    const LARGE: &str = "images/paintings/large";

    fn records(value: Value) -> Vec<Artwork> {
        serde_json::from_value(value).unwrap()
    }

    fn site(catalog: Value, files: &[(&str, &str, &[u8])]) -> (TempDir, ReorderOptions) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(THUMBS)).unwrap();
        fs::create_dir_all(dir.path().join(LARGE)).unwrap();
        fs::write(
            dir.path().join("artworks.json"),
            serde_json::to_string_pretty(&catalog).unwrap(),
        )
        .unwrap();
        for (rel_dir, name, bytes) in files {
            fs::write(dir.path().join(rel_dir).join(name), bytes).unwrap();
        }
        let options = ReorderOptions {
            root: dir.path().to_owned(),
            catalog: PathBuf::from("artworks.json"),
            thumb_dir: THUMBS.to_string(),
            large_dir: LARGE.to_string(),
            dry_run: false,
        };
        (dir, options)
    }

    #[test]
    fn test_sequence_number() {
        assert_eq!(sequence_number("2020_007", "2020"), Some(7));
        assert_eq!(sequence_number("2020_012_b", "2020"), Some(12));
        assert_eq!(sequence_number("unknown_003", UNKNOWN_YEAR), Some(3));
        assert_eq!(sequence_number("2019_001", "2020"), None);
        assert_eq!(sequence_number("2020_x", "2020"), None);
    }

    #[test]
    fn test_groups_numeric_years_first() {
        let records = records(json!([
            {"id": "a", "year": "2021"},
            {"id": "b"},
            {"id": "c", "year": 2019},
            {"id": "d", "year": "2022.8"},
            {"id": "e", "year": "2021"}
        ]));

        let groups = group_by_year(&records);
        let years: Vec<&str> = groups.iter().map(|g| g.year.as_str()).collect();
        assert_eq!(years, vec!["2019", "2021", "unknown", "2022.8"]);
        assert_eq!(groups[1].members, vec![0, 4]);
    }

    #[test]
    fn test_gap_analysis() {
        let records = records(json!([
            {"id": "2020_001", "year": "2020"},
            {"id": "2020_004", "year": "2020"},
            {"id": "2020_002", "year": "2020"},
            {"id": "legacy", "year": "2020"}
        ]));
        let groups = group_by_year(&records);
        let analysis = analyze(&records, &groups);

        assert_eq!(analysis.len(), 1);
        assert_eq!(analysis[0].count, 4);
        assert_eq!(analysis[0].numbers, vec![1, 2, 4]);
        assert_eq!(analysis[0].gaps, vec!["2020_003".to_string()]);
        assert!(!analysis[0].is_sequential());
    }

    #[test]
    fn test_sequential_mapping_orders_by_title() {
        let records = records(json!([
            {"id": "2020_005", "year": "2020", "title": "秋山"},
            {"id": "2020_002", "year": "2020", "title": "春江"},
            {"id": "x9", "title": "無題"}
        ]));
        let groups = group_by_year(&records);
        let map = sequential_mapping(&records, &groups).unwrap();

        // "春" (U+6625) sorts before "秋" (U+79CB)
        assert_eq!(map.get("2020_002"), Some("2020_001"));
        assert_eq!(map.get("2020_005"), Some("2020_002"));
        assert_eq!(map.get("x9"), Some("unknown_001"));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let records = records(json!([
            {"id": "2020_001", "year": "2020", "title": "a"},
            {"id": "2020_001", "year": "2020", "title": "b"}
        ]));
        let groups = group_by_year(&records);
        assert!(sequential_mapping(&records, &groups).is_err());
    }

    #[test]
    fn test_run_renumbers_files_and_catalog() {
        let (dir, options) = site(
            json!([
                {"id": "2020_003", "year": "2020", "title": "b", "image": "./images/paintings/thumbnails/2020_003_thumb.png"},
                {"id": "2020_001", "year": "2020", "title": "c"},
                {"id": "2020_007", "year": "2020", "title": "a"}
            ]),
            &[
                (THUMBS, "2020_003_thumb.png", b"b"),
                (LARGE, "2020_003_large.png", b"B"),
                (THUMBS, "2020_001_thumb.png", b"c"),
                (LARGE, "2020_001_large.png", b"C"),
                (THUMBS, "2020_007_thumb.png", b"a"),
                (LARGE, "2020_007_large.png", b"A"),
            ],
        );
        let before = fs::read(dir.path().join("artworks.json")).unwrap();

        let outcome = Reorderer::run(&options).unwrap();

        let thumbs = dir.path().join(THUMBS);
        assert_eq!(fs::read(thumbs.join("2020_001_thumb.png")).unwrap(), b"a");
        assert_eq!(fs::read(thumbs.join("2020_002_thumb.png")).unwrap(), b"b");
        assert_eq!(fs::read(thumbs.join("2020_003_thumb.png")).unwrap(), b"c");
        assert!(!thumbs.join("2020_007_thumb.png").exists());

        let saved: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("artworks.json")).unwrap()).unwrap();
        let ids: Vec<&str> = saved.as_array().unwrap().iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["2020_001", "2020_002", "2020_003"]);
        assert_eq!(saved[0]["title"], "a");
        assert_eq!(saved[1]["image"], "./images/paintings/thumbnails/2020_002_thumb.png");
        assert_eq!(saved[1]["imageHigh"], "./images/paintings/large/2020_002_large.png");

        assert_eq!(fs::read(outcome.backup.unwrap()).unwrap(), before);
        let verification = outcome.verification.unwrap();
        assert!(verification.is_clean());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let (dir, mut options) = site(
            json!([{"id": "2020_004", "year": "2020", "title": "a"}]),
            &[(THUMBS, "2020_004_thumb.png", b"a")],
        );
        options.dry_run = true;
        let before = fs::read(dir.path().join("artworks.json")).unwrap();

        let outcome = Reorderer::run(&options).unwrap();

        assert_eq!(outcome.plan.len(), 1);
        assert!(outcome.backup.is_none());
        assert!(dir.path().join(THUMBS).join("2020_004_thumb.png").is_file());
        assert_eq!(fs::read(dir.path().join("artworks.json")).unwrap(), before);
        assert!(!dir.path().join("artworks.json.backup").exists());
    }

    #[test]
    fn test_verification_reports_missing_assets() {
        let (dir, options) = site(
            json!([{"id": "2021_001", "year": "2021", "title": "a"}]),
            &[(THUMBS, "2021_001_thumb.png", b"a")],
        );
        let layout = AssetLayout::new(dir.path(), THUMBS, LARGE);

        let verification = Reorderer::verify(&dir.path().join(&options.catalog), &layout).unwrap();

        assert_eq!(verification.missing_files, vec!["2021_001_large".to_string()]);
        assert!(verification.years[0].is_sequential());
        assert!(!verification.is_clean());
    }
}
