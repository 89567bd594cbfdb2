use std::collections::HashSet;
use std::path::Path;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

use crate::catalog::{Artwork, Catalog};
use crate::error::InkfolioError;
use crate::utils::Utils;

pub const OUTPUT_FILE: &str = "finerworks_size_recommendations.json";

const CM_PER_INCH: f64 = 2.54;
const MIN_SIDE: i64 = 6;
const AREA_TOLERANCE: f64 = 0.4;
const MAX_RECOMMENDATIONS: usize = 3;

#[derive(AsRefStr, Display, Debug, PartialEq, Eq, Copy, Clone, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtworkType {
    General,
    Landscape,
    FlowerBird,
    Calligraphy,
    FigureAnimal,
}

impl ArtworkType {
    const KEYWORDS: [(ArtworkType, &'static [char]); 4] = [
        (ArtworkType::Landscape, &['山', '水', '峽', '瀑', '雲', '海']),
        (ArtworkType::FlowerBird, &['花', '鳥', '梅', '竹', '菊', '蘭']),
        (ArtworkType::Calligraphy, &['書', '字', '經', '詩', '序']),
        (ArtworkType::FigureAnimal, &['人', '母', '熊', '雀', '鳥']),
    ];

    /// First class whose keywords appear in the title.
    pub fn classify(title: &str) -> Self {
        Self::KEYWORDS
            .iter()
            .find(|(_, keywords)| title.contains(*keywords))
            .map(|(kind, _)| *kind)
            .unwrap_or(ArtworkType::General)
    }

    /// Preferred print areas in square inches as `(min, max)` bands.
    pub fn area_bands(&self) -> &'static [(f64, f64)] {
        const SMALL: (f64, f64) = (60.0, 110.0);
        const MEDIUM: (f64, f64) = (111.0, 160.0);
        const LARGE: (f64, f64) = (161.0, 210.0);
        const STATEMENT: (f64, f64) = (211.0, 300.0);

        match self {
            ArtworkType::Landscape => &[MEDIUM, LARGE, STATEMENT],
            ArtworkType::Calligraphy => &[SMALL, MEDIUM],
            _ => &[SMALL, MEDIUM, LARGE],
        }
    }

    /// Min, midpoint and max of every band.
    pub fn target_areas(&self) -> Vec<f64> {
        self.area_bands()
            .iter()
            .flat_map(|&(min, max)| [min, (min + max) / 2.0, max])
            .collect()
    }
}

/// Parses `H x W` in centimetres. `×`, `x` and `X` all separate; spaces are
/// ignored. Zero, negative and non-finite sides are rejected.
pub fn parse_size_cm(size: &str) -> Option<(f64, f64)> {
    let cleaned: String = size
        .chars()
        .filter(|c| *c != ' ')
        .map(|c| if c == '×' || c == 'X' { 'x' } else { c })
        .collect();

    let mut parts = cleaned.split('x');
    let (Some(h), Some(w), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    let height: f64 = h.parse().ok()?;
    let width: f64 = w.parse().ok()?;

    let valid = |v: f64| v.is_finite() && v > 0.0;
    (valid(height) && valid(width)).then_some((height, width))
}

pub fn cm_to_inches(cm: f64) -> f64 {
    cm / CM_PER_INCH
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub width: u32,
    pub height: u32,
    pub area: u32,
    pub ratio_diff: f64,
}

impl Candidate {
    fn dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn near(&self, target: f64) -> bool {
        (self.area as f64 - target).abs() <= target * AREA_TOLERANCE
    }
}

/// 0..=100. Favors a longest side of 12-20", faithful proportions, and
/// penalizes sides under 6".
pub fn recommendation_score(width: u32, height: u32, original_ratio: f64) -> u32 {
    let mut score: i32 = 50;

    let max_dim = width.max(height);
    if (12..=20).contains(&max_dim) {
        score += 30;
    } else if (8..=24).contains(&max_dim) {
        score += 20;
    } else if max_dim > 30 {
        score -= 10;
    }

    let ratio_diff = (width as f64 / height as f64 - original_ratio).abs();
    if ratio_diff < 0.05 {
        score += 20;
    } else if ratio_diff < 0.1 {
        score += 10;
    }

    if width.min(height) < 6 {
        score -= 20;
    }

    score.clamp(0, 100) as u32
}

/// Integer print sizes whose area is close to one of `targets` and whose
/// width/height is as close as possible to `ratio`.
///
/// Each distinct target (ascending) contributes its best-proportioned unused size
/// until three are chosen; any shortfall is filled with the best-proportioned
/// leftovers. The result is ordered by area.
pub fn best_integer_combinations(targets: &[f64], ratio: f64) -> Vec<Candidate> {
    let mut all: Vec<Candidate> = Vec::new();

    for &target in targets {
        let est_h = (target / ratio).sqrt() as i64;
        let est_w = (target * ratio).sqrt() as i64;

        for h in MIN_SIDE.max(est_h - 3)..=est_h + 3 {
            for w in MIN_SIDE.max(est_w - 3)..=est_w + 3 {
                let area = w * h;
                if (area as f64 - target).abs() > target * AREA_TOLERANCE {
                    continue;
                }
                all.push(Candidate {
                    width: w as u32,
                    height: h as u32,
                    area: area as u32,
                    ratio_diff: (w as f64 / h as f64 - ratio).abs(),
                });
            }
        }
    }

    // Stable, so equally good ratios keep their generation order
    all.sort_by(|a, b| a.ratio_diff.total_cmp(&b.ratio_diff));

    let mut distinct_targets = targets.to_vec();
    distinct_targets.sort_by(f64::total_cmp);
    distinct_targets.dedup();

    let mut selected: Vec<Candidate> = Vec::new();
    let mut used: HashSet<(u32, u32)> = HashSet::new();

    for target in distinct_targets {
        if selected.len() >= MAX_RECOMMENDATIONS {
            break;
        }
        if let Some(best) = all.iter().find(|c| c.near(target) && !used.contains(&c.dims())) {
            used.insert(best.dims());
            selected.push(*best);
        }
    }

    for candidate in &all {
        if selected.len() >= MAX_RECOMMENDATIONS {
            break;
        }
        if used.insert(candidate.dims()) {
            selected.push(*candidate);
        }
    }

    selected.sort_by_key(|c| c.area);
    selected
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArtworkInfo {
    pub id: String,
    pub title: String,
    pub title_en: String,
    pub original_size_cm: String,
    pub artwork_type: ArtworkType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecommendedSize {
    pub width_inches: u32,
    pub height_inches: u32,
    pub score: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SizeRecommendation {
    pub artwork_info: ArtworkInfo,
    pub recommended_sizes: Vec<RecommendedSize>,
}

/// Recommendations for one artwork, or `None` when its size does not parse or
/// nothing fits.
pub fn recommend(artwork: &Artwork) -> Option<SizeRecommendation> {
    let title = artwork.str_field("title");
    let Some((height_cm, width_cm)) = parse_size_cm(artwork.size_cm()) else {
        warn!("Cannot parse size '{}' of {}", artwork.size_cm(), artwork.id());
        return None;
    };

    let ratio = cm_to_inches(width_cm) / cm_to_inches(height_cm);
    let artwork_type = ArtworkType::classify(title);
    debug!("{}: {} at ratio {:.3}", artwork.id(), artwork_type, ratio);

    let recommended_sizes: Vec<RecommendedSize> = best_integer_combinations(&artwork_type.target_areas(), ratio)
        .into_iter()
        .map(|c| RecommendedSize {
            width_inches: c.width,
            height_inches: c.height,
            score: recommendation_score(c.width, c.height, ratio),
        })
        .collect();

    if recommended_sizes.is_empty() {
        warn!("No print size fits {}", artwork.id());
        return None;
    }

    Some(SizeRecommendation {
        artwork_info: ArtworkInfo {
            id: artwork.id(),
            title: if title.is_empty() { "Unknown" } else { title }.to_string(),
            title_en: artwork.title_en().to_string(),
            original_size_cm: artwork.size_cm().to_string(),
            artwork_type,
        },
        recommended_sizes,
    })
}

pub struct SizeCalculator;

impl SizeCalculator {
    /// Recommendations for every record with an id, in catalog order.
    pub fn generate(records: &[Artwork]) -> Vec<SizeRecommendation> {
        info!("Analyzing sizes of {} artworks", records.len());
        records
            .iter()
            .filter(|r| {
                let has_id = !r.id().is_empty();
                if !has_id {
                    warn!("Skipping artwork without an id ('{}')", r.title());
                }
                has_id
            })
            .filter_map(recommend)
            .collect()
    }

    /// The output document: artwork id to recommendation, in catalog order. A
    /// repeated id keeps its first position and its last value.
    pub fn to_document(recommendations: &[SizeRecommendation]) -> Result<Map<String, Value>, InkfolioError> {
        let mut doc = Map::new();
        for rec in recommendations {
            doc.insert(rec.artwork_info.id.clone(), serde_json::to_value(rec)?);
        }
        Ok(doc)
    }

    pub fn run(catalog_path: &Path, output: &Path) -> Result<Vec<SizeRecommendation>, InkfolioError> {
        let catalog = Catalog::load(catalog_path)?;
        let recommendations = Self::generate(catalog.records());
        Utils::write_json_pretty(output, &Self::to_document(&recommendations)?)?;
        info!("Saved size recommendations to {}", output.display());
        Ok(recommendations)
    }

    pub fn print_summary(recommendations: &[SizeRecommendation], output: &Path) {
        println!("{:<22} {}", "Artworks sized:", recommendations.len());
        println!("{:<22} {}", "Output:", output.display());
        for rec in recommendations.iter().take(5) {
            println!();
            println!("  {}", rec.artwork_info.title);
            println!("    original: {} cm", rec.artwork_info.original_size_cm);
            for (i, size) in rec.recommended_sizes.iter().enumerate() {
                println!(
                    "    size{}: {}x{}\" (score {})",
                    i + 1,
                    size.width_inches,
                    size.height_inches,
                    size.score
                );
            }
        }
    }
}
