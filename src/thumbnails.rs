use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, ImageFormat, ImageReader};
use log::{debug, error, info, warn, Level};
use logging_timer::timer;

use crate::assets::AssetKind;
use crate::catalog::{Artwork, FIELD_IMAGE, FIELD_IMAGE_HIGH};
use crate::error::InkfolioError;
use crate::rename::AssetLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThumbnailOptions {
    /// Longest side of a generated thumbnail, in pixels.
    pub max_size: u32,
    /// Regenerate thumbnails that already exist.
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThumbnailSummary {
    /// Records with an id.
    pub processed: usize,
    /// Thumbnails written (under a dry run: that would be written).
    pub generated: usize,
    pub already_present: usize,
    pub missing_source: usize,
    pub errors: usize,
}

impl ThumbnailSummary {
    pub fn print(&self) {
        println!("{:<22} {}", "Artworks processed:", self.processed);
        println!("{:<22} {}", "Thumbnails generated:", self.generated);
        println!("{:<22} {}", "Already present:", self.already_present);
        println!("{:<22} {}", "No large image:", self.missing_source);
        println!("{:<22} {}", "Errors:", self.errors);
    }
}

/// Size that fits `width x height` inside `max_size` on the longest side.
/// Images already small enough keep their size.
pub fn thumbnail_dimensions(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    if width > height {
        if width > max_size {
            let scaled = (height as u64 * max_size as u64 / width as u64) as u32;
            return (max_size, scaled.max(1));
        }
    } else if height > max_size {
        let scaled = (width as u64 * max_size as u64 / height as u64) as u32;
        return (scaled.max(1), max_size);
    }
    (width, height)
}

pub struct ThumbnailGenerator<'a> {
    layout: &'a AssetLayout,
    options: ThumbnailOptions,
}

impl<'a> ThumbnailGenerator<'a> {
    pub fn new(layout: &'a AssetLayout, options: ThumbnailOptions) -> Self {
        ThumbnailGenerator { layout, options }
    }

    pub fn thumb_path(&self, id: &str) -> PathBuf {
        self.layout.abs_path(AssetKind::Thumb, id, "png")
    }

    /// First existing candidate among `<id>_large.png`, `<id>_large.jpg`, `<id>.png`
    /// and `<id>.jpg` in the large directory.
    pub fn find_large_image(&self, id: &str) -> Option<PathBuf> {
        let dir = self.layout.dir(AssetKind::Large);
        [
            format!("{}_large.png", id),
            format!("{}_large.jpg", id),
            format!("{}.png", id),
            format!("{}.jpg", id),
        ]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
    }

    /// Decodes `source`, converts it to RGB, shrinks it and writes `<id>_thumb.png`.
    pub fn generate_thumbnail(&self, source: &Path, id: &str) -> Result<PathBuf, InkfolioError> {
        let _tmr = timer!(Level::Trace; "ThumbnailGenerator::generate", "{}", id);

        let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;
        let img = DynamicImage::ImageRgb8(img.to_rgb8());

        let (width, height) = thumbnail_dimensions(img.width(), img.height(), self.options.max_size);
        let img = if (width, height) != (img.width(), img.height()) {
            img.resize_exact(width, height, FilterType::Lanczos3)
        } else {
            img
        };

        let thumb_path = self.thumb_path(id);
        if let Some(parent) = thumb_path.parent() {
            fs::create_dir_all(parent)?;
        }
        img.save_with_format(&thumb_path, ImageFormat::Png)?;
        debug!("Wrote {}x{} thumbnail {}", width, height, thumb_path.display());

        Ok(thumb_path)
    }

    /// Generates every missing thumbnail. Failures on single images are logged and
    /// counted; they never stop the run.
    pub fn run(&self, records: &[Artwork]) -> ThumbnailSummary {
        let mut summary = ThumbnailSummary::default();

        for record in records {
            let id = record.id();
            if id.is_empty() {
                continue;
            }
            summary.processed += 1;

            if !self.options.force && self.thumb_path(&id).is_file() {
                debug!("{}: thumbnail already exists", id);
                summary.already_present += 1;
                continue;
            }

            let Some(source) = self.find_large_image(&id) else {
                warn!("{}: no large image found", id);
                summary.missing_source += 1;
                continue;
            };

            if self.options.dry_run {
                info!("{}: would generate thumbnail from {}", id, source.display());
                summary.generated += 1;
                continue;
            }

            match self.generate_thumbnail(&source, &id) {
                Ok(path) => {
                    info!("{}: generated {}", id, path.display());
                    summary.generated += 1;
                }
                Err(e) => {
                    error!("{}: failed to generate thumbnail from {}: {}", id, source.display(), e);
                    summary.errors += 1;
                }
            }
        }

        summary
    }

    /// Points `image` at the thumbnail and `imageHigh` at the large image wherever
    /// those files exist. Returns how many `image` fields were set.
    pub fn update_artwork_paths(&self, records: &mut [Artwork]) -> usize {
        let mut updated = 0;

        for record in records.iter_mut() {
            let id = record.id();
            if id.is_empty() {
                continue;
            }

            if self.thumb_path(&id).is_file() {
                record.set_str_field(FIELD_IMAGE, &self.layout.catalog_path(AssetKind::Thumb, &id, "png"));
                updated += 1;
            }

            if let Some(name) = self
                .find_large_image(&id)
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            {
                record.set_str_field(FIELD_IMAGE_HIGH, &self.large_catalog_path(&name));
            }
        }

        updated
    }

    fn large_catalog_path(&self, file_name: &str) -> String {
        match self.layout.rel_dir(AssetKind::Large) {
            "" => format!("./{}", file_name),
            dir => format!("./{}/{}", dir, file_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    const THUMBS: &str = "images/paintings/thumbnails";
    const LARGE: &str = "images/paintings/large";

    fn options() -> ThumbnailOptions {
        ThumbnailOptions {
            max_size: 800,
            force: false,
            dry_run: false,
        }
    }

    fn setup() -> (TempDir, AssetLayout) {
        let dir = TempDir::new().unwrap();
        let layout = AssetLayout::new(dir.path(), THUMBS, LARGE);
        fs::create_dir_all(layout.dir(AssetKind::Large)).unwrap();
        (dir, layout)
    }

    fn write_image(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_pixel(width, height, Rgb([20, 30, 40]));
        img.save(path).unwrap();
    }

    fn records(value: serde_json::Value) -> Vec<Artwork> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_thumbnail_dimensions() {
        assert_eq!(thumbnail_dimensions(1600, 800, 800), (800, 400));
        assert_eq!(thumbnail_dimensions(1000, 3000, 800), (266, 800));
        assert_eq!(thumbnail_dimensions(300, 200, 800), (300, 200));
        assert_eq!(thumbnail_dimensions(900, 900, 800), (800, 800));
        assert_eq!(thumbnail_dimensions(10000, 5, 800), (800, 1));
    }

    #[test]
    fn test_generates_shrunk_rgb_png() {
        let (_dir, layout) = setup();
        let rgba = RgbaImage::from_pixel(1600, 800, Rgba([20, 30, 40, 128]));
        rgba.save(layout.dir(AssetKind::Large).join("a_large.png")).unwrap();

        let generator = ThumbnailGenerator::new(&layout, options());
        let summary = generator.run(&records(json!([{"id": "a"}])));

        assert_eq!(summary.generated, 1);
        let thumb = image::open(generator.thumb_path("a")).unwrap();
        assert_eq!(thumb.dimensions(), (800, 400));
        assert_eq!(thumb.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_small_images_are_not_enlarged() {
        let (_dir, layout) = setup();
        write_image(&layout.dir(AssetKind::Large).join("b.png"), 300, 200);

        let generator = ThumbnailGenerator::new(&layout, options());
        generator.run(&records(json!([{"id": "b"}])));

        let thumb = image::open(generator.thumb_path("b")).unwrap();
        assert_eq!(thumb.dimensions(), (300, 200));
    }

    #[test]
    fn test_summary_counts() {
        let (_dir, layout) = setup();
        let large = layout.dir(AssetKind::Large);
        write_image(&large.join("ok_large.png"), 40, 20);
        fs::write(large.join("broken_large.png"), b"not an image").unwrap();
        fs::create_dir_all(layout.dir(AssetKind::Thumb)).unwrap();
        write_image(&layout.abs_path(AssetKind::Thumb, "done", "png"), 4, 4);

        let generator = ThumbnailGenerator::new(&layout, options());
        let summary = generator.run(&records(json!([
            {"id": "ok"},
            {"id": "broken"},
            {"id": "done"},
            {"id": "nothing"},
            {"id": ""}
        ])));

        assert_eq!(
            summary,
            ThumbnailSummary {
                processed: 4,
                generated: 1,
                already_present: 1,
                missing_source: 1,
                errors: 1,
            }
        );
    }

    #[test]
    fn test_force_regenerates() {
        let (_dir, layout) = setup();
        write_image(&layout.dir(AssetKind::Large).join("a_large.jpg"), 60, 30);
        fs::create_dir_all(layout.dir(AssetKind::Thumb)).unwrap();
        fs::write(layout.abs_path(AssetKind::Thumb, "a", "png"), b"stale").unwrap();

        let mut opts = options();
        opts.force = true;
        let generator = ThumbnailGenerator::new(&layout, opts);
        let summary = generator.run(&records(json!([{"id": "a"}])));

        assert_eq!(summary.generated, 1);
        assert_eq!(image::open(generator.thumb_path("a")).unwrap().dimensions(), (60, 30));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (_dir, layout) = setup();
        write_image(&layout.dir(AssetKind::Large).join("a_large.png"), 40, 20);

        let mut opts = options();
        opts.dry_run = true;
        let generator = ThumbnailGenerator::new(&layout, opts);
        let summary = generator.run(&records(json!([{"id": "a"}])));

        assert_eq!(summary.generated, 1);
        assert!(!generator.thumb_path("a").exists());
    }

    #[test]
    fn test_update_artwork_paths() {
        let (_dir, layout) = setup();
        let large = layout.dir(AssetKind::Large);
        write_image(&large.join("a.jpg"), 10, 10);
        fs::create_dir_all(layout.dir(AssetKind::Thumb)).unwrap();
        write_image(&layout.abs_path(AssetKind::Thumb, "a", "png"), 4, 4);

        let generator = ThumbnailGenerator::new(&layout, options());
        let mut recs = records(json!([
            {"id": "a", "image": "", "imageHigh": "old.jpg"},
            {"id": "z", "image": "keep.png"}
        ]));
        let updated = generator.update_artwork_paths(&mut recs);

        assert_eq!(updated, 1);
        assert_eq!(recs[0].str_field(FIELD_IMAGE), "./images/paintings/thumbnails/a_thumb.png");
        assert_eq!(recs[0].str_field(FIELD_IMAGE_HIGH), "./images/paintings/large/a.jpg");
        assert_eq!(recs[1].str_field(FIELD_IMAGE), "keep.png");
    }
}
