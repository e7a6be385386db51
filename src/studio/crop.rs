use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::{debug, info};

use crate::llm::media::ImageAsset;
use crate::studio::error::StudioError;

/// Share of the spare height kept above a 16:9 crop, so a portrait subject's
/// head stays in frame.
const LANDSCAPE_VERTICAL_BIAS: f64 = 0.3;
const ASPECT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CropAspect {
    Square,
    Portrait,
    Landscape,
}

impl CropAspect {
    pub const ALL: [CropAspect; 3] = [CropAspect::Square, CropAspect::Portrait, CropAspect::Landscape];

    pub fn ratio(self) -> f64 {
        match self {
            CropAspect::Square => 1.0,
            CropAspect::Portrait => 9.0 / 16.0,
            CropAspect::Landscape => 16.0 / 9.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CropAspect::Square => "1:1",
            CropAspect::Portrait => "9:16",
            CropAspect::Landscape => "16:9",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        CropAspect::ALL
            .into_iter()
            .find(|aspect| aspect.label() == value || aspect.label().replace(':', "x") == value)
    }

    pub fn file_name(self) -> String {
        format!("lookbook-{}.png", self.label().replace(':', "x"))
    }
}

impl fmt::Display for CropAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Source rectangle in natural pixel units. Fractional until rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub sx: f64,
    pub sy: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    fn full(natural_width: u32, natural_height: u32) -> Self {
        CropRect {
            sx: 0.0,
            sy: 0.0,
            width: f64::from(natural_width),
            height: f64::from(natural_height),
        }
    }

    /// Whole-pixel `(x, y, width, height)` clamped inside the source.
    pub fn to_pixels(self, natural_width: u32, natural_height: u32) -> (u32, u32, u32, u32) {
        let x = (self.sx.round().max(0.0) as u32).min(natural_width.saturating_sub(1));
        let y = (self.sy.round().max(0.0) as u32).min(natural_height.saturating_sub(1));
        let width = (self.width.round() as u32).clamp(1, (natural_width - x).max(1));
        let height = (self.height.round() as u32).clamp(1, (natural_height - y).max(1));
        (x, y, width, height)
    }
}

pub fn crop_rect(natural_width: u32, natural_height: u32, aspect: CropAspect) -> CropRect {
    if natural_width == 0 || natural_height == 0 {
        return CropRect::full(natural_width, natural_height);
    }

    let width = f64::from(natural_width);
    let height = f64::from(natural_height);
    let source_aspect = width / height;
    let target_aspect = aspect.ratio();

    if (source_aspect - target_aspect).abs() < ASPECT_EPSILON {
        return CropRect::full(natural_width, natural_height);
    }

    if source_aspect > target_aspect {
        let crop_width = height * target_aspect;
        CropRect {
            sx: (width - crop_width) / 2.0,
            sy: 0.0,
            width: crop_width,
            height,
        }
    } else {
        let crop_height = width / target_aspect;
        let spare = height - crop_height;
        let sy = if aspect == CropAspect::Landscape {
            spare * LANDSCAPE_VERTICAL_BIAS
        } else {
            spare / 2.0
        };
        CropRect {
            sx: 0.0,
            sy,
            width,
            height: crop_height,
        }
    }
}

/// Decodes, crops and re-encodes as PNG. Runs synchronously.
pub fn render_crop(bytes: &[u8], aspect: CropAspect) -> Result<(Vec<u8>, CropRect), StudioError> {
    let source = image::load_from_memory(bytes).map_err(|err| StudioError::Decode(err.to_string()))?;
    let rect = crop_rect(source.width(), source.height(), aspect);
    let (x, y, width, height) = rect.to_pixels(source.width(), source.height());
    debug!(
        "Cropping {}x{} source to {}x{} at ({}, {}) for {}",
        source.width(),
        source.height(),
        width,
        height,
        x,
        y,
        aspect
    );

    let cropped = source.crop_imm(x, y, width, height);
    let mut buf = Cursor::new(Vec::new());
    cropped
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|err| StudioError::Export(err.to_string()))?;
    Ok((buf.into_inner(), rect))
}

pub async fn export_image(
    asset: &ImageAsset,
    aspect: CropAspect,
    dir: &Path,
) -> Result<PathBuf, StudioError> {
    let bytes = asset.bytes.clone();
    let (png, _) = tokio::task::spawn_blocking(move || render_crop(&bytes, aspect))
        .await
        .map_err(|err| StudioError::Export(format!("crop task failed: {err}")))??;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| StudioError::Export(format!("{}: {}", dir.display(), err)))?;
    let path = dir.join(aspect.file_name());
    tokio::fs::write(&path, &png)
        .await
        .map_err(|err| StudioError::Export(format!("{}: {}", path.display(), err)))?;
    info!("Exported {} crop to {}", aspect, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::media::tests::png_fixture;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn matching_aspect_keeps_the_full_frame() {
        for (width, height, aspect) in [
            (1080, 1080, CropAspect::Square),
            (1080, 1920, CropAspect::Portrait),
            (1920, 1080, CropAspect::Landscape),
        ] {
            let rect = crop_rect(width, height, aspect);
            assert_eq!(rect, CropRect::full(width, height));
        }
    }

    #[test]
    fn wide_source_to_square_is_centered_horizontally() {
        let rect = crop_rect(1920, 1080, CropAspect::Square);
        assert_close(rect.width, 1080.0);
        assert_close(rect.sx, 420.0);
        assert_close(rect.sy, 0.0);
        assert_close(rect.height, 1080.0);
    }

    #[test]
    fn portrait_source_to_landscape_is_biased_upward() {
        let rect = crop_rect(1080, 1920, CropAspect::Landscape);
        assert_close(rect.height, 607.5);
        assert_close(rect.sy, 393.75);
        assert_close(rect.sx, 0.0);
        assert_close(rect.width, 1080.0);
    }

    #[test]
    fn tall_crop_for_square_target_is_centered_vertically() {
        let rect = crop_rect(1080, 1920, CropAspect::Square);
        assert_close(rect.height, 1080.0);
        assert_close(rect.sy, 420.0);
    }

    #[test]
    fn parses_labels_and_names_files() {
        assert_eq!(CropAspect::parse("16:9"), Some(CropAspect::Landscape));
        assert_eq!(CropAspect::parse("9x16"), Some(CropAspect::Portrait));
        assert_eq!(CropAspect::parse("4:3"), None);
        assert_eq!(CropAspect::Square.file_name(), "lookbook-1x1.png");
        assert_eq!(CropAspect::Landscape.file_name(), "lookbook-16x9.png");
    }

    #[test]
    fn renders_the_computed_rectangle() {
        let (png, rect) = render_crop(&png_fixture(64, 36, 5), CropAspect::Square).unwrap();
        assert_close(rect.width, 36.0);
        let cropped = image::load_from_memory(&png).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (36, 36));
    }

    #[test]
    fn undecodable_source_is_reported() {
        let err = render_crop(b"not an image", CropAspect::Portrait).unwrap_err();
        assert!(matches!(err, StudioError::Decode(_)));
    }

    #[tokio::test]
    async fn export_writes_named_png() {
        let dir = std::env::temp_dir().join(format!(
            "lookbook-export-test-{}",
            std::process::id()
        ));
        let asset = ImageAsset::from_bytes(png_fixture(30, 60, 9), None).unwrap();
        let path = export_image(&asset, CropAspect::Landscape, &dir).await.unwrap();
        assert_eq!(path, dir.join("lookbook-16x9.png"));
        let written = image::open(&path).unwrap();
        assert_eq!(written.width(), 30);
        // 30 / (16/9) = 16.875 rounds to 17 rows.
        assert_eq!(written.height(), 17);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
