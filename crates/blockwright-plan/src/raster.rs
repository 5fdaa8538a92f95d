//! Raster image → placement plan.
//!
//! The image is resampled with a nearest-neighbour filter so pixel edges stay
//! sharp, then walked row-major (top row first, left to right). Each pixel
//! becomes one op: transparent pixels are empty, everything else maps to the
//! closest palette colour.

use image::imageops::FilterType;
use image::GenericImageView;

use blockwright_types::{CompileOptions, Dimensions, ImageLayout, PlacementOp, PlacementPlan};

use crate::error::PlanError;
use crate::palette;

/// Raster compilation limits and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterSettings {
    /// Width used when the request does not give one.
    pub default_width: u32,
    /// Largest allowed width or height.
    pub max_dimension: u32,
    /// Pixels with alpha below this are empty.
    pub alpha_threshold: u8,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            default_width: 64,
            max_dimension: 256,
            alpha_threshold: 128,
        }
    }
}

/// Height that keeps the source aspect ratio at `target_width`, rounded to
/// the nearest voxel and never below one.
pub fn derived_height(source_width: u32, source_height: u32, target_width: u32) -> u32 {
    let w = u64::from(source_width);
    let numerator = u64::from(target_width)
        .saturating_mul(u64::from(source_height))
        .saturating_mul(2)
        .saturating_add(w);
    let denominator = w.saturating_mul(2);
    numerator
        .checked_div(denominator)
        .and_then(|h| u32::try_from(h).ok())
        .unwrap_or(1)
        .max(1)
}

/// Compile an encoded image into a plan.
pub fn compile_image(
    bytes: &[u8],
    options: &CompileOptions,
    settings: &RasterSettings,
) -> Result<PlacementPlan, PlanError> {
    let source = image::load_from_memory(bytes)?;
    let (source_width, source_height) = source.dimensions();
    if source_width == 0 || source_height == 0 {
        return Err(PlanError::EmptyImage);
    }

    let width = options.width.unwrap_or(settings.default_width);
    let height = options
        .height
        .unwrap_or_else(|| derived_height(source_width, source_height, width));
    let in_range = |n: u32| (1..=settings.max_dimension).contains(&n);
    if !in_range(width) || !in_range(height) {
        return Err(PlanError::InvalidDimensions {
            width,
            height,
            max: settings.max_dimension,
        });
    }

    let resized = source
        .resize_exact(width, height, FilterType::Nearest)
        .to_rgba8();

    let capacity = usize::try_from(u64::from(width).saturating_mul(u64::from(height)))
        .unwrap_or_default();
    let mut ops = Vec::with_capacity(capacity);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let (col, row) = match (i32::try_from(x), i32::try_from(y)) {
            (Ok(col), Ok(row)) => (col, row),
            _ => {
                return Err(PlanError::InvalidDimensions {
                    width,
                    height,
                    max: settings.max_dimension,
                });
            }
        };
        let offset = options.layout.offset(col, row);
        if a < settings.alpha_threshold {
            ops.push(PlacementOp::empty(offset));
        } else {
            ops.push(PlacementOp::place(
                offset,
                palette::nearest(options.palette, [r, g, b]),
            ));
        }
    }

    let dimensions = match options.layout {
        ImageLayout::Wall => Dimensions::new(width, height, 1),
        ImageLayout::Floor => Dimensions::new(width, 1, height),
    };
    tracing::debug!(
        source_width,
        source_height,
        width,
        height,
        palette = %options.palette,
        "Compiled raster plan"
    );
    Ok(PlacementPlan::new(ops, dimensions))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use blockwright_types::{BlockPos, PaletteSelection};
    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn png(img: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn height_follows_aspect_ratio() {
        assert_eq!(derived_height(200, 100, 64), 32);
        assert_eq!(derived_height(3, 2, 10), 7);
        assert_eq!(derived_height(1000, 1, 4), 1);
    }

    #[test]
    fn transparent_pixels_become_empty_ops() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0xA1, 0x27, 0x22, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 0]));
        let options = CompileOptions {
            width: Some(2),
            height: Some(2),
            ..CompileOptions::default()
        };
        let plan = compile_image(&png(&img), &options, &RasterSettings::default()).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.total_count(), 3);
        assert!(plan.get(1).unwrap().is_empty());
        assert_eq!(
            plan.get(0).unwrap().material.as_ref().map(|m| m.as_str()),
            Some("red_wool")
        );
    }

    #[test]
    fn ops_are_row_major() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([255, 255, 255, 255]));
        let options = CompileOptions {
            width: Some(3),
            height: Some(2),
            ..CompileOptions::default()
        };
        let plan = compile_image(&png(&img), &options, &RasterSettings::default()).unwrap();
        let positions: Vec<BlockPos> = plan.ops().iter().map(|op| op.position).collect();
        assert_eq!(
            positions,
            vec![
                BlockPos::new(0, 0, 0),
                BlockPos::new(1, 0, 0),
                BlockPos::new(2, 0, 0),
                BlockPos::new(0, 1, 0),
                BlockPos::new(1, 1, 0),
                BlockPos::new(2, 1, 0),
            ]
        );
        assert_eq!(plan.dimensions(), Dimensions::new(3, 2, 1));
    }

    #[test]
    fn floor_layout_lies_flat() {
        let img = RgbaImage::from_pixel(2, 3, Rgba([255, 255, 255, 255]));
        let options = CompileOptions {
            palette: PaletteSelection::Concrete,
            width: Some(2),
            height: Some(3),
            layout: ImageLayout::Floor,
        };
        let plan = compile_image(&png(&img), &options, &RasterSettings::default()).unwrap();
        assert_eq!(plan.dimensions(), Dimensions::new(2, 1, 3));
        assert!(plan.ops().iter().all(|op| op.position.y == 0));
        assert_eq!(plan.get(5).map(|op| op.position), Some(BlockPos::new(1, 0, 2)));
    }

    #[test]
    fn oversized_request_is_rejected() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let options = CompileOptions {
            width: Some(1000),
            ..CompileOptions::default()
        };
        let err = compile_image(&png(&img), &options, &RasterSettings::default()).unwrap_err();
        assert!(matches!(err, PlanError::InvalidDimensions { width: 1000, .. }));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = compile_image(
            b"definitely not a png",
            &CompileOptions::default(),
            &RasterSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::Image(_)));
    }
}
