#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::{
    error::EngineError,
    render::PixelBuffer,
    types::{Dimension, DimensionScore, Finding, FindingKind},
};

/// Color used for mismatched pixels in the overlay.
const HIGHLIGHT: [u8; 4] = [255, 0, 0, 255];

/// Names of the 3×3 regions findings are reported in, row-major.
const REGIONS: [&str; 9] = [
    "top left",
    "top",
    "top right",
    "left",
    "center",
    "right",
    "bottom left",
    "bottom",
    "bottom right",
];

/// Output of [`compare_visual`].
#[derive(Debug, Clone)]
pub struct VisualComparison {
    /// The visual dimension score.
    pub score:    DimensionScore,
    /// Mismatched pixels highlighted over a faded copy of the expected
    /// screenshot; `None` when nothing differs.
    pub overlay:  Option<PixelBuffer>,
    /// Number of pixels counted as different.
    pub mismatch: u64,
}

/// Largest per-channel difference between two RGBA pixels.
fn channel_delta(a: [u8; 4], b: [u8; 4]) -> u8 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}

/// Whether `color` appears within tolerance anywhere in the 3×3 neighborhood
/// of `(x, y)` in `image`.
fn has_neighbor_match(image: &PixelBuffer, x: u32, y: u32, color: [u8; 4], tolerance: u8) -> bool {
    let (width, height) = image.dimensions();
    for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
            if channel_delta(image.pixel(nx, ny), color) <= tolerance {
                return true;
            }
        }
    }
    false
}

/// Whether the pixel at `(x, y)` counts as different. A difference that
/// each side can explain with a neighboring pixel of the other is treated as
/// anti-aliasing. Both checks are required, which keeps the predicate
/// symmetric in its arguments.
fn is_mismatch(a: &PixelBuffer, b: &PixelBuffer, x: u32, y: u32, tolerance: u8) -> bool {
    let (pa, pb) = (a.pixel(x, y), b.pixel(x, y));
    if channel_delta(pa, pb) <= tolerance {
        return false;
    }
    !(has_neighbor_match(b, x, y, pa, tolerance) && has_neighbor_match(a, x, y, pb, tolerance))
}

/// A mismatched pixel's overlay color, or a faded grey of the expected pixel.
fn overlay_pixel(expected: [u8; 4], mismatched: bool) -> [u8; 4] {
    if mismatched {
        return HIGHLIGHT;
    }
    let luma = (u16::from(expected[0]) * 3 + u16::from(expected[1]) * 6 + u16::from(expected[2]))
        / 10;
    let faded = 192 + (luma / 4) as u8;
    [faded, faded, faded, 255]
}

/// Pixel-level similarity of two screenshots.
///
/// Score is `100 × (1 − mismatched / total)`. Fails with
/// [`EngineError::DimensionMismatch`] when the buffers differ in size.
pub fn compare_visual(
    candidate: &PixelBuffer,
    expected: &PixelBuffer,
    tolerance: u8,
) -> Result<VisualComparison, EngineError> {
    if candidate.dimensions() != expected.dimensions() {
        return Err(EngineError::DimensionMismatch {
            candidate: candidate.dimensions(),
            expected:  expected.dimensions(),
        });
    }

    let (width, height) = expected.dimensions();
    let total = expected.pixel_count();
    if total == 0 {
        return Ok(VisualComparison {
            score:    DimensionScore::new(Dimension::Visual, 100.0, Vec::new()),
            overlay:  None,
            mismatch: 0,
        });
    }

    let mut overlay = Vec::with_capacity(total as usize * 4);
    let mut mismatch = 0u64;
    let mut regions = [0u64; 9];
    let mut region_totals = [0u64; 9];

    for y in 0..height {
        let row = ((y * 3) / height) as usize;
        for x in 0..width {
            let region = row * 3 + ((x * 3) / width) as usize;
            region_totals[region] += 1;

            let differs = is_mismatch(candidate, expected, x, y, tolerance);
            if differs {
                mismatch += 1;
                regions[region] += 1;
            }
            overlay.extend_from_slice(&overlay_pixel(expected.pixel(x, y), differs));
        }
    }

    let score = 100.0 * (1.0 - mismatch as f64 / total as f64);
    let mut details = vec![Finding::note(format!(
        "{mismatch} of {total} pixels differ ({:.2}%)",
        100.0 * mismatch as f64 / total as f64
    ))];

    for (idx, count) in regions.iter().enumerate().filter(|(_, c)| **c > 0) {
        let share = 100.0 * *count as f64 / region_totals[idx].max(1) as f64;
        details.push(
            Finding::builder()
                .kind(FindingKind::Mismatch)
                .message(format!(
                    "The {} of the page looks different ({share:.1}% of that area)",
                    REGIONS[idx]
                ))
                .path(REGIONS[idx])
                .impact(100.0 * *count as f64 / total as f64)
                .build(),
        );
    }

    let overlay = if mismatch > 0 { PixelBuffer::new(width, height, overlay) } else { None };

    Ok(VisualComparison {
        score: DimensionScore::new(Dimension::Visual, score.max(0.0), details),
        overlay,
        mismatch,
    })
}
