// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Heuristic repair for damaged carrier images.
//!
//! Runs when parity healing alone cannot produce a parseable payload. The
//! repair works on pixels, not on the embedded bitstream: it normalizes
//! heavily darkened images, detects suspect pixels (transparent holes and
//! statistical outliers against their 3x3 neighborhood), and fills them by
//! iterative diffusion from intact neighbors. Image dimensions are never
//! changed; the embedded payload geometry depends on them.

use rayon::prelude::*;

use crate::carrier::{PixelFormat, PixelGrid};
use crate::error::Result;

/// Result of one repair pass over a carrier image.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// Re-encoded PNG after repair.
    pub image: Vec<u8>,
    /// Whether brightness normalization was applied.
    pub luma_normalized: bool,
    /// Number of pixels rewritten by inpainting.
    pub repaired_pixels: usize,
}

/// Mean luma below this triggers histogram equalization.
const DARK_LUMA_THRESHOLD: f32 = 60.0;

/// Minimum absolute luma deviation treated as corruption.
const MIN_DEVIATION: f32 = 12.0;

/// Upper bound on diffusion passes; each pass grows the filled region by
/// one pixel ring, so this caps the reachable hole radius.
const MAX_DIFFUSION_PASSES: usize = 256;

fn luma(px: &[u8]) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

/// Median luma of the 3x3 neighborhood around `(x, y)`, clamped at the
/// image border.
fn median3x3(lumas: &[f32], width: usize, height: usize, x: usize, y: usize) -> f32 {
    let mut window = [0f32; 9];
    let mut count = 0;
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height {
                window[count] = lumas[ny as usize * width + nx as usize];
                count += 1;
            }
        }
    }
    let window = &mut window[..count];
    window.sort_by(|a, b| a.total_cmp(b));
    window[count / 2]
}

/// Attempt to repair a damaged carrier image in place.
pub fn repair_image(bytes: &[u8]) -> Result<RepairOutcome> {
    let grid = PixelGrid::decode(bytes)?;
    let width = grid.width as usize;
    let height = grid.height as usize;

    // Work in RGBA regardless of source format so transparent holes are
    // visible to the mask.
    let mut pixels: Vec<[u8; 4]> = match grid.format {
        PixelFormat::Rgba8 => grid.samples.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect(),
        PixelFormat::Rgb8 => grid.samples.chunks_exact(3).map(|c| [c[0], c[1], c[2], 255]).collect(),
        PixelFormat::La8 => grid.samples.chunks_exact(2).map(|c| [c[0], c[0], c[0], c[1]]).collect(),
        PixelFormat::L8 => grid.samples.iter().map(|&l| [l, l, l, 255]).collect(),
    };

    let mut lumas: Vec<f32> = pixels.par_iter().map(|px| luma(px)).collect();
    let mean = lumas.iter().sum::<f32>() / lumas.len() as f32;

    let luma_normalized = mean < DARK_LUMA_THRESHOLD;
    if luma_normalized {
        equalize(&mut pixels, &mut lumas);
    }

    let mean = lumas.iter().sum::<f32>() / lumas.len() as f32;
    let variance = lumas.iter().map(|l| (l - mean) * (l - mean)).sum::<f32>() / lumas.len() as f32;
    let deviation_limit = MIN_DEVIATION.max(2.0 * variance.sqrt());

    let mut mask: Vec<bool> = (0..pixels.len())
        .into_par_iter()
        .map(|i| {
            let (x, y) = (i % width, i / width);
            pixels[i][3] == 0 || (lumas[i] - median3x3(&lumas, width, height, x, y)).abs() > deviation_limit
        })
        .collect();

    let repaired_pixels = diffuse(&mut pixels, &mut mask, width, height);

    let format = grid.format;
    let samples: Vec<u8> = match format {
        PixelFormat::Rgba8 => pixels.iter().flatten().copied().collect(),
        PixelFormat::Rgb8 => pixels.iter().flat_map(|px| [px[0], px[1], px[2]]).collect(),
        PixelFormat::La8 => pixels.iter().flat_map(|px| [px[0], px[3]]).collect(),
        PixelFormat::L8 => pixels.iter().map(|px| px[0]).collect(),
    };
    let image = PixelGrid { width: grid.width, height: grid.height, format, samples }.encode_png()?;

    Ok(RepairOutcome { image, luma_normalized, repaired_pixels })
}

/// Histogram equalization on the luma channel; RGB channels are scaled
/// proportionally so hue is preserved.
fn equalize(pixels: &mut [[u8; 4]], lumas: &mut [f32]) {
    let mut histogram = [0usize; 256];
    for &l in lumas.iter() {
        histogram[(l as usize).min(255)] += 1;
    }
    let total = lumas.len();
    let mut cdf = [0f32; 256];
    let mut running = 0usize;
    for (bin, count) in histogram.iter().enumerate() {
        running += count;
        cdf[bin] = running as f32 / total as f32;
    }

    pixels.par_iter_mut().zip(lumas.par_iter_mut()).for_each(|(px, l)| {
        let target = 255.0 * cdf[(*l as usize).min(255)];
        let gain = target / l.max(1.0);
        for channel in &mut px[..3] {
            *channel = ((*channel as f32 * gain).round()).clamp(0.0, 255.0) as u8;
        }
        *l = luma(px);
    });
}

/// Fill masked pixels from unmasked neighbors, one ring per pass. Returns
/// the number of pixels rewritten.
fn diffuse(pixels: &mut [[u8; 4]], mask: &mut [bool], width: usize, height: usize) -> usize {
    let mut repaired = 0;
    for _ in 0..MAX_DIFFUSION_PASSES {
        let mut filled: Vec<(usize, [u8; 4])> = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                if !mask[i] {
                    continue;
                }
                let mut sum = [0u32; 3];
                let mut count = 0u32;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        if nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height {
                            let n = ny as usize * width + nx as usize;
                            if !mask[n] {
                                for c in 0..3 {
                                    sum[c] += pixels[n][c] as u32;
                                }
                                count += 1;
                            }
                        }
                    }
                }
                if count > 0 {
                    filled.push((
                        i,
                        [
                            (sum[0] / count) as u8,
                            (sum[1] / count) as u8,
                            (sum[2] / count) as u8,
                            255,
                        ],
                    ));
                }
            }
        }
        if filled.is_empty() {
            break;
        }
        repaired += filled.len();
        for (i, px) in filled {
            pixels[i] = px;
            mask[i] = false;
        }
    }
    repaired
}
