//! Pure correction-stage functions (spec §4.8). Each stage takes a
//! validated frame and returns a new one; none mutate calibration state or
//! retain anything past the call, which is what makes the window/level
//! stage's reentrance (and the pipeline's per-stage timing) straightforward
//! to reason about.

use crate::error::{CoreError, CoreResult};
use crate::model::calibration::{DefectCorrectionMethod, DefectEntry, ScatterParams};
use crate::model::frame::Frame;

fn validate_frame(frame: &Frame) -> CoreResult<()> {
    if !frame.is_well_formed() {
        return Err(CoreError::Param(
            "frame failed validation (dimensions/stride/bit-depth)".into(),
        ));
    }
    Ok(())
}

fn validate_calibration_len(frame: &Frame, len: usize) -> CoreResult<()> {
    if len != frame.pixel_count() {
        return Err(CoreError::Calibration(
            "calibration payload dimensions do not match frame".into(),
        ));
    }
    Ok(())
}

fn clamp16(v: f64) -> u16 {
    v.round().clamp(0.0, 65535.0) as u16
}

fn get_pixel(pixels: &[u16], width: u32, height: u32, x: i32, y: i32) -> u16 {
    let cx = x.clamp(0, width as i32 - 1) as u32;
    let cy = y.clamp(0, height as i32 - 1) as u32;
    pixels[(cy * width + cx) as usize]
}

/// Stage 1: subtract the dark-frame calibration pixelwise, clamp to 0.
pub fn offset_correction(frame: &Frame, dark: &[f32]) -> CoreResult<Frame> {
    validate_frame(frame)?;
    validate_calibration_len(frame, dark.len())?;
    let mut out = frame.clone();
    for (p, d) in out.pixels.iter_mut().zip(dark.iter()) {
        *p = clamp16((*p as f64 - *d as f64).max(0.0));
    }
    Ok(out)
}

/// Stage 2: multiply by the gain-map coefficient pixelwise.
pub fn gain_correction(frame: &Frame, gain: &[f32]) -> CoreResult<Frame> {
    validate_frame(frame)?;
    validate_calibration_len(frame, gain.len())?;
    let mut out = frame.clone();
    for (p, g) in out.pixels.iter_mut().zip(gain.iter()) {
        *p = clamp16(*p as f64 * *g as f64);
    }
    Ok(out)
}

/// Stage 3: replace flagged pixels per their correction method. Defect
/// entries outside the frame's bounds are skipped. Replacement values are
/// always sourced from the original (pre-correction) frame so the order of
/// entries in the defect list never matters.
pub fn defect_correction(frame: &Frame, defects: &[DefectEntry]) -> CoreResult<Frame> {
    validate_frame(frame)?;
    let mut out = frame.clone();
    let width = frame.width;
    let height = frame.height;
    for entry in defects {
        if entry.x >= width || entry.y >= height {
            continue;
        }
        let idx = (entry.y * width + entry.x) as usize;
        let x = entry.x as i32;
        let y = entry.y as i32;
        out.pixels[idx] = match entry.method {
            DefectCorrectionMethod::NearestNeighbor => {
                get_pixel(&frame.pixels, width, height, x - 1, y)
            }
            DefectCorrectionMethod::Bilinear => {
                let left = get_pixel(&frame.pixels, width, height, x - 1, y) as f64;
                let right = get_pixel(&frame.pixels, width, height, x + 1, y) as f64;
                let up = get_pixel(&frame.pixels, width, height, x, y - 1) as f64;
                let down = get_pixel(&frame.pixels, width, height, x, y + 1) as f64;
                clamp16((left + right + up + down) / 4.0)
            }
            DefectCorrectionMethod::Median3x3 => {
                let mut neighborhood = [0u16; 8];
                let mut i = 0;
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        neighborhood[i] = get_pixel(&frame.pixels, width, height, x + dx, y + dy);
                        i += 1;
                    }
                }
                neighborhood.sort_unstable();
                (neighborhood[3] as u32 + neighborhood[4] as u32).div_euclid(2) as u16
            }
        };
    }
    Ok(out)
}

/// `kernel = round_to_odd(max(3, (1 - cutoff_frequency) * min(W,H)))`, the
/// formula this implementation settled on for spec §9's open question about
/// the scatter blur kernel.
pub fn scatter_kernel_size(cutoff_frequency: f32, width: u32, height: u32) -> u32 {
    let min_dim = width.min(height) as f64;
    let raw = ((1.0 - cutoff_frequency as f64) * min_dim).max(3.0);
    round_to_odd(raw)
}

fn round_to_odd(x: f64) -> u32 {
    let r = (x.round() as i64).max(1);
    if r % 2 == 0 {
        (r + 1) as u32
    } else {
        r as u32
    }
}

fn box_blur(pixels: &[u16], width: u32, height: u32, kernel: u32) -> Vec<f64> {
    let radius = (kernel / 2) as i32;
    let mut out = vec![0.0f64; pixels.len()];
    let window_area = ((2 * radius + 1) * (2 * radius + 1)) as f64;
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut sum = 0.0;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    sum += get_pixel(pixels, width, height, x + dx, y + dy) as f64;
                }
            }
            out[(y as u32 * width + x as u32) as usize] = sum / window_area;
        }
    }
    out
}

/// Stage 4 (conditional): high-pass filter. Estimates the low-frequency
/// scatter component with a box-blur standing in for the gaussian-
/// equivalent blur of spec §4.8, subtracts `suppression_ratio * background`.
pub fn scatter_correction(frame: &Frame, params: &ScatterParams) -> CoreResult<Frame> {
    validate_frame(frame)?;
    let kernel = scatter_kernel_size(params.cutoff_frequency, frame.width, frame.height);
    let background = box_blur(&frame.pixels, frame.width, frame.height, kernel);
    let mut out = frame.clone();
    for (p, bg) in out.pixels.iter_mut().zip(background.iter()) {
        let corrected = *p as f64 - params.suppression_ratio as f64 * bg;
        *p = clamp16(corrected);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseReductionMethod {
    Gaussian,
    Median,
    Bilateral,
}

fn gaussian_kernel_1d(radius: i32, sigma: f64) -> Vec<f64> {
    let sigma = sigma.max(1e-6);
    let mut weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    for w in weights.iter_mut() {
        *w /= sum;
    }
    weights
}

fn gaussian_blur(pixels: &[u16], width: u32, height: u32, kernel: u32, sigma: f64) -> Vec<u16> {
    let radius = (kernel / 2) as i32;
    let weights = gaussian_kernel_1d(radius, sigma);

    let mut horizontal = vec![0.0f64; pixels.len()];
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut acc = 0.0;
            for (k, dx) in (-radius..=radius).enumerate() {
                acc += get_pixel(pixels, width, height, x + dx, y) as f64 * weights[k];
            }
            horizontal[(y as u32 * width + x as u32) as usize] = acc;
        }
    }

    let mut out = vec![0u16; pixels.len()];
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut acc = 0.0;
            for (k, dy) in (-radius..=radius).enumerate() {
                let yy = (y + dy).clamp(0, height as i32 - 1) as u32;
                acc += horizontal[(yy * width + x as u32) as usize] * weights[k];
            }
            out[(y as u32 * width + x as u32) as usize] = clamp16(acc);
        }
    }
    out
}

fn median_filter(pixels: &[u16], width: u32, height: u32, kernel: u32) -> Vec<u16> {
    let radius = (kernel / 2) as i32;
    let mut out = vec![0u16; pixels.len()];
    let mut window = Vec::with_capacity((kernel * kernel) as usize);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            window.clear();
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    window.push(get_pixel(pixels, width, height, x + dx, y + dy));
                }
            }
            window.sort_unstable();
            out[(y as u32 * width + x as u32) as usize] = window[window.len() / 2];
        }
    }
    out
}

fn bilateral_filter(pixels: &[u16], width: u32, height: u32, kernel: u32, sigma: f64) -> Vec<u16> {
    let radius = (kernel / 2) as i32;
    let sigma = sigma.max(1e-6);
    let mut out = vec![0u16; pixels.len()];
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let center = get_pixel(pixels, width, height, x, y) as f64;
            let mut acc = 0.0;
            let mut weight_sum = 0.0;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let sample = get_pixel(pixels, width, height, x + dx, y + dy) as f64;
                    let spatial = (-((dx * dx + dy * dy) as f64) / (2.0 * sigma * sigma)).exp();
                    let range = (-((sample - center).powi(2)) / (2.0 * sigma * sigma)).exp();
                    let w = spatial * range;
                    acc += sample * w;
                    weight_sum += w;
                }
            }
            let value = if weight_sum > 0.0 { acc / weight_sum } else { center };
            out[(y as u32 * width + x as u32) as usize] = clamp16(value);
        }
    }
    out
}

/// Stage 5 (conditional): one of Gaussian/Median/Bilateral, odd kernel,
/// configured sigma (sigma is unused by `Median`).
pub fn noise_reduction(
    frame: &Frame,
    method: NoiseReductionMethod,
    kernel_size: u32,
    sigma: f64,
) -> CoreResult<Frame> {
    validate_frame(frame)?;
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(CoreError::Param(format!(
            "noise reduction kernel size must be a positive odd integer, got {kernel_size}"
        )));
    }
    let filtered = match method {
        NoiseReductionMethod::Gaussian => {
            gaussian_blur(&frame.pixels, frame.width, frame.height, kernel_size, sigma)
        }
        NoiseReductionMethod::Median => {
            median_filter(&frame.pixels, frame.width, frame.height, kernel_size)
        }
        NoiseReductionMethod::Bilateral => {
            bilateral_filter(&frame.pixels, frame.width, frame.height, kernel_size, sigma)
        }
    };
    let mut out = frame.clone();
    out.pixels = filtered;
    Ok(out)
}

fn morphological_extreme(pixels: &[u16], width: u32, height: u32, kernel: u32, take_min: bool) -> Vec<u16> {
    let radius = (kernel / 2) as i32;
    let mut out = vec![0u16; pixels.len()];
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut extreme = if take_min { u16::MAX } else { 0 };
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let v = get_pixel(pixels, width, height, x + dx, y + dy);
                    extreme = if take_min { extreme.min(v) } else { extreme.max(v) };
                }
            }
            out[(y as u32 * width + x as u32) as usize] = extreme;
        }
    }
    out
}

/// Stage 6 (conditional): morphological-open background estimate (erosion
/// then dilation), divide and renormalise to the 16-bit range, skipping any
/// pixel whose background estimate is zero rather than dividing by it.
pub fn flatten(frame: &Frame, structuring_element: u32) -> CoreResult<Frame> {
    validate_frame(frame)?;
    let eroded = morphological_extreme(&frame.pixels, frame.width, frame.height, structuring_element, true);
    let background = morphological_extreme(&eroded, frame.width, frame.height, structuring_element, false);
    let mean_background: f64 =
        background.iter().map(|v| *v as f64).sum::<f64>() / background.len().max(1) as f64;

    let mut out = frame.clone();
    for (p, bg) in out.pixels.iter_mut().zip(background.iter()) {
        if *bg == 0 {
            continue;
        }
        *p = clamp16((*p as f64 / *bg as f64) * mean_background);
    }
    Ok(out)
}

/// Stage 7: `value <- ((v - (level - w/2)) * (65535/w))`, clamped to the
/// 16-bit range. A pure function of `(frame, window, level)`: calling it
/// twice with the same arguments produces the same output both times,
/// which is what makes it reentrant over upstream stages (spec §4.8).
pub fn window_level(frame: &Frame, window: f64, level: f64) -> CoreResult<Frame> {
    validate_frame(frame)?;
    if window <= 0.0 {
        return Err(CoreError::Param(format!("window must be positive, got {window}")));
    }
    let scale = 65535.0 / window;
    let shift = level - window / 2.0;
    let mut out = frame.clone();
    for p in out.pixels.iter_mut() {
        *p = clamp16((*p as f64 - shift) * scale);
    }
    Ok(out)
}
