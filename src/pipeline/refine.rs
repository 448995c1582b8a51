//! Mask refinement steps applied after inference.

use super::contours;
use crate::config::MaskParams;
use crate::frame::Mask;
use image::{imageops, Luma};

/// Background mask from the network's foreground output: 255 where
/// `output < threshold * 255`, else 0. A value equal to the threshold
/// counts as foreground.
pub fn threshold_mask(output: &Mask, threshold: f32) -> Mask {
    let level = (threshold * 255.0) as u8;
    map_pixels(output, |v| if v < level { 255 } else { 0 })
}

/// Continuous background mask: `255 - output`.
pub fn invert(output: &Mask) -> Mask {
    map_pixels(output, |v| 255 - v)
}

/// 255 where the value is above mid-gray.
pub fn binarize(mask: &Mask) -> Mask {
    map_pixels(mask, |v| if v > 128 { 255 } else { 0 })
}

fn map_pixels(mask: &Mask, f: impl Fn(u8) -> u8) -> Mask {
    let (width, height) = mask.dimensions();
    let data = mask.as_raw().iter().map(|&v| f(v)).collect();
    Mask::from_raw(width, height, data).unwrap_or_else(|| Mask::new(width, height))
}

fn force_odd(k: i32) -> u32 {
    let k = k.max(1);
    (if k % 2 == 0 { k + 1 } else { k }) as u32
}

/// Blur kernel for silhouette smoothing.
pub fn smooth_kernel(smooth_contour: f32) -> u32 {
    force_odd((3.0 + 11.0 * smooth_contour) as i32)
}

/// Blur kernel for edge feathering.
pub fn feather_kernel(feather: f32) -> u32 {
    force_odd((40.0 * feather) as i32)
}

/// Reflect-101 border: `dcb|abcd|cba`.
fn reflect101(i: i64, n: i64) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * n - 2;
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// Normalised k x k box filter with reflect-101 borders.
pub fn box_blur(mask: &Mask, k: u32) -> Mask {
    let (width, height) = mask.dimensions();
    if k <= 1 || width == 0 || height == 0 {
        return mask.clone();
    }
    let (w, h) = (width as i64, height as i64);
    let r = (k / 2) as i64;
    let src = mask.as_raw();

    let mut rows = vec![0u32; src.len()];
    for y in 0..h {
        let line = &src[(y * w) as usize..((y + 1) * w) as usize];
        for x in 0..w {
            rows[(y * w + x) as usize] = (x - r..=x + r)
                .map(|xx| line[reflect101(xx, w)] as u32)
                .sum();
        }
    }

    let area = k * k;
    let mut out = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            let sum: u32 = (y - r..=y + r)
                .map(|yy| rows[(reflect101(yy, h) as i64 * w + x) as usize])
                .sum();
            out[(y * w + x) as usize] = ((sum + area / 2) / area) as u8;
        }
    }
    Mask::from_raw(width, height, out).unwrap_or_else(|| mask.clone())
}

/// 3x3 dilation repeated `iterations` times. Pixels outside the image are
/// ignored.
pub fn dilate(mask: &Mask, iterations: u32) -> Mask {
    let (width, height) = mask.dimensions();
    let mut current = mask.clone();
    for _ in 0..iterations {
        let src = &current;
        let next = Mask::from_fn(width, height, |x, y| {
            let mut v = 0u8;
            for yy in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for xx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    v = v.max(src.get_pixel(xx, yy)[0]);
                }
            }
            Luma([v])
        });
        current = next;
    }
    current
}

/// Soft alpha ramp: dilate by `k / 3`, then box blur at `k`.
pub fn feather_mask(mask: &Mask, feather: f32) -> Mask {
    let k = feather_kernel(feather);
    box_blur(&dilate(mask, k / 3), k)
}

/// `current * factor + previous * (1 - factor)`, rounded.
pub fn blend(current: &Mask, previous: &Mask, factor: f32) -> Mask {
    let (width, height) = current.dimensions();
    let data = current
        .as_raw()
        .iter()
        .zip(previous.as_raw())
        .map(|(&c, &p)| (c as f32 * factor + p as f32 * (1.0 - factor)).round().clamp(0.0, 255.0) as u8)
        .collect();
    Mask::from_raw(width, height, data).unwrap_or_else(|| current.clone())
}

/// Effective temporal weight of the current mask. Thresholded masks never
/// weigh the current frame less than the threshold.
pub fn temporal_factor(params: &MaskParams) -> f32 {
    if params.enable_threshold {
        params.temporal_smooth_factor.max(params.threshold)
    } else {
        params.temporal_smooth_factor
    }
}

/// Turn a network-resolution foreground output into a background mask at
/// `target` resolution.
///
/// `previous` holds the last pre-blend mask and is replaced with this
/// call's pre-blend mask.
///
/// With thresholding and `smooth_contour > 0` the resized mask is
/// binarized at 128 before feathering. The temporal blend then only moves
/// the hard edge between frames and leaves no soft values behind; use
/// `feather` for a soft edge.
pub fn refine_mask(
    output: &Mask,
    params: &MaskParams,
    previous: &mut Option<Mask>,
    target: (u32, u32),
) -> Mask {
    let _span = tracing::debug_span!("refine").entered();

    let mut mask = if params.enable_threshold {
        threshold_mask(output, params.threshold)
    } else {
        invert(output)
    };

    if params.enable_threshold {
        if params.contour_filter > 0.0 && params.contour_filter < 1.0 {
            mask = contours::filter_small_regions(&mask, params.contour_filter);
        }
        if params.smooth_contour > 0.0 {
            mask = box_blur(&mask, smooth_kernel(params.smooth_contour));
        }
    }

    let factor = params.temporal_smooth_factor;
    let pre_blend = mask.clone();
    if factor > 0.0 && factor < 1.0 {
        if let Some(prev) = previous.as_ref().filter(|p| p.dimensions() == mask.dimensions()) {
            mask = blend(&mask, prev, temporal_factor(params));
        }
    }
    *previous = Some(pre_blend);

    if mask.dimensions() != target {
        mask = imageops::resize(&mask, target.0, target.1, imageops::FilterType::Triangle);
    }

    if params.enable_threshold {
        if params.smooth_contour > 0.0 {
            mask = binarize(&mask);
        }
        if params.feather > 0.0 {
            mask = feather_mask(&mask, params.feather);
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(w: u32, h: u32, v: u8) -> Mask {
        Mask::from_pixel(w, h, Luma([v]))
    }

    fn plain() -> MaskParams {
        MaskParams {
            enable_threshold: true,
            threshold: 0.5,
            contour_filter: 0.0,
            smooth_contour: 0.0,
            feather: 0.0,
            temporal_smooth_factor: 0.0,
            ..MaskParams::default()
        }
    }

    #[test]
    fn threshold_boundary_is_foreground() {
        // 0.5 * 255 = 127.5 -> 127
        assert!(threshold_mask(&constant(3, 3, 127), 0.5).pixels().all(|p| p[0] == 0));
        assert!(threshold_mask(&constant(3, 3, 126), 0.5).pixels().all(|p| p[0] == 255));
        assert!(threshold_mask(&constant(3, 3, 255), 1.0).pixels().all(|p| p[0] == 0));
        assert!(threshold_mask(&constant(3, 3, 0), 0.0).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn invert_flips_values() {
        let out = invert(&constant(2, 2, 40));
        assert!(out.pixels().all(|p| p[0] == 215));
    }

    #[test]
    fn kernels_are_odd() {
        assert_eq!(smooth_kernel(0.0), 3);
        assert_eq!(smooth_kernel(0.5), 9);
        assert_eq!(smooth_kernel(1.0), 15);
        assert_eq!(feather_kernel(0.1), 5);
        assert_eq!(feather_kernel(0.25), 11);
        assert_eq!(feather_kernel(0.0), 1);
    }

    #[test]
    fn reflect101_mirrors_without_edge_repeat() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-3, 1), 0);
    }

    #[test]
    fn box_blur_spreads_a_spike() {
        let mut mask = constant(5, 5, 0);
        mask.put_pixel(2, 2, Luma([255]));
        let out = box_blur(&mask, 3);
        assert_eq!(out.get_pixel(2, 2)[0], 28);
        assert_eq!(out.get_pixel(1, 1)[0], 28);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert!(box_blur(&constant(4, 4, 200), 9).pixels().all(|p| p[0] == 200));
    }

    #[test]
    fn dilate_grows_by_one_per_iteration() {
        let mut mask = constant(7, 7, 0);
        mask.put_pixel(3, 3, Luma([255]));
        let once = dilate(&mask, 1);
        assert_eq!(once.pixels().filter(|p| p[0] == 255).count(), 9);
        let twice = dilate(&mask, 2);
        assert_eq!(twice.pixels().filter(|p| p[0] == 255).count(), 25);
        assert_eq!(dilate(&mask, 0), mask);
    }

    #[test]
    fn temporal_blend_is_clamped_to_threshold() {
        let params = MaskParams {
            threshold: 0.6,
            temporal_smooth_factor: 0.3,
            ..plain()
        };
        assert_eq!(temporal_factor(&params), 0.6);

        // network output all background, previous mask all foreground
        let mut previous = Some(constant(4, 4, 0));
        let out = refine_mask(&constant(4, 4, 0), &params, &mut previous, (4, 4));
        // 255 * 0.6 + 0 * 0.4 = 153, not 255 * 0.3 = 77
        assert!(out.pixels().all(|p| p[0] == 153));
        // the stored mask is the pre-blend one
        assert!(previous.unwrap().pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn smoothed_contours_come_out_hard() {
        let params = MaskParams {
            threshold: 0.6,
            temporal_smooth_factor: 0.3,
            smooth_contour: 0.5,
            ..plain()
        };
        let mut previous = Some(constant(4, 4, 0));
        let out = refine_mask(&constant(4, 4, 0), &params, &mut previous, (8, 8));
        // the 153 blend is snapped to background
        assert!(out.pixels().all(|p| p[0] == 255));

        let mut previous = Some(constant(4, 4, 0));
        let params = MaskParams {
            threshold: 0.4,
            ..params
        };
        // 255 * 0.4 = 102 is snapped to foreground
        let out = refine_mask(&constant(4, 4, 0), &params, &mut previous, (8, 8));
        assert!(out.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn blend_skips_mismatched_previous() {
        let params = MaskParams {
            temporal_smooth_factor: 0.5,
            ..plain()
        };
        let mut previous = Some(constant(2, 2, 0));
        let out = refine_mask(&constant(4, 4, 0), &params, &mut previous, (4, 4));
        assert!(out.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn result_is_scaled_to_target() {
        let mut previous = None;
        let out = refine_mask(&constant(8, 4, 255), &plain(), &mut previous, (32, 16));
        assert_eq!(out.dimensions(), (32, 16));
        assert!(out.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn feather_softens_edges() {
        let params = MaskParams {
            feather: 0.25,
            ..plain()
        };
        let mut output = constant(32, 32, 255);
        for y in 0..32 {
            for x in 0..16 {
                output.put_pixel(x, y, Luma([0]));
            }
        }
        let mut previous = None;
        let out = refine_mask(&output, &params, &mut previous, (32, 32));
        let row: Vec<u8> = (0..32).map(|x| out.get_pixel(x, 16)[0]).collect();
        assert_eq!(row[0], 255);
        assert_eq!(row[31], 0);
        assert!(row.iter().any(|&v| v > 0 && v < 255));
        assert!(row.windows(2).all(|w| w[0] >= w[1]));
    }
}
