use crate::frame::BgraFrame;

/// Peak signal-to-noise ratio in dB between two frames of equal size,
/// over every byte. Identical frames give a very large finite value.
/// `None` when the sizes differ.
pub fn psnr(a: &BgraFrame, b: &BgraFrame) -> Option<f64> {
    if a.dimensions() != b.dimensions() || a.is_empty() {
        return None;
    }
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let sum: u64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x.abs_diff(y) as u64;
            d * d
        })
        .sum();
    let mse = sum as f64 / a.len() as f64;
    Some(20.0 * (255.0 / (mse.sqrt() + f64::EPSILON)).log10())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_frames_are_maximally_similar() {
        let frame = BgraFrame::filled(8, 8, [9, 9, 9, 255]);
        assert!(psnr(&frame, &frame.clone()).unwrap() > 300.0);
    }

    #[test]
    fn known_error_gives_known_psnr() {
        // every byte off by 255: mse = 255^2 -> 0 dB
        let a = BgraFrame::filled(4, 4, [0; 4]);
        let b = BgraFrame::filled(4, 4, [255; 4]);
        assert!(psnr(&a, &b).unwrap().abs() < 1e-9);

        // every byte off by 1 -> 20 * log10(255) ~ 48.13 dB
        let c = BgraFrame::filled(4, 4, [1; 4]);
        assert!((psnr(&a, &c).unwrap() - 48.1308).abs() < 1e-3);
    }

    #[test]
    fn size_mismatch_has_no_score() {
        let a = BgraFrame::filled(4, 4, [0; 4]);
        let b = BgraFrame::filled(4, 2, [0; 4]);
        assert_eq!(psnr(&a, &b), None);
    }
}
