//! Sample augmentation.
//!
//! Expands one captured example into many plausible training variants.
//! Image-space augmentation is preferred when the source frame is at hand;
//! feature-space jitter tops the set up when extraction on transformed
//! frames yields too little.

use crate::capture::types::{Frame, HandPoseExtractor};
use crate::core::normalize::{euclidean_distance, FeatureVector};
use image::{imageops, Rgb, RgbImage};
use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Normal;

/// Feature-space jitter parameters.
#[derive(Debug, Clone)]
pub struct JitterParams {
    /// Maximum planar rotation in radians (either direction)
    pub max_rotation: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Standard deviation of per-coordinate Gaussian noise
    pub noise_sigma: f64,
}

impl Default for JitterParams {
    fn default() -> Self {
        Self {
            max_rotation: 0.2,
            min_scale: 0.90,
            max_scale: 1.12,
            noise_sigma: 0.014,
        }
    }
}

/// Image-space jitter parameters.
#[derive(Debug, Clone)]
pub struct ImageJitterParams {
    pub max_rotation_deg: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Maximum translation as a fraction of frame width/height
    pub max_translation: f64,
    /// Maximum brightness offset in 8-bit levels
    pub max_brightness: i32,
    /// Maximum contrast change in percent
    pub max_contrast: f32,
    /// Maximum hue rotation in degrees
    pub max_hue: i32,
    /// Maximum relative saturation change
    pub max_saturation: f64,
    /// Maximum relative value change
    pub max_value: f64,
    pub blur_probability: f64,
    pub noise_probability: f64,
    pub edge_probability: f64,
}

impl Default for ImageJitterParams {
    fn default() -> Self {
        Self {
            max_rotation_deg: 10.0,
            min_scale: 0.93,
            max_scale: 1.08,
            max_translation: 0.04,
            max_brightness: 24,
            max_contrast: 15.0,
            max_hue: 8,
            max_saturation: 0.15,
            max_value: 0.10,
            blur_probability: 0.15,
            noise_probability: 0.15,
            edge_probability: 0.10,
        }
    }
}

/// Distance gates applied to image-derived variants.
#[derive(Debug, Clone)]
pub struct AugmentGates {
    /// Closer than this to the base vector: the transform was a no-op
    pub min_base_distance: f64,
    /// Farther than this from the base vector: extraction went wrong
    pub max_base_distance: f64,
    /// Closer than this to an accepted variant: near-duplicate
    pub min_pair_distance: f64,
}

impl Default for AugmentGates {
    fn default() -> Self {
        Self {
            min_base_distance: 0.035,
            max_base_distance: 1.6,
            min_pair_distance: 0.018,
        }
    }
}

/// Result of an augmentation run.
#[derive(Debug, Clone, Default)]
pub struct AugmentReport {
    /// Accepted vectors; the base vector is always first
    pub vectors: Vec<FeatureVector>,
    pub from_image: usize,
    pub from_jitter: usize,
    pub rejected_similar: usize,
    pub rejected_outlier: usize,
    pub rejected_duplicate: usize,
    pub extraction_failures: usize,
}

/// Attempts per requested variant before a mode is considered stalled.
const ATTEMPTS_PER_VARIANT: usize = 4;

/// Produce `n` feature-space variants of `base`; variant 0 is `base` itself.
pub fn jitter_features<R: Rng + ?Sized>(
    base: &[f64],
    n: usize,
    params: &JitterParams,
    rng: &mut R,
) -> Vec<FeatureVector> {
    if n == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(n);
    out.push(base.to_vec());
    while out.len() < n {
        out.push(jitter_once(base, params, rng));
    }
    out
}

fn jitter_once<R: Rng + ?Sized>(base: &[f64], params: &JitterParams, rng: &mut R) -> FeatureVector {
    let theta = rng.gen_range(-params.max_rotation..=params.max_rotation);
    let scale = rng.gen_range(params.min_scale..=params.max_scale);
    let noise = Normal::new(0.0, params.noise_sigma).ok();
    let (sin, cos) = theta.sin_cos();

    let mut out = Vec::with_capacity(base.len());
    for c in base.chunks(3) {
        let x = c[0];
        let y = c.get(1).copied().unwrap_or(0.0);
        let z = c.get(2).copied().unwrap_or(0.0);
        let moved = [(x * cos - y * sin) * scale, (x * sin + y * cos) * scale, z * scale];
        for v in moved.into_iter().take(c.len()) {
            let jitter = match &noise {
                Some(n) => n.sample(rng),
                None => 0.0,
            };
            out.push(v + jitter);
        }
    }
    out
}

/// Augmentation pipeline with both modes and the fallback rule.
#[derive(Debug, Clone, Default)]
pub struct Augmentor {
    pub feature: JitterParams,
    pub image: ImageJitterParams,
    pub gates: AugmentGates,
}

impl Augmentor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feature-space augmentation only.
    pub fn augment_vector<R: Rng + ?Sized>(
        &self,
        base: &[f64],
        n: usize,
        rng: &mut R,
    ) -> AugmentReport {
        let mut report = AugmentReport {
            vectors: vec![base.to_vec()],
            ..AugmentReport::default()
        };
        self.top_up(base, n, &mut report, rng);
        report
    }

    /// Image-space augmentation, topped up with feature jitter when the
    /// image pass yields fewer than half of the requested variants.
    pub fn augment_from_image<R: Rng + ?Sized>(
        &self,
        base_image: &RgbImage,
        base: &[f64],
        n: usize,
        extractor: &dyn HandPoseExtractor,
        rng: &mut R,
    ) -> AugmentReport {
        let mut report = AugmentReport {
            vectors: vec![base.to_vec()],
            ..AugmentReport::default()
        };
        if n <= 1 {
            report.vectors.truncate(n);
            return report;
        }

        let max_attempts = n * ATTEMPTS_PER_VARIANT;
        for _ in 0..max_attempts {
            if report.vectors.len() >= n {
                break;
            }
            let variant = random_image_variant(base_image, &self.image, rng);
            let Some(keypoints) = extractor.extract(&Frame::from_image(variant)) else {
                report.extraction_failures += 1;
                continue;
            };
            let candidate = keypoints.feature_vector();

            match euclidean_distance(&candidate, base) {
                None => report.rejected_outlier += 1,
                Some(d) if d < self.gates.min_base_distance => report.rejected_similar += 1,
                Some(d) if d > self.gates.max_base_distance => report.rejected_outlier += 1,
                Some(_) if self.is_duplicate(&candidate, &report.vectors) => {
                    report.rejected_duplicate += 1
                }
                Some(_) => {
                    report.vectors.push(candidate);
                    report.from_image += 1;
                }
            }
        }

        if report.vectors.len() * 2 < n {
            tracing::debug!(
                accepted = report.vectors.len(),
                requested = n,
                "Image augmentation fell short, topping up with feature jitter"
            );
            self.top_up(base, n, &mut report, rng);
        }
        report
    }

    fn top_up<R: Rng + ?Sized>(
        &self,
        base: &[f64],
        n: usize,
        report: &mut AugmentReport,
        rng: &mut R,
    ) {
        let max_attempts = n * ATTEMPTS_PER_VARIANT;
        let mut attempts = 0;
        while report.vectors.len() < n && attempts < max_attempts {
            attempts += 1;
            let candidate = jitter_once(base, &self.feature, rng);
            if self.is_duplicate(&candidate, &report.vectors) {
                report.rejected_duplicate += 1;
                continue;
            }
            report.vectors.push(candidate);
            report.from_jitter += 1;
        }
    }

    fn is_duplicate(&self, candidate: &[f64], accepted: &[FeatureVector]) -> bool {
        accepted.iter().any(|v| {
            euclidean_distance(candidate, v)
                .map(|d| d < self.gates.min_pair_distance)
                .unwrap_or(true)
        })
    }
}

/// One random geometric + photometric variant of `image`.
pub fn random_image_variant<R: Rng + ?Sized>(
    image: &RgbImage,
    params: &ImageJitterParams,
    rng: &mut R,
) -> RgbImage {
    let angle = rng
        .gen_range(-params.max_rotation_deg..=params.max_rotation_deg)
        .to_radians();
    let scale = rng.gen_range(params.min_scale..=params.max_scale);
    let tx = rng.gen_range(-params.max_translation..=params.max_translation) * image.width() as f64;
    let ty =
        rng.gen_range(-params.max_translation..=params.max_translation) * image.height() as f64;
    let mut out = warp_affine(image, angle, scale, tx, ty);

    out = imageops::brighten(&out, rng.gen_range(-params.max_brightness..=params.max_brightness));
    out = imageops::contrast(&out, rng.gen_range(-params.max_contrast..=params.max_contrast));
    out = imageops::huerotate(&out, rng.gen_range(-params.max_hue..=params.max_hue));
    adjust_saturation_value(
        &mut out,
        1.0 + rng.gen_range(-params.max_saturation..=params.max_saturation),
        1.0 + rng.gen_range(-params.max_value..=params.max_value),
    );

    if rng.gen_bool(params.blur_probability.clamp(0.0, 1.0)) {
        out = imageops::blur(&out, rng.gen_range(0.6..1.2));
    }
    if rng.gen_bool(params.noise_probability.clamp(0.0, 1.0)) {
        add_pixel_noise(&mut out, 6.0, rng);
    }
    if rng.gen_bool(params.edge_probability.clamp(0.0, 1.0)) {
        out = imageops::unsharpen(&out, 1.0, 4);
    }
    out
}

/// Rotate/scale about the frame center, then translate; bilinear sampling
/// with edge replication.
fn warp_affine(image: &RgbImage, angle: f64, scale: f64, tx: f64, ty: f64) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let cx = (w as f64 - 1.0) / 2.0;
    let cy = (h as f64 - 1.0) / 2.0;
    let (sin, cos) = angle.sin_cos();
    let inv_scale = 1.0 / scale.max(1e-6);

    RgbImage::from_fn(w, h, |x, y| {
        let u = x as f64 - cx - tx;
        let v = y as f64 - cy - ty;
        let sx = (u * cos + v * sin) * inv_scale + cx;
        let sy = (-u * sin + v * cos) * inv_scale + cy;
        sample_bilinear(image, sx, sy)
    })
}

fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (w, h) = image.dimensions();
    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

fn adjust_saturation_value(image: &mut RgbImage, saturation: f64, value: f64) {
    for pixel in image.pixels_mut() {
        let [r, g, b] = pixel.0.map(f64::from);
        let gray = 0.299 * r + 0.587 * g + 0.114 * b;
        pixel.0 = [r, g, b].map(|c| {
            ((gray + (c - gray) * saturation) * value)
                .round()
                .clamp(0.0, 255.0) as u8
        });
    }
}

fn add_pixel_noise<R: Rng + ?Sized>(image: &mut RgbImage, sigma: f64, rng: &mut R) {
    let Ok(noise) = Normal::new(0.0, sigma) else {
        return;
    };
    for pixel in image.pixels_mut() {
        pixel.0 = pixel
            .0
            .map(|c| (c as f64 + noise.sample(rng)).round().clamp(0.0, 255.0) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::tests::sample_hand;
    use crate::core::normalize::KeypointSet;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct NoHand;

    impl HandPoseExtractor for NoHand {
        fn extract(&self, _frame: &Frame) -> Option<KeypointSet> {
            None
        }
    }

    /// Always reports the same hand, so every variant is a no-op.
    struct FrozenHand(KeypointSet);

    impl HandPoseExtractor for FrozenHand {
        fn extract(&self, _frame: &Frame) -> Option<KeypointSet> {
            Some(self.0.clone())
        }
    }

    /// Derives the spread of the hand from mean image brightness, so
    /// photometric jitter moves the extracted pose.
    struct BrightnessHand;

    impl HandPoseExtractor for BrightnessHand {
        fn extract(&self, frame: &Frame) -> Option<KeypointSet> {
            let image = frame.image.as_ref()?;
            let total: u64 = image.pixels().map(|p| p.0[0] as u64).sum();
            let mean = total as f64 / (image.width() * image.height()) as f64;
            Some(sample_hand((0.5, 0.5), 0.5 + mean / 128.0))
        }
    }

    fn gradient_image() -> RgbImage {
        RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]))
    }

    #[test]
    fn test_jitter_keeps_original_first() {
        let base = sample_hand((0.5, 0.5), 1.0).feature_vector();
        let mut rng = StdRng::seed_from_u64(7);
        let variants = jitter_features(&base, 10, &JitterParams::default(), &mut rng);

        assert_eq!(variants.len(), 10);
        assert_eq!(variants[0], base);
        for v in &variants[1..] {
            assert_eq!(v.len(), base.len());
            let d = euclidean_distance(v, &base).unwrap();
            assert!(d > 0.0 && d < 1.0, "distance {d}");
        }
    }

    #[test]
    fn test_jitter_is_seeded() {
        let base = sample_hand((0.5, 0.5), 1.0).feature_vector();
        let a = jitter_features(&base, 5, &JitterParams::default(), &mut StdRng::seed_from_u64(1));
        let b = jitter_features(&base, 5, &JitterParams::default(), &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_image_failure_falls_back_to_jitter() {
        let base = sample_hand((0.5, 0.5), 1.0).feature_vector();
        let mut rng = StdRng::seed_from_u64(3);
        let report =
            Augmentor::new().augment_from_image(&gradient_image(), &base, 12, &NoHand, &mut rng);

        assert_eq!(report.vectors.len(), 12);
        assert_eq!(report.from_image, 0);
        assert_eq!(report.from_jitter, 11);
        assert_eq!(report.extraction_failures, 48);
    }

    #[test]
    fn test_noop_variants_are_rejected_as_similar() {
        let hand = sample_hand((0.5, 0.5), 1.0);
        let base = hand.feature_vector();
        let mut rng = StdRng::seed_from_u64(5);
        let report = Augmentor::new().augment_from_image(
            &gradient_image(),
            &base,
            6,
            &FrozenHand(hand),
            &mut rng,
        );

        assert_eq!(report.from_image, 0);
        assert_eq!(report.rejected_similar, 24);
        assert_eq!(report.vectors.len(), 6);
    }

    #[test]
    fn test_accepted_variants_respect_gates() {
        let base = sample_hand((0.5, 0.5), 1.5).feature_vector();
        let augmentor = Augmentor::new();
        let mut rng = StdRng::seed_from_u64(11);
        let report =
            augmentor.augment_from_image(&gradient_image(), &base, 8, &BrightnessHand, &mut rng);

        assert!(report.vectors.len() <= 8);
        for (i, v) in report.vectors.iter().enumerate().skip(1) {
            for other in &report.vectors[..i] {
                assert!(euclidean_distance(v, other).unwrap() >= augmentor.gates.min_pair_distance);
            }
        }
    }

    #[test]
    fn test_warp_identity() {
        let image = gradient_image();
        assert_eq!(warp_affine(&image, 0.0, 1.0, 0.0, 0.0), image);
    }
}
