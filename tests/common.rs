//! Common utilities for parfocal integration tests

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use parfocal::Frame;

/// FWHM of a Gaussian in units of its sigma.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Parameters for one synthetic star
#[derive(Debug, Clone)]
pub struct StarParams {
    pub row: f64,
    pub col: f64,
    pub peak_flux: f64,
}

impl StarParams {
    pub fn new(row: f64, col: f64, peak_flux: f64) -> Self {
        Self {
            row,
            col,
            peak_flux,
        }
    }
}

/// Configuration for synthetic sweep frame generation
#[derive(Debug, Clone)]
pub struct SweepImageConfig {
    pub height: usize,
    pub width: usize,
    pub background: f64,
    pub read_noise_std: f64,
    pub seed: u64,
}

impl Default for SweepImageConfig {
    fn default() -> Self {
        Self {
            height: 128,
            width: 128,
            background: 200.0,
            read_noise_std: 2.0,
            seed: 42,
        }
    }
}

/// A 3x3 grid of bright stars comfortably inside the frame
pub fn star_grid() -> Vec<StarParams> {
    let mut stars = Vec::new();
    for (i, &row) in [24.0, 64.0, 104.0].iter().enumerate() {
        for (j, &col) in [24.0, 64.0, 104.0].iter().enumerate() {
            // Vary brightness so no two stars are identical
            stars.push(StarParams::new(row, col, 3000.0 + 400.0 * (i * 3 + j) as f64));
        }
    }
    stars
}

/// Render one frame: Gaussian stars of the given FWHM over flat background
/// plus seeded Gaussian read noise.
///
/// The per-frame seed is mixed from the base seed and the focus position so
/// every frame of a sweep gets independent but reproducible noise.
pub fn create_star_frame(
    config: &SweepImageConfig,
    stars: &[StarParams],
    fwhm: f64,
    focus_position: f64,
) -> Frame {
    let sigma = fwhm / FWHM_PER_SIGMA;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed ^ focus_position.to_bits());
    let noise = Normal::new(0.0, config.read_noise_std).unwrap();

    let mut pixels = Array2::from_shape_fn((config.height, config.width), |_| {
        config.background + noise.sample(&mut rng)
    });

    for star in stars {
        for i in 0..config.height {
            for j in 0..config.width {
                let dr = (i as f64 - star.row) / sigma;
                let dc = (j as f64 - star.col) / sigma;
                let r2 = dr * dr + dc * dc;
                if r2 < 50.0 {
                    pixels[[i, j]] += star.peak_flux * (-0.5 * r2).exp();
                }
            }
        }
    }

    Frame::new(pixels, focus_position)
}

/// A sweep whose true star FWHM follows a parabola in focus position.
pub fn quadratic_sweep(
    config: &SweepImageConfig,
    positions: &[f64],
    best_focus: f64,
    min_fwhm: f64,
    defocus_rate: f64,
) -> Vec<Frame> {
    let stars = star_grid();
    positions
        .iter()
        .map(|&p| {
            let fwhm = min_fwhm + defocus_rate * (p - best_focus) * (p - best_focus);
            create_star_frame(config, &stars, fwhm, p)
        })
        .collect()
}
