//! Per-frame feature extraction: pixels in, one sharpness sample out.
//!
//! The pipeline is background estimation, threshold segmentation, per-source
//! moment measurement, a filter chain over the measurements, and a robust
//! reduction of the surviving widths to a single median FWHM with an
//! uncertainty. One [`FocusSample`] per usable frame.

use log::{debug, warn};
use ndarray::{s, Array2, ArrayView2};

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::image_proc::{estimate_background, label_above_threshold, measure_component};
use crate::stats::{median_standard_error, sigma_clipped_stats};

/// One exposure of the focus sweep.
///
/// Pixels are row-major intensities in detector units; `focus_position` is
/// the mechanical focus setting the exposure was taken at, in whatever units
/// the instrument reports (the crate only requires consistency across the
/// sweep). Metadata fields are carried through for reporting and are not
/// interpreted.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel intensities, indexed `[row, col]`.
    pub pixels: Array2<f64>,
    /// Focus setting for this exposure.
    pub focus_position: f64,
    /// Exposure time in seconds, if known.
    pub exposure_s: Option<f64>,
    /// Filter name, if known.
    pub filter: Option<String>,
    /// Observation timestamp, free-form.
    pub timestamp: Option<String>,
}

impl Frame {
    /// Frame with pixels and focus position only.
    pub fn new(pixels: Array2<f64>, focus_position: f64) -> Self {
        Self {
            pixels,
            focus_position,
            exposure_s: None,
            filter: None,
            timestamp: None,
        }
    }
}

/// Rectangular region of interest in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    /// First row of the region.
    pub row: usize,
    /// First column of the region.
    pub col: usize,
    /// Region height in rows.
    pub height: usize,
    /// Region width in columns.
    pub width: usize,
}

impl Roi {
    /// Region covering an entire frame of the given shape.
    pub fn full(shape: (usize, usize)) -> Self {
        Self {
            row: 0,
            col: 0,
            height: shape.0,
            width: shape.1,
        }
    }

    /// This region clamped to the given frame shape.
    ///
    /// An origin outside the frame clamps to an empty region at the frame
    /// edge rather than panicking on slice.
    pub fn clamped(&self, shape: (usize, usize)) -> Roi {
        let row = self.row.min(shape.0);
        let col = self.col.min(shape.1);
        Roi {
            row,
            col,
            height: self.height.min(shape.0 - row),
            width: self.width.min(shape.1 - col),
        }
    }

    fn view<'a>(&self, pixels: &'a Array2<f64>) -> ArrayView2<'a, f64> {
        pixels.slice(s![
            self.row..self.row + self.height,
            self.col..self.col + self.width
        ])
    }
}

/// One detected and measured point source.
///
/// Built and consumed inside [`extract`]; exposed for callers that want the
/// per-source detail (diagnostics, overlays) via [`extract_sources`].
#[derive(Debug, Clone)]
pub struct SourceMeasurement {
    /// Sub-pixel centroid x (column) in frame coordinates.
    pub x: f64,
    /// Sub-pixel centroid y (row) in frame coordinates.
    pub y: f64,
    /// Full width at half maximum, in pixels.
    pub fwhm: f64,
    /// Peak pixel value.
    pub peak: f64,
    /// Background-subtracted flux.
    pub flux: f64,
    /// Major/minor axis ratio from second moments.
    pub aspect_ratio: f64,
    /// Component area in pixels.
    pub area: usize,
    /// Any member pixel at or above the saturation value.
    pub saturated: bool,
    /// Bounding box within the edge margin of the region border.
    pub near_edge: bool,
}

impl SourceMeasurement {
    /// Whether the measurement is usable for the sharpness statistic.
    pub fn is_valid(&self, max_aspect_ratio: f64) -> bool {
        !self.saturated
            && !self.near_edge
            && self.fwhm.is_finite()
            && self.fwhm > 0.0
            && self.aspect_ratio <= max_aspect_ratio
    }
}

/// Sharpness statistic for one frame of the sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusSample {
    /// Focus setting the frame was taken at.
    pub focus_position: f64,
    /// Median FWHM of the valid sources, in pixels.
    pub sharpness: f64,
    /// Standard error of the median, in pixels.
    pub uncertainty: f64,
    /// Number of sources contributing to the statistic.
    pub source_count: usize,
}

/// Detect and measure all sources in the region, unfiltered.
///
/// Returns every measurable component with its rejection flags populated;
/// the caller applies the validity filter. [`extract`] is the usual entry
/// point, which also reduces the widths to a [`FocusSample`].
pub fn extract_sources(
    frame: &Frame,
    roi: Roi,
    config: &ExtractionConfig,
) -> Result<Vec<SourceMeasurement>, ExtractError> {
    let roi = roi.clamped(frame.pixels.dim());
    if roi.height == 0 || roi.width == 0 {
        let (height, width) = frame.pixels.dim();
        return Err(ExtractError::EmptyRegion { height, width });
    }
    let region = roi.view(&frame.pixels);

    let background = estimate_background(
        &region,
        config.background_clip_sigma,
        config.background_clip_iterations,
    )?;
    let threshold = background.threshold(config.detection_threshold_sigma);
    debug!(
        "background level {:.2}, noise {:.3}, threshold {:.2}",
        background.level, background.noise_sigma, threshold
    );

    let (labels, blobs) = label_above_threshold(&region, threshold, config.min_source_area);
    debug!("{} components above threshold", blobs.len());

    let mut sources = Vec::with_capacity(blobs.len());
    for blob in &blobs {
        let measured = match measure_component(
            &region,
            &labels.view(),
            blob,
            background.level,
            config.saturation_value,
        ) {
            Ok(m) => m,
            Err(err) => {
                debug!("component at ({}, {}) unmeasurable: {err}", blob.min_row, blob.min_col);
                continue;
            }
        };

        sources.push(SourceMeasurement {
            x: measured.centroid.1 + roi.col as f64,
            y: measured.centroid.0 + roi.row as f64,
            fwhm: measured.fwhm,
            peak: blob.peak,
            flux: measured.flux,
            aspect_ratio: measured.aspect_ratio,
            area: blob.area,
            saturated: measured.n_saturated > 0,
            near_edge: blob.touches_border(region.dim(), config.edge_margin),
        });
    }

    Ok(sources)
}

/// Extract the per-frame sharpness statistic.
///
/// Runs detection and measurement over the region, filters out saturated,
/// edge-truncated, elongated, and degenerate sources, sigma-clips the
/// surviving widths once, and reduces them to the median FWHM with the
/// standard error of the median as its uncertainty.
///
/// # Errors
///
/// [`ExtractError::InsufficientSources`] when fewer than
/// `min_sources_per_image` sources survive the filters; the frame should be
/// excluded from the sweep, not the sweep aborted.
pub fn extract(
    frame: &Frame,
    roi: Roi,
    config: &ExtractionConfig,
) -> Result<FocusSample, ExtractError> {
    let sources = extract_sources(frame, roi, config)?;
    let detected = sources.len();

    let widths: Vec<f64> = sources
        .iter()
        .filter(|s| s.is_valid(config.max_aspect_ratio))
        .map(|s| s.fwhm)
        .collect();

    if widths.len() < detected {
        debug!(
            "focus {}: rejected {} of {} sources (saturated/edge/shape)",
            frame.focus_position,
            detected - widths.len(),
            detected
        );
    }

    if widths.len() < config.min_sources_per_image {
        warn!(
            "focus {}: {} valid sources, need {}",
            frame.focus_position,
            widths.len(),
            config.min_sources_per_image
        );
        return Err(ExtractError::InsufficientSources {
            found: widths.len(),
            needed: config.min_sources_per_image,
        });
    }

    // One clipping pass over the widths, then the median of what remains.
    // The clip can drop outlier widths, so the minimum-count requirement is
    // enforced on what actually feeds the statistic.
    let stats = sigma_clipped_stats(&widths, config.width_clip_sigma, 1)?;
    if stats.n_used < config.min_sources_per_image {
        warn!(
            "focus {}: {} widths left after clipping, need {}",
            frame.focus_position, stats.n_used, config.min_sources_per_image
        );
        return Err(ExtractError::InsufficientSources {
            found: stats.n_used,
            needed: config.min_sources_per_image,
        });
    }

    Ok(FocusSample {
        focus_position: frame.focus_position,
        sharpness: stats.median,
        uncertainty: median_standard_error(stats.sigma, stats.n_used),
        source_count: stats.n_used,
    })
}
