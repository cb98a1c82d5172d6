//! Batch pipeline: a sweep of frames in, one classified answer out.
//!
//! Extraction is independent per frame and runs in parallel across the
//! sweep; a frame that yields no usable sharpness sample is recorded and
//! skipped, not fatal. The solver then runs once over everything that
//! survived.

use log::warn;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::config::FocusConfig;
use crate::error::{ExtractError, SolveError};
use crate::extract::{extract, FocusSample, Frame, Roi};
use crate::solve::{solve, SolveOutcome};

/// Per-frame result of the extraction stage.
#[derive(Debug)]
pub enum FrameOutcome {
    /// The frame contributed a sharpness sample.
    Used(FocusSample),
    /// The frame was excluded from the fit.
    Skipped {
        /// Focus setting of the excluded frame.
        focus_position: f64,
        /// Why extraction failed.
        reason: ExtractError,
    },
}

impl FrameOutcome {
    /// The sample, if the frame was used.
    pub fn sample(&self) -> Option<&FocusSample> {
        match self {
            FrameOutcome::Used(sample) => Some(sample),
            FrameOutcome::Skipped { .. } => None,
        }
    }
}

/// Complete result of a focus run, for the reporting layer.
#[derive(Debug)]
pub struct FocusRun {
    /// Terminal solver outcome.
    pub outcome: SolveOutcome,
    /// Per-frame usability record, in input order.
    pub frames: Vec<FrameOutcome>,
}

/// Run extraction over every frame of the sweep.
///
/// Frames are processed in parallel; `config.worker_count` bounds the
/// parallelism with a dedicated pool, otherwise the global pool is used.
/// The ROI applies to every frame; `None` means full frame. Output order
/// matches input order regardless of scheduling.
pub fn collect_samples(
    frames: &[Frame],
    roi: Option<Roi>,
    config: &FocusConfig,
) -> Vec<FrameOutcome> {
    let run = || {
        frames
            .par_iter()
            .map(|frame| {
                let roi = roi.unwrap_or_else(|| Roi::full(frame.pixels.dim()));
                match extract(frame, roi, &config.extraction) {
                    Ok(sample) => FrameOutcome::Used(sample),
                    Err(reason) => {
                        warn!(
                            "skipping frame at focus {}: {reason}",
                            frame.focus_position
                        );
                        FrameOutcome::Skipped {
                            focus_position: frame.focus_position,
                            reason,
                        }
                    }
                }
            })
            .collect()
    };

    match config.worker_count {
        Some(n) => match ThreadPoolBuilder::new().num_threads(n).build() {
            Ok(pool) => pool.install(run),
            Err(err) => {
                warn!("falling back to global thread pool: {err}");
                run()
            }
        },
        None => run(),
    }
}

/// Extract every frame, then solve the focus curve once.
///
/// The Rust entry point for a whole sweep: per-frame failures are recorded
/// in the returned [`FocusRun`] and excluded; only an unsolvable sample set
/// (too few usable frames) is an error.
pub fn find_best_focus(
    frames: &[Frame],
    roi: Option<Roi>,
    config: &FocusConfig,
) -> Result<FocusRun, SolveError> {
    let outcomes = collect_samples(frames, roi, config);
    let samples: Vec<FocusSample> = outcomes
        .iter()
        .filter_map(|o| o.sample().copied())
        .collect();

    let skipped = outcomes.len() - samples.len();
    if skipped > 0 {
        warn!("{skipped} of {} frames excluded from the fit", outcomes.len());
    }

    let outcome = solve(&samples, &config.solver)?;
    Ok(FocusRun {
        outcome,
        frames: outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    /// Noise-free star field with the given per-star Gaussian sigma.
    fn sweep_frame(focus: f64, sigma: f64) -> Frame {
        let shape = (96, 96);
        let stars = [
            (20.0, 20.0, 800.0),
            (20.0, 70.0, 900.0),
            (48.0, 48.0, 1000.0),
            (70.0, 25.0, 850.0),
            (75.0, 70.0, 950.0),
        ];
        let mut pixels = Array2::from_shape_fn(shape, |(i, j)| {
            100.0 + 0.5 * (((i * 7 + j * 13) % 5) as f64 - 2.0)
        });
        for &(row, col, amplitude) in &stars {
            for i in 0..shape.0 {
                for j in 0..shape.1 {
                    let dr = (i as f64 - row) / sigma;
                    let dc = (j as f64 - col) / sigma;
                    pixels[[i, j]] += amplitude * (-0.5 * (dr * dr + dc * dc)).exp();
                }
            }
        }
        Frame::new(pixels, focus)
    }

    /// Symmetric sweep: star width grows quadratically away from best focus.
    fn sweep(best: f64, positions: &[f64]) -> Vec<Frame> {
        positions
            .iter()
            .map(|&p| {
                let sigma = 1.5 + 0.02 * (p - best) * (p - best);
                sweep_frame(p, sigma)
            })
            .collect()
    }

    #[test]
    fn test_collect_preserves_order() {
        let frames = sweep(10.0, &[0.0, 5.0, 10.0, 15.0, 20.0]);
        let outcomes = collect_samples(&frames, None, &FocusConfig::default());
        assert_eq!(outcomes.len(), 5);
        let positions: Vec<f64> = outcomes
            .iter()
            .map(|o| o.sample().unwrap().focus_position)
            .collect();
        assert_eq!(positions, vec![0.0, 5.0, 10.0, 15.0, 20.0]);
    }

    #[test]
    fn test_find_best_focus_recovers_vertex() {
        let frames = sweep(10.0, &[0.0, 4.0, 8.0, 12.0, 16.0, 20.0]);
        let run = find_best_focus(&frames, None, &FocusConfig::default()).unwrap();

        match run.outcome {
            SolveOutcome::Success(report) => {
                // Moment widths are a biased but monotone proxy for the true
                // FWHM; with a symmetric sweep the vertex survives the bias.
                assert_relative_eq!(report.best_focus, 10.0, epsilon = 1.0);
                assert_eq!(report.samples_used, 6);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_frame_skipped_not_fatal() {
        let mut frames = sweep(10.0, &[0.0, 5.0, 10.0, 15.0]);
        // A cloud passed over: flat frame with no stars at focus 20.
        frames.push(Frame::new(
            Array2::from_shape_fn((96, 96), |(i, j)| {
                100.0 + 0.5 * (((i * 7 + j * 13) % 5) as f64 - 2.0)
            }),
            20.0,
        ));

        let run = find_best_focus(&frames, None, &FocusConfig::default()).unwrap();
        assert_eq!(run.frames.len(), 5);
        assert!(matches!(
            run.frames[4],
            FrameOutcome::Skipped {
                focus_position,
                ..
            } if focus_position == 20.0
        ));
        match run.outcome {
            SolveOutcome::Success(report) => assert_eq!(report.samples_used, 4),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_bounded_pool_matches_global() {
        let frames = sweep(10.0, &[0.0, 5.0, 10.0, 15.0, 20.0]);
        let global = find_best_focus(&frames, None, &FocusConfig::default()).unwrap();
        let bounded_config = FocusConfig {
            worker_count: Some(2),
            ..FocusConfig::default()
        };
        let bounded = find_best_focus(&frames, None, &bounded_config).unwrap();

        match (global.outcome, bounded.outcome) {
            (SolveOutcome::Success(a), SolveOutcome::Success(b)) => {
                assert_eq!(a.best_focus, b.best_focus);
            }
            other => panic!("expected two successes, got {other:?}"),
        }
    }
}
