//! Best-focus determination from a focus sweep.
//!
//! Given a sequence of exposures taken at different focus settings, this
//! crate reduces each frame to a robust sharpness statistic (median FWHM of
//! its detected point sources) and fits a focus curve across the sweep to
//! locate the setting that optimizes sharpness, with explicit validity
//! classification of the answer.
//!
//! The usual entry point is [`batch::find_best_focus`]:
//!
//! ```no_run
//! use parfocal::{find_best_focus, FocusConfig, Frame, SolveOutcome};
//! # fn frames() -> Vec<Frame> { unimplemented!() }
//!
//! let frames = frames(); // one Frame per exposure, with focus positions
//! let run = find_best_focus(&frames, None, &FocusConfig::default())?;
//! match run.outcome {
//!     SolveOutcome::Success(report) => {
//!         println!("best focus: {:.2} +- {:.2}", report.best_focus,
//!                  report.best_focus_uncertainty);
//!     }
//!     SolveOutcome::Rejected { reason, .. } => eprintln!("rejected: {reason}"),
//!     SolveOutcome::ConvergenceFailed { .. } => eprintln!("fit did not converge"),
//! }
//! # Ok::<(), parfocal::SolveError>(())
//! ```
//!
//! The two stages are also usable on their own: [`extract::extract`] for a
//! single frame and [`solve::solve`] for an already-collected sample set.
//! Image file input, sweep orchestration, and result presentation belong to
//! the caller.

pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod image_proc;
pub mod solve;
pub mod stats;

pub use batch::{collect_samples, find_best_focus, FocusRun, FrameOutcome};
pub use config::{ExtractionConfig, FocusConfig, ModelFamily, SolverConfig};
pub use error::{ExtractError, SolveError};
pub use extract::{extract, FocusSample, Frame, Roi, SourceMeasurement};
pub use solve::{solve, FocusCurveFit, FocusReport, RejectReason, SolveOutcome};
