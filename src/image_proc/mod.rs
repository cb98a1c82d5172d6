//! Image processing primitives for point-source extraction.
//!
//! - **background**: sigma-clipped background level and noise estimation
//! - **segment**: thresholding and connected-component labeling
//! - **moments**: intensity-weighted centroid, shape moments, and FWHM

pub mod background;
pub mod moments;
pub mod segment;

pub use background::{estimate_background, BackgroundEstimate};
pub use moments::{measure_component, ComponentMeasurement};
pub use segment::{label_above_threshold, Blob};
