//! Threshold segmentation and connected-component labeling.
//!
//! Pixels above the detection threshold are grouped into 4-connected
//! components ("blobs"), each carrying the bookkeeping the measurement
//! stage needs: bounding box, area, and peak value. Diagonal-only
//! neighbours are treated as separate components.

use ndarray::{Array2, ArrayView2};

/// One connected component of above-threshold pixels.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Label value in the returned label image (starts at 1).
    pub label: u32,
    /// Bounding box rows, inclusive.
    pub min_row: usize,
    /// Bounding box columns, inclusive.
    pub min_col: usize,
    /// Bounding box rows, inclusive.
    pub max_row: usize,
    /// Bounding box columns, inclusive.
    pub max_col: usize,
    /// Number of member pixels.
    pub area: usize,
    /// Maximum pixel value within the component.
    pub peak: f64,
}

impl Blob {
    fn seed(label: u32, row: usize, col: usize, value: f64) -> Self {
        Self {
            label,
            min_row: row,
            min_col: col,
            max_row: row,
            max_col: col,
            area: 1,
            peak: value,
        }
    }

    fn absorb(&mut self, row: usize, col: usize, value: f64) {
        self.min_row = self.min_row.min(row);
        self.min_col = self.min_col.min(col);
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
        self.area += 1;
        if value > self.peak {
            self.peak = value;
        }
    }

    /// Whether the bounding box comes within `margin` pixels of the region
    /// border (for a region of the given shape).
    pub fn touches_border(&self, shape: (usize, usize), margin: usize) -> bool {
        let (height, width) = shape;
        self.min_row < margin
            || self.min_col < margin
            || self.max_row + margin >= height
            || self.max_col + margin >= width
    }
}

/// Label 4-connected components of pixels at or above `threshold`.
///
/// Components smaller than `min_area` pixels are discarded (hot pixels and
/// noise spikes); surviving blobs are relabeled consecutively from 1 and
/// the label image updated to match, with dropped components zeroed.
///
/// # Returns
/// The label image (0 = background) and the surviving blobs, ordered by
/// label.
pub fn label_above_threshold(
    region: &ArrayView2<f64>,
    threshold: f64,
    min_area: usize,
) -> (Array2<u32>, Vec<Blob>) {
    let (height, width) = region.dim();
    let mut labels = Array2::<u32>::zeros((height, width));
    let mut blobs: Vec<Blob> = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for row in 0..height {
        for col in 0..width {
            if labels[[row, col]] != 0 || region[[row, col]] < threshold {
                continue;
            }

            // New component: flood fill from this seed.
            let label = blobs.len() as u32 + 1;
            let mut blob = Blob::seed(label, row, col, region[[row, col]]);
            labels[[row, col]] = label;
            stack.push((row, col));

            while let Some((r, c)) = stack.pop() {
                let mut visit = |nr: usize, nc: usize| {
                    if labels[[nr, nc]] == 0 && region[[nr, nc]] >= threshold {
                        labels[[nr, nc]] = label;
                        blob.absorb(nr, nc, region[[nr, nc]]);
                        stack.push((nr, nc));
                    }
                };

                if r > 0 {
                    visit(r - 1, c);
                }
                if r + 1 < height {
                    visit(r + 1, c);
                }
                if c > 0 {
                    visit(r, c - 1);
                }
                if c + 1 < width {
                    visit(r, c + 1);
                }
            }

            blobs.push(blob);
        }
    }

    // Drop undersized components and compact the label space.
    let mut relabel = vec![0u32; blobs.len() + 1];
    let mut kept: Vec<Blob> = Vec::with_capacity(blobs.len());
    for blob in blobs {
        if blob.area >= min_area {
            let new_label = kept.len() as u32 + 1;
            relabel[blob.label as usize] = new_label;
            let mut blob = blob;
            blob.label = new_label;
            kept.push(blob);
        }
    }

    for value in labels.iter_mut() {
        if *value != 0 {
            *value = relabel[*value as usize];
        }
    }

    (labels, kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn image_from(pattern: &[&[i32]]) -> Array2<f64> {
        let height = pattern.len();
        let width = pattern[0].len();
        Array2::from_shape_fn((height, width), |(i, j)| pattern[i][j] as f64)
    }

    #[test]
    fn test_empty_region() {
        let image = Array2::<f64>::zeros((5, 5));
        let (labels, blobs) = label_above_threshold(&image.view(), 1.0, 1);
        assert!(blobs.is_empty());
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_two_separate_components() {
        let image = image_from(&[
            &[0, 0, 0, 0, 0],
            &[0, 1, 1, 0, 0],
            &[0, 1, 1, 0, 0],
            &[0, 0, 0, 1, 0],
            &[0, 0, 0, 0, 0],
        ]);

        let (labels, blobs) = label_above_threshold(&image.view(), 0.5, 1);
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].area, 4);
        assert_eq!(blobs[1].area, 1);
        assert_eq!(labels[[1, 1]], 1);
        assert_eq!(labels[[3, 3]], 2);
    }

    #[test]
    fn test_u_shape_is_one_component() {
        let image = image_from(&[
            &[0, 0, 0, 0, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 1, 1, 0],
            &[0, 0, 0, 0, 0],
        ]);

        let (_, blobs) = label_above_threshold(&image.view(), 0.5, 1);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 7);
        assert_eq!(
            (
                blobs[0].min_row,
                blobs[0].min_col,
                blobs[0].max_row,
                blobs[0].max_col
            ),
            (1, 1, 3, 3)
        );
    }

    #[test]
    fn test_diagonal_pixels_not_connected() {
        let image = image_from(&[&[1, 0, 0], &[0, 1, 0], &[0, 0, 1]]);
        let (_, blobs) = label_above_threshold(&image.view(), 0.5, 1);
        assert_eq!(blobs.len(), 3);
    }

    #[test]
    fn test_min_area_filter_and_relabeling() {
        let image = image_from(&[
            &[1, 0, 0, 0, 0],
            &[0, 0, 2, 2, 0],
            &[0, 0, 2, 2, 0],
            &[0, 0, 0, 0, 0],
            &[3, 0, 0, 0, 0],
        ]);

        let (labels, blobs) = label_above_threshold(&image.view(), 0.5, 2);
        // The two single-pixel components are dropped; the square survives
        // and is relabeled to 1.
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].label, 1);
        assert_eq!(blobs[0].area, 4);
        assert_eq!(labels[[0, 0]], 0);
        assert_eq!(labels[[4, 0]], 0);
        assert_eq!(labels[[1, 2]], 1);
    }

    #[test]
    fn test_peak_tracking() {
        let image = image_from(&[&[0, 0, 0], &[0, 9, 5], &[0, 5, 0]]);
        let (_, blobs) = label_above_threshold(&image.view(), 4.0, 1);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].peak, 9.0);
    }

    #[test]
    fn test_touches_border() {
        let image = image_from(&[&[1, 0, 0, 0], &[0, 0, 0, 0], &[0, 0, 1, 0], &[0, 0, 0, 0]]);
        let (_, blobs) = label_above_threshold(&image.view(), 0.5, 1);
        assert!(blobs[0].touches_border((4, 4), 1));
        assert!(!blobs[1].touches_border((4, 4), 1));
        assert!(blobs[1].touches_border((4, 4), 2));
    }
}
