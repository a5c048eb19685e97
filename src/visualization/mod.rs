//! Visualization tools for complement sets.
//!
//! Renders a top-down (x vs y) scatter plot of the reference map in light gray
//! with the complement points of one algorithm drawn over it.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::loaders::PointCloud;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty point cloud")]
    EmptyPointCloud,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1920;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1080;

/// Per-algorithm colors for complement points.
const ALGORITHM_COLORS: &[(u8, u8, u8)] = &[
    (228, 26, 28),   // Red
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
];

/// Reference points are drawn faint so the complement stands out.
const REFERENCE_COLOR: RGBAColor = RGBAColor(190, 190, 190, 0.4);

/// Color used for the algorithm at `index` in the candidate list.
pub fn algorithm_color(index: usize) -> RGBColor {
    let c = ALGORITHM_COLORS[index % ALGORITHM_COLORS.len()];
    RGBColor(c.0, c.1, c.2)
}

/// Every `step`th point so that at most `max_points` remain.
fn subsample(cloud: &PointCloud, max_points: usize) -> Vec<(f32, f32)> {
    let n = cloud.len();
    let step = if max_points > 0 && n > max_points { n.div_ceil(max_points) } else { 1 };
    (0..n).step_by(step).map(|i| (cloud.x[i], cloud.y[i])).collect()
}

/// Plot the complement of one algorithm over its reference map and save as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `reference` - The reference map, drawn in gray
/// * `complement` - Reference points missing from the candidate
/// * `color` - Color for complement points
/// * `max_points` - Maximum number of reference points to plot (subsamples if exceeded)
///
/// Complement points are never subsampled.
pub fn plot_complement(
    output_path: &Path,
    reference: &PointCloud,
    complement: &PointCloud,
    color: RGBColor,
    max_points: usize,
) -> Result<()> {
    if reference.is_empty() {
        return Err(VisualizationError::EmptyPointCloud);
    }

    let background = subsample(reference, max_points);
    let missing = subsample(complement, 0);

    // Bounds come from the whole reference; the complement is a subset of it
    let (x_min, x_max, y_min, y_max) = compute_bounds(reference);
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(
            background
                .iter()
                .map(|(x, y)| Circle::new((*x, *y), 1, REFERENCE_COLOR.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(missing.iter().map(|(x, y)| Circle::new((*x, *y), 3, color.filled())))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    log::debug!(
        "Plotted {} reference and {} complement points to {}",
        background.len(),
        missing.len(),
        output_path.display()
    );

    Ok(())
}

/// Compute the bounds (min/max) for x and y coordinates.
fn compute_bounds(cloud: &PointCloud) -> (f32, f32, f32, f32) {
    let mut x_min = f32::MAX;
    let mut x_max = f32::MIN;
    let mut y_min = f32::MAX;
    let mut y_max = f32::MIN;

    for (x, y) in cloud.x.iter().zip(&cloud.y) {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }

    if (x_max - x_min).abs() < f32::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f32::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (x_min, x_max, y_min, y_max)
}
