//! 3D Point Cloud Chart
//! One point per observation on (state, log violent rate, year), colored by
//! state.

use super::plotter::{padded_range, ChartError};
use crate::data::Observation;
use plotters::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Numeric state ids sort by value, text ids after them alphabetically.
fn state_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Axis position of every distinct state id.
pub fn state_positions(observations: &[Observation]) -> HashMap<String, usize> {
    let mut states: Vec<&str> = observations.iter().map(|o| o.state.as_str()).collect();
    states.sort_by(|a, b| state_order(a, b));
    states.dedup();
    states
        .into_iter()
        .enumerate()
        .map(|(i, s)| (s.to_string(), i))
        .collect()
}

/// Plotted `(state, log rate, year)` points; rows missing the log rate or
/// the year are skipped.
fn cloud_points(
    observations: &[Observation],
    positions: &HashMap<String, usize>,
) -> Vec<(f64, f64, f64, HSLColor)> {
    let state_count = positions.len().max(1);
    observations
        .iter()
        .filter_map(|o| {
            let idx = *positions.get(&o.state)?;
            let color = HSLColor(idx as f64 / state_count as f64, 0.65, 0.45);
            Some((idx as f64, o.log_violent?, o.year? as f64, color))
        })
        .collect()
}

/// Render the point cloud. Plotters draws the vertical axis as y, so the
/// log rate goes there and the year runs along z.
pub fn draw_scatter_3d(
    observations: &[Observation],
    size: (u32, u32),
) -> Result<String, ChartError> {
    let positions = state_positions(observations);
    let state_count = positions.len().max(1);
    let points = cloud_points(observations, &positions);

    let x_range = -0.5..(state_count as f64 - 0.5);
    let y_range = padded_range(points.iter().map(|p| p.1));
    let z_range = padded_range(points.iter().map(|p| p.2));

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("State / log(violent rate) / year", ("sans-serif", 22))
            .margin(20)
            .build_cartesian_3d(x_range, y_range, z_range)?;

        chart.with_projection(|mut pb| {
            pb.yaw = 0.6;
            pb.pitch = 0.25;
            pb.scale = 0.8;
            pb.into_matrix()
        });

        chart
            .configure_axes()
            .light_grid_style(BLACK.mix(0.1))
            .max_light_lines(3)
            .draw()?;

        chart.draw_series(
            points
                .iter()
                .map(|&(x, y, z, color)| Circle::new((x, y, z), 2, color.filled())),
        )?;

        root.present()?;
    }

    Ok(svg)
}
