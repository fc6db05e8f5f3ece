//! Chart Plotter Module
//! Grouped time series and regression charts rendered to SVG with plotters.

use crate::data::{Observation, PolicyGroup};
use crate::stats::{GroupYearMean, RegressionFit};
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Chart drawing failed: {0}")]
    Drawing(String),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for ChartError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        ChartError::Drawing(err.to_string())
    }
}

/// Control group color, used for never shall-issue states.
pub const CONTROL_COLOR: RGBColor = RGBColor(52, 152, 219); // Blue
pub const ALWAYS_COLOR: RGBColor = RGBColor(231, 76, 60); // Red
pub const TRANSITIONED_COLOR: RGBColor = RGBColor(46, 204, 113); // Green
const UNASSIGNED_COLOR: RGBColor = RGBColor(96, 125, 139); // Blue Grey
const FIT_COLOR: RGBColor = RGBColor(155, 89, 182); // Purple

/// Opacity of raw observations drawn under the group means.
const POINT_ALPHA: f64 = 0.35;

/// Confidence level of the band around the styled regression line.
const BAND_LEVEL: f64 = 0.95;

pub fn group_color(group: PolicyGroup) -> RGBColor {
    match group {
        PolicyGroup::Always => ALWAYS_COLOR,
        PolicyGroup::Never => CONTROL_COLOR,
        PolicyGroup::Transitioned => TRANSITIONED_COLOR,
        PolicyGroup::Unassigned => UNASSIGNED_COLOR,
    }
}

/// Value range with 5% headroom on both sides.
pub(crate) fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return 0.0..1.0;
    }
    let pad = ((max - min) * 0.05).max(0.05);
    (min - pad)..(max + pad)
}

/// Renders the static charts of the report.
pub struct ChartPlotter {
    width: u32,
    height: u32,
}

impl ChartPlotter {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Mean log violent rate per year, one line per group. With
    /// `observations`, the raw rows are drawn underneath at partial opacity.
    pub fn draw_group_means(
        &self,
        means: &[GroupYearMean],
        observations: Option<&[Observation]>,
    ) -> Result<String, ChartError> {
        let raw: Vec<(PolicyGroup, f64, f64)> = observations
            .unwrap_or_default()
            .iter()
            .filter_map(|o| Some((o.group, o.year? as f64, o.log_violent?)))
            .collect();

        let x_range = padded_range(
            means
                .iter()
                .map(|m| m.year as f64)
                .chain(raw.iter().map(|r| r.1)),
        );
        let y_range = padded_range(means.iter().map(|m| m.mean).chain(raw.iter().map(|r| r.2)));

        let caption = if observations.is_some() {
            "Mean log violent rate by group, with observations"
        } else {
            "Mean log violent rate by group"
        };

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, self.size()).into_drawing_area();
            root.fill(&WHITE)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(caption, ("sans-serif", 22))
                .margin(15)
                .x_label_area_size(40)
                .y_label_area_size(55)
                .build_cartesian_2d(x_range, y_range)?;

            chart
                .configure_mesh()
                .x_desc("Year")
                .y_desc("log(violent rate)")
                .x_label_formatter(&|x| format!("{:.0}", x))
                .draw()?;

            if !raw.is_empty() {
                chart.draw_series(raw.iter().map(|&(group, x, y)| {
                    Circle::new((x, y), 3, group_color(group).mix(POINT_ALPHA).filled())
                }))?;
            }

            for group in PolicyGroup::ASSIGNED {
                let line: Vec<(f64, f64)> = means
                    .iter()
                    .filter(|m| m.group == group)
                    .map(|m| (m.year as f64, m.mean))
                    .collect();
                if line.is_empty() {
                    continue;
                }

                let color = group_color(group);
                chart
                    .draw_series(LineSeries::new(line.clone(), color.stroke_width(2)))?
                    .label(group.label())
                    .legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
                chart.draw_series(
                    line.iter()
                        .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
                )?;
            }

            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;

            root.present()?;
        }

        Ok(svg)
    }

    /// Shall-issue indicator against log violent rate with the fitted line.
    /// The styled variant colors points by group, nudges them apart on the
    /// x axis and shades the confidence band of the fit.
    pub fn draw_regression(
        &self,
        observations: &[Observation],
        fit: Option<&RegressionFit>,
        styled: bool,
    ) -> Result<String, ChartError> {
        let points: Vec<(PolicyGroup, f64, f64)> = observations
            .iter()
            .filter_map(|o| Some((o.group, o.shall?, o.log_violent?)))
            .collect();

        let y_range = padded_range(points.iter().map(|p| p.2));
        let x_range = -0.25..1.25;

        let caption = if styled {
            "log(violent rate) vs. shall-issue, by group"
        } else {
            "log(violent rate) vs. shall-issue"
        };

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, self.size()).into_drawing_area();
            root.fill(&WHITE)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(caption, ("sans-serif", 22))
                .margin(15)
                .x_label_area_size(40)
                .y_label_area_size(55)
                .build_cartesian_2d(x_range, y_range)?;

            chart
                .configure_mesh()
                .x_desc("Shall-issue law in effect")
                .y_desc("log(violent rate)")
                .x_labels(7)
                .x_label_formatter(&|x| format!("{:.1}", x))
                .draw()?;

            if let (true, Some(fit)) = (styled, fit) {
                let xs: Vec<f64> = (0..=30).map(|i| -0.15 + 1.3 * i as f64 / 30.0).collect();
                let bands: Vec<(f64, (f64, f64))> = xs
                    .iter()
                    .filter_map(|&x| Some((x, fit.confidence_band(x, BAND_LEVEL)?)))
                    .collect();
                if !bands.is_empty() {
                    let outline: Vec<(f64, f64)> = bands
                        .iter()
                        .map(|&(x, (lo, _))| (x, lo))
                        .chain(bands.iter().rev().map(|&(x, (_, hi))| (x, hi)))
                        .collect();
                    chart.draw_series(std::iter::once(Polygon::new(
                        outline,
                        FIT_COLOR.mix(0.2).filled(),
                    )))?;
                }
            }

            if styled {
                for group in PolicyGroup::ASSIGNED {
                    let color = group_color(group);
                    let offset = Self::group_offset(group);
                    chart
                        .draw_series(
                            points
                                .iter()
                                .filter(|p| p.0 == group)
                                .map(|&(_, x, y)| {
                                    Circle::new((x + offset, y), 3, color.mix(0.5).filled())
                                }),
                        )?
                        .label(group.label())
                        .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
                }
            } else {
                chart.draw_series(
                    points
                        .iter()
                        .map(|&(_, x, y)| Circle::new((x, y), 3, BLACK.mix(POINT_ALPHA).filled())),
                )?;
            }

            if let Some(fit) = fit {
                let color = if styled { FIT_COLOR } else { ALWAYS_COLOR };
                chart
                    .draw_series(LineSeries::new(
                        [-0.15, 1.15].map(|x| (x, fit.predict(x))),
                        color.stroke_width(2),
                    ))?
                    .label(format!(
                        "OLS: y = {:.3} + {:.3}x",
                        fit.intercept, fit.slope
                    ))
                    .legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
            }

            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperLeft)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;

            root.present()?;
        }

        Ok(svg)
    }

    /// Small x shift so the three groups do not overplot at 0 and 1.
    fn group_offset(group: PolicyGroup) -> f64 {
        match group {
            PolicyGroup::Always => -0.06,
            PolicyGroup::Transitioned => 0.06,
            _ => 0.0,
        }
    }
}
