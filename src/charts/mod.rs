//! Charts module - static SVG chart rendering

mod plotter;
mod scatter3d;

pub use plotter::ChartPlotter;
pub use scatter3d::draw_scatter_3d;
