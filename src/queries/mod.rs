//! Analytical query engines over the trip store.

pub mod heatmap;
pub mod speed;
pub mod totals;
pub mod types;
mod util;
