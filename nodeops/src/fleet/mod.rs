//! Fleet status aggregation

pub mod aggregator;

pub use aggregator::{summarize, FleetAggregator};
