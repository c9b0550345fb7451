//! Data models

pub mod deployment;
pub mod fleet;
pub mod outcome;
pub mod plan;
pub mod status;
pub mod target;
