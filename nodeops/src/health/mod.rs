//! Node status probing and block-production health checks

pub mod evaluator;
pub mod probe;

pub use evaluator::{check_health, check_health_with, evaluate};
pub use probe::{CometRpcProbe, ProbeError, StatusProbe};
