//! nodeops
//!
//! Deploys `pokerchaind` nodes over SSH, verifies that they produce blocks,
//! and summarizes the health of a whole network.

pub mod app;
pub mod deploy;
pub mod diagnostic;
pub mod errors;
pub mod fleet;
pub mod health;
pub mod logs;
pub mod models;
pub mod remote;
pub mod storage;
pub mod utils;
pub mod workers;
