//! Local settings and run storage

pub mod layout;
pub mod runs;
pub mod settings;
