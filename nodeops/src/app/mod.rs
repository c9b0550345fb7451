//! Operator command line application

pub mod cli;
pub mod render;
pub mod run;
