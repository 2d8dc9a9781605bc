//! Orchestration of the individual pipeline steps (C3-C10) over the `Store`,
//! `Oracle`, and `PageFetcher` traits, plus the run/checkpoint manager (C11)
//! that sequences them and supports resuming an interrupted run.

pub mod run;
pub mod steps;

pub use run::{RunManager, RunOptions};
