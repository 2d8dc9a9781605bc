pub mod classify;
pub mod cluster;
pub mod collect;
pub mod cross_run_dedup;
pub mod digest;
pub mod extract;
pub mod select;
pub mod summarize;
