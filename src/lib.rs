//! enrichd: apply pluggable batch transforms ("enrichments") to filtered
//! row sets of SQLite tables, with durable, crash-consistent progress.
//!
//! Jobs can be paused, resumed and cancelled; after a process restart a
//! recovery sweep re-launches every job that was mid-run.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod secrets;
pub mod shutdown;
pub mod source;
pub mod worker;
