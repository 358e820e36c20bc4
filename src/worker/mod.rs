pub mod runner;
pub mod tracker;

pub use runner::EnrichmentRunner;
pub use tracker::RunnerTracker;
