pub mod enrichments;
pub mod health;
pub mod job;
pub mod validation;
