pub mod catalog;
pub mod connection;
pub mod error_repository;
pub mod job_repository;
pub mod message_repository;
pub mod models;
pub mod schema;
