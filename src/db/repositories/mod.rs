//! Repositories, one per table

pub mod config;
pub mod message;
pub mod session;
