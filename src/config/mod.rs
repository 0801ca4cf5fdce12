//! Clawsync configuration module
//! Handles loading and saving the settings file

pub mod config;

pub use config::{Settings, WatcherSettings};
