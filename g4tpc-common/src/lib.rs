//! # G4TPC Common Library
//!
//! Shared code for the G4TPC simulation crates:
//! - Error taxonomy (fatal configuration errors vs. reported diagnostics)
//! - Run configuration loading and validation
//! - Genie tracker file parsing

pub mod config;
pub mod error;
pub mod genie;

pub use config::{PrimarySource, RunConfig, RunSetup};
pub use error::{Error, Result};
pub use genie::{GenieEvent, Track};
