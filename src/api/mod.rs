//! Public API for gpuquery.
//!
//! This module contains the user-facing session, configuration, semaphore unit and
//! statistics types. Most users should only interact with types from this module.

pub mod config;
pub mod context;
pub mod reporter;
pub mod stats;
