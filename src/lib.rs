//! MySQL Restore Kubernetes Operator
//!
//! This operator validates MySqlRestore resources against the clusters and
//! backups they reference and schedules them onto the cluster primary.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};
