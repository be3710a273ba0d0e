//! Kubernetes controllers for MySQL Restore CRDs
//!
//! This module contains the work queue and the controller that feeds
//! watched restores through it to the reconciler.

mod key;
mod queue;
mod restore_controller;

pub use key::{object_key, split_key};
pub use queue::{ExponentialBackoff, RateLimitingQueue};
pub use restore_controller::RestoreController;
