//! Reconcilers for MySQL Restore CRDs
//!
//! This module contains the business logic for reconciling restores.
//! Reconcilers are responsible for:
//! - Validating CRD specs and the resources they reference
//! - Choosing the member a restore runs on
//! - Recording the outcome as status and events

pub mod field;
pub mod restore;
pub mod scheduler;
