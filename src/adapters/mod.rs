//! Adapters between the restore controller and the Kubernetes API
//!
//! The controller only sees the traits defined here. The `Kube*` and
//! `ReflectorStore` types back them with a live cluster.

mod conditions;
mod events;
mod store;
mod writer;

pub use conditions::*;
pub use events::*;
pub use store::*;
pub use writer::*;
