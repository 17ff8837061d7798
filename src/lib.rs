//! Model engine lifecycle service - Library exports for testing
//!
//! (c) Softlandia 2025

pub mod api;
pub mod core;
pub mod infrastructure;

pub use crate::core::state::{InitProgressReport, LifecycleState, ProgressPolicy};
pub use crate::core::store::LifecycleStore;
