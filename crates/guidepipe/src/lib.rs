//! Public facade crate for `guidepipe`.
//!
//! This crate contains no IO or site-specific logic.
//! It re-exports the backend-agnostic types/traits from `guidepipe-core`.

pub use guidepipe_core::*;
