//! # Workflows Module
//!
//! High-level entry points that tie the `engine` and `core` layers together.
//!
//! - **Design Pipeline** ([`pipeline`]) - Backbone generation, sequence design and
//!   structure prediction over a batch of designs, with per-item checkpointing, resume,
//!   failure isolation and export of the final designs.

pub mod pipeline;
