//! # abflow Core Library
//!
//! The data-interchange and orchestration layer of a three-stage antibody design campaign:
//! backbone generation, sequence design and structure-based filtering, each performed by an
//! external predictive model.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`StructureRecord`), the HLT structure
//!   convention, the Quiver batch container and the Chothia-to-HLT converter.
//!
//! - **[`engine`]: The Logic Core.** Typed stage configuration, loop-length sampling, hotspot
//!   masking, deterministic seeding, per-item run state and the `StageAdapter` contract that
//!   wraps each external model.
//!
//! - **[`workflows`]: The Public API.** The pipeline orchestrator that drives the three stages
//!   over a batch with per-item checkpointing, resume and failure isolation.

pub mod core;
pub mod engine;
pub mod workflows;
