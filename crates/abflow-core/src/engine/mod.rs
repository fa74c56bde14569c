//! # Engine Module
//!
//! Stateful design logic shared by the pipeline workflow: typed stage configuration,
//! randomised choices, item bookkeeping and the boundary to the external models.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Typed per-stage parameters and their builders
//! - **Loop Specifications** ([`loop_spec`]) - Parsing and length sampling of designable loops
//! - **Hotspots** ([`hotspots`]) - Target contact detection and proportional reveal
//! - **Seeding** ([`seeding`]) - Reproducible per-item seeds derived from one base seed
//! - **Stages** ([`stage`], [`external`]) - The adapter contract and the external-command adapter
//! - **Run State** ([`state`]) - Per-item status and the atomic checkpoint file
//! - **Metrics** ([`rmsd`]) - Superposition RMSDs between designed and predicted complexes
//! - **Progress Monitoring** ([`progress`]) - Progress reporting callbacks
//! - **Error Handling** ([`error`]) - Orchestration-level error types

pub mod config;
pub mod error;
pub mod external;
pub mod hotspots;
pub mod loop_spec;
pub mod progress;
pub mod rmsd;
pub mod seeding;
pub mod stage;
pub mod state;
