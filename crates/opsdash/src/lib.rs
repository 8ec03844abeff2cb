//! Scoring core for a multi-tenant IT administration dashboard.
//!
//! The engines in [`scoring`] turn raw directory signals (users, license
//! SKUs, conditional-access policies, service health) into normalized
//! wellness and security scores, license waste recommendations, and a
//! unified alert feed. Upstream data sources are reached through the
//! collaborator traits in [`directory`]; nothing in this crate talks to a
//! network or a database directly.

pub mod catalog;
pub mod config;
pub mod directory;
pub mod scoring;
pub mod telemetry;
