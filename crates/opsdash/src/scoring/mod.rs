//! Derived-score engines: tenant wellness, security posture, license
//! optimization, and the unified alert feed.

pub mod alerts;
mod cache;
pub mod health;
pub mod licensing;
pub mod security;

pub use cache::TtlCache;
