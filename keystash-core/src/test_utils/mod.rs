//! Test utilities and helpers for keystash
//!
//! Fault-injecting storage, key fixtures and assertions shared by unit
//! tests, integration tests and benches.

pub mod assertions;
pub mod deterministic_rng;
pub mod faulty;
pub mod fixtures;

pub use assertions::*;
pub use deterministic_rng::*;
pub use faulty::FaultyStorage;
pub use fixtures::*;
