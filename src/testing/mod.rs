//! Test harness for programming and checking a stage.
//!
//! - [`fixture`] - typed register programming (`FixtureBuilder`)
//! - [`vectors`] - TOML test-vector manifests and their runner
//!
//! # Usage
//!
//! ```bash
//! mau-emu --vectors tests/vectors/
//! ```

pub mod fixture;
pub mod vectors;

#[cfg(test)]
mod scenarios;

pub use fixture::FixtureBuilder;
pub use vectors::{Mismatch, VectorManifest, VectorResult, VectorRunner};
