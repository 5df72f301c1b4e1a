//! mau-emu library
//!
//! Bit-exact behavioral model of one match-action (MAU) pipeline stage:
//! register programming, match lookup, resource address distribution and
//! action execution on packet header vectors.

pub mod config;
pub mod device;
pub mod error;
pub mod mau;
pub mod parser;
pub mod testing;
