//! Register-stream formats.
//!
//! - [`regblob`] - Binary register blob (header + write commands)
//! - [`regscript`] - Line-oriented text script with packet directives

pub mod regblob;
pub mod regscript;

pub use regblob::{RegBlob, RegBlobWriter, RegCommand};
pub use regscript::RegScript;
