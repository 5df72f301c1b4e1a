//! Device models and register definitions for one match-action stage.
//!
//! This module provides:
//! - The stage register address map and decoder
//! - Sparse register file storage with reset values
//! - The packet header vector (PHV)
//! - Stage state built by applying register-write streams
//!
//! # Stage Overview
//!
//! ```text
//!   write_register / indirect_write
//!              |
//!              v
//!   +---------------------+     configure     +-------------+
//!   |    RegisterFile     | ----------------> |  MauStage   |
//!   | regs, TCAM, SRAM    |                   |             |
//!   +---------------------+          PHV ---> |  process()  | ---> PHV'
//!                                             +-------------+
//! ```
//!
//! # Example
//!
//! ```
//! use mau_emu::device::{RegAddress, RegisterFile};
//! use mau_emu::device::registers_spec::block;
//!
//! let mut regs = RegisterFile::new();
//! let addr = RegAddress::encode(block::TCAM, 0, 0, 280);
//! regs.indirect_write(addr, 0x0c73_015a_79bd, 0x138c_fea5_8643).unwrap();
//! assert_eq!(RegAddress::decode(addr).to_string(), "tcam[0][0][280]");
//! ```

pub mod phv;
pub mod register_file;
pub mod registers;
pub mod registers_spec;
pub mod state;

pub use phv::{ContainerId, ContainerWidth, Direction, Phv, PhvContainer, PhvError};
pub use register_file::RegisterFile;
pub use registers::{RegAddress, RegisterInfo, RegisterRegion};
pub use state::{LoadStats, StageState};
