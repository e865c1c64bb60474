//! Flat file store for serial NOR flash.
//!
//! A small file allocation table in sector 0 lists up to 32 files laid out
//! back to back in the rest of the chip. Files are written once, append
//! only, through a page-aligned write buffer, and read back sequentially.
//! Only the most recent file can be deleted.
//!
//! The store reaches hardware through [`flash::FlashDevice`]; enable the
//! `mock-flash` feature for a RAM-backed simulator.
#![no_std]

extern crate alloc;

pub mod flash;
pub mod storage;

pub use flash::{FlashDevice, FlashError};
pub use storage::{FlashStore, Mode, StoreConfig, StoreError};
