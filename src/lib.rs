#![warn(clippy::pedantic)]
// Address arithmetic mixes u32 media addresses with usize buffer sizes.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! Persistent flash circular buffer.
//!
//! A log-structured FIFO of variable-length records on a NOR-flash-like
//! device. Sectors are the erase unit. Records are appended at the head
//! and never overwritten in place. After a restart or power loss, a mount
//! scan rebuilds the head and tail positions from media alone.
//!
//! The crate splits into four modules:
//!
//! - [`flash`]: the [`NorFlash`] capability trait and the [`SimFlash`]
//!   host simulator (erased bytes read 0xFF, programming clears bits only)
//! - [`crc`]: the CRC32 codec guarding headers and payloads
//! - [`layout`]: the on-media sector and record formats with their
//!   bit-clearing lifecycle encodings
//! - [`fcb`]: the engine, covering mount recovery, erase-reset, and append
//!   with sector rotation and overwrite protection

pub mod crc;
pub mod fcb;
pub mod flash;
pub mod layout;

pub use fcb::{Fcb, FcbError, FcbStatus, SectorInfo};
pub use flash::{NorFlash, SimFlash};
