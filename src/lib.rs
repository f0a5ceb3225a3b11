/*
   Streaming zip file reader and writer, in pure Rust.
   Copyright (C) 2022 Matheus Xavier <mxavier@neonimp.com>

   This program is free software: you can redistribute it and/or modify
   it under the terms of the GNU Lesser General Public License as published by
   the Free Software Foundation, either version 3 of the License, or
   (at your option) any later version.

   This program is distributed in the hope that it will be useful,
   but WITHOUT ANY WARRANTY; without even the implied warranty of
   MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
   GNU General Public License for more details.

   You should have received a copy of the GNU Lesser General Public License
   along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! Single-pass ZIP archive I/O over forward-only byte streams.
//!
//! The reader never seeks and the writer never backpatches: entries are
//! produced and consumed strictly in stream order. What makes that possible
//! is a small set of building blocks layered under the container protocol:
//!
//! * [`rewind::RewindReader`] lets a decoder push back bytes it read past
//!   the end of a compressed payload;
//! * [`spool::EntrySpool`] buffers an entry's payload so its header can be
//!   written with the true size and checksum, spilling to a temporary file
//!   and falling back to a trailing data descriptor for oversized entries;
//! * [`codecs`] adapts the raw DEFLATE primitive (and the stored
//!   pass-through) to the pull/push loops the container drives.
//!
//! Both ends work over any [`std::io::Read`]/[`std::io::Write`]; wrap slow
//! sources in a `BufReader` as usual.

use crc::{Crc, CRC_32_ISO_HDLC};
use thiserror::Error;

pub mod binio;
pub mod codecs;
pub mod reader;
pub mod rewind;
pub mod spool;
pub mod structures;
pub mod writer;

pub use crate::reader::{ArchiveEnd, EntryReader, ZipReader};
pub use crate::spool::BufferPolicy;
pub use crate::structures::{
    CentralDirectory, CompressionMethod, DataDescriptor, EndOfCentralDirectory, LocalFileHeader,
};
pub use crate::writer::{EntryWriter, ZipWriter};

pub const LFH_SIG: u32 = 0x04034b50;
pub const DD_SIG: u32 = 0x08074b50;
pub const CD_SIG: u32 = 0x02014b50;
pub const EOCD_SIG: u32 = 0x06054b50;
pub const EOCD64_SIG: u32 = 0x06064b50;
pub const EOCD64_LOCATOR_SIG: u32 = 0x07064b50;

/// CRC-32 as the zip format defines it (ISO-HDLC polynomial).
pub static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Error)]
pub enum ZipError {
    #[error("IO exception: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Stream ended before the record was complete")]
    UnexpectedEof,
    #[error("Invalid signature: {0:#010x}")]
    InvalidSignature(u32),
    #[error("Unsupported compression method: {0}")]
    UnsupportedMethod(u16),
    #[error("Corrupt compressed data: {0}")]
    CorruptData(String),
    #[error("Rewind of {requested} bytes exceeds the {available} replayable bytes")]
    InvalidRewind { requested: usize, available: usize },
    #[error("Invalid buffering limits: memory limit {memory} exceeds spool limit {spool}")]
    InvalidBufferLimits { memory: usize, spool: u64 },
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("Size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("Stored entries need their size known before the header is written")]
    UnknownStoredSize,
    #[error("Entry exceeds 4 GiB but was not opened as zip64")]
    Zip64Required,
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
}

impl PartialEq for ZipError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ZipError::IOError(a), ZipError::IOError(b)) => a.kind() == b.kind(),
            (ZipError::UnexpectedEof, ZipError::UnexpectedEof) => true,
            (ZipError::InvalidSignature(a), ZipError::InvalidSignature(b)) => a == b,
            (ZipError::UnsupportedMethod(a), ZipError::UnsupportedMethod(b)) => a == b,
            (ZipError::CorruptData(a), ZipError::CorruptData(b)) => a == b,
            (
                ZipError::InvalidRewind { requested: a, available: b },
                ZipError::InvalidRewind { requested: c, available: d },
            ) => a == c && b == d,
            (
                ZipError::InvalidBufferLimits { memory: a, spool: b },
                ZipError::InvalidBufferLimits { memory: c, spool: d },
            ) => a == c && b == d,
            (
                ZipError::ChecksumMismatch { expected: a, actual: b },
                ZipError::ChecksumMismatch { expected: c, actual: d },
            ) => a == c && b == d,
            (
                ZipError::SizeMismatch { expected: a, actual: b },
                ZipError::SizeMismatch { expected: c, actual: d },
            ) => a == c && b == d,
            (ZipError::UnknownStoredSize, ZipError::UnknownStoredSize) => true,
            (ZipError::Zip64Required, ZipError::Zip64Required) => true,
            (ZipError::InvalidEntry(a), ZipError::InvalidEntry(b)) => a == b,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ZipError>;
