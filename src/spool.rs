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

//! Deferred-header buffering for one archive entry.
//!
//! A header written before its payload cannot carry the payload's size or
//! checksum unless somebody holds the payload back until they are known.
//! [`EntrySpool`] does exactly that: compressed bytes accumulate in memory
//! up to a cap, then spill into an unnamed temporary file, and the header
//! is only written, in corrected form, once the entry finishes. An entry that
//! outgrows the overall limit flips, once and irreversibly, to streaming:
//! the original header goes out as-is (descriptor flag set), everything
//! buffered so far follows, and the rest of the payload passes straight
//! through. The temporary file is tied to its handle, so it is deleted on
//! every exit path, panics included.

use crate::structures::{LocalFileHeader, FLAG_DATA_DESCRIPTOR, ZIP64_SIZE_CAP, ZIP64_VERSION};
use crate::{Result, ZipError};
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024;
pub const DEFAULT_SPOOL_LIMIT: u64 = 64 * 1024 * 1024;

/// How much of an entry the writer may hold back to fix up its header.
#[derive(Debug, Clone, Copy)]
pub enum BufferPolicy {
    /// Never hold anything back: headers go out with zero sizes and every
    /// entry gets a trailing data descriptor.
    Streaming,
    /// Hold up to `spool_limit` bytes per entry, the first `memory_limit`
    /// of them in memory and the rest in a temporary file.
    Deferred {
        memory_limit: usize,
        spool_limit: u64,
    },
}

impl BufferPolicy {
    /// A deferred policy, rejected up front when the memory cap exceeds
    /// the overall cap.
    pub fn deferred(memory_limit: usize, spool_limit: u64) -> Result<Self> {
        if memory_limit as u64 > spool_limit {
            return Err(ZipError::InvalidBufferLimits {
                memory: memory_limit,
                spool: spool_limit,
            });
        }
        Ok(BufferPolicy::Deferred {
            memory_limit,
            spool_limit,
        })
    }

    pub const fn streaming() -> Self {
        BufferPolicy::Streaming
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        BufferPolicy::Deferred {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            spool_limit: DEFAULT_SPOOL_LIMIT,
        }
    }
}

enum State {
    Buffering {
        memory: Vec<u8>,
        memory_limit: usize,
        spool_limit: u64,
        spill: Option<File>,
    },
    /// Streaming from the start, or gave up mid-entry; either way the
    /// header is already on the wire and bytes pass straight through.
    Passthrough,
}

/// Per-entry buffering state. Holds the header template (descriptor flag
/// set) until [`finish`](EntrySpool::finish) decides which header version
/// reaches the sink.
pub struct EntrySpool {
    header: LocalFileHeader,
    state: State,
    total: u64,
}

impl EntrySpool {
    /// Begins a buffered entry; nothing reaches the sink until a limit
    /// forces it or the entry finishes.
    pub fn begin(header: LocalFileHeader, memory_limit: usize, spool_limit: u64) -> Self {
        EntrySpool {
            header,
            state: State::Buffering {
                memory: Vec::new(),
                memory_limit,
                spool_limit,
                spill: None,
            },
            total: 0,
        }
    }

    /// Begins a pass-through entry whose header the caller has already
    /// written.
    pub fn passthrough(header: LocalFileHeader) -> Self {
        EntrySpool {
            header,
            state: State::Passthrough,
            total: 0,
        }
    }

    /// Compressed bytes accepted so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_buffering(&self) -> bool {
        matches!(self.state, State::Buffering { .. })
    }

    /// Whether accepting `additional` bytes would tip the entry into the
    /// streaming fallback.
    pub fn would_give_up(&self, additional: u64) -> bool {
        match &self.state {
            State::Buffering { spool_limit, .. } => self.total + additional > *spool_limit,
            State::Passthrough => false,
        }
    }

    pub fn write<W: Write>(&mut self, bytes: &[u8], sink: &mut W) -> Result<()> {
        if self.would_give_up(bytes.len() as u64) {
            self.give_up(sink)?;
        }
        self.total += bytes.len() as u64;
        match &mut self.state {
            State::Buffering {
                memory,
                memory_limit,
                spill,
                ..
            } => {
                let room = memory_limit.saturating_sub(memory.len());
                let (head, tail) = bytes.split_at(room.min(bytes.len()));
                memory.extend_from_slice(head);
                if !tail.is_empty() {
                    if spill.is_none() {
                        *spill = Some(tempfile::tempfile()?);
                    }
                    if let Some(file) = spill.as_mut() {
                        file.write_all(tail)?;
                    }
                }
            }
            State::Passthrough => sink.write_all(bytes)?,
        }
        Ok(())
    }

    /// The irreversible switch to streaming: original header, then the
    /// buffered bytes in arrival order, before the caller's bytes continue
    /// directly to the sink.
    fn give_up<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        let state = std::mem::replace(&mut self.state, State::Passthrough);
        let State::Buffering { memory, mut spill, .. } = state else {
            return Ok(());
        };
        self.header.write_to(sink)?;
        sink.write_all(&memory)?;
        if let Some(mut file) = spill.take() {
            file.seek(SeekFrom::Start(0))?;
            io::copy(&mut file, sink)?;
        }
        Ok(())
    }

    /// Finalizes the entry. While still buffering this writes a corrected
    /// header (true sizes and crc, descriptor flag cleared) followed by the
    /// payload, and hands the corrected header back so the caller can
    /// record it. After a give-up (or under a streaming policy) it returns
    /// `None`: the original header stands and the caller owes the stream a
    /// data descriptor.
    pub fn finish<W: Write>(
        self,
        crc32: u32,
        uncompressed_size: u64,
        sink: &mut W,
    ) -> Result<Option<LocalFileHeader>> {
        match self.state {
            State::Buffering { memory, spill, .. } => {
                let mut header = self.header;
                header.crc32 = crc32;
                header.compressed_size = self.total;
                header.uncompressed_size = uncompressed_size;
                header.flags &= !FLAG_DATA_DESCRIPTOR;
                if header.compressed_size >= ZIP64_SIZE_CAP
                    || header.uncompressed_size >= ZIP64_SIZE_CAP
                {
                    header.zip64 = true;
                    header.version_needed = header.version_needed.max(ZIP64_VERSION);
                }
                header.write_to(sink)?;
                sink.write_all(&memory)?;
                if let Some(mut file) = spill {
                    file.seek(SeekFrom::Start(0))?;
                    io::copy(&mut file, sink)?;
                }
                // The spill handle drops here, deleting the file.
                Ok(Some(header))
            }
            State::Passthrough => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::CompressionMethod;

    fn template(name: &str) -> LocalFileHeader {
        let mut header = LocalFileHeader::builder(name)
            .compression(CompressionMethod::Stored)
            .build();
        header.flags |= FLAG_DATA_DESCRIPTOR;
        header
    }

    #[test]
    fn test_buffered_entry_gets_corrected_header() {
        let mut sink = Vec::new();
        let mut spool = EntrySpool::begin(template("a.txt"), 64, 1024);
        spool.write(&[1, 2, 3], &mut sink).unwrap();
        assert!(sink.is_empty(), "nothing may be flushed while buffering");

        let corrected = spool.finish(0xABCD, 3, &mut sink).unwrap().unwrap();
        assert_eq!(corrected.compressed_size, 3);
        assert_eq!(corrected.uncompressed_size, 3);
        assert_eq!(corrected.crc32, 0xABCD);
        assert!(!corrected.has_data_descriptor());
        // Header followed by the payload, nothing else.
        assert_eq!(&sink[sink.len() - 3..], &[1, 2, 3]);
    }

    #[test]
    fn test_spill_keeps_arrival_order() {
        let mut sink = Vec::new();
        // Memory cap of 4 forces the tail of the payload through the file.
        let mut spool = EntrySpool::begin(template("a.txt"), 4, 1024);
        spool.write(&[1, 2, 3], &mut sink).unwrap();
        spool.write(&[4, 5, 6], &mut sink).unwrap();
        spool.write(&[7, 8], &mut sink).unwrap();
        assert!(sink.is_empty());

        let corrected = spool.finish(0, 8, &mut sink).unwrap().unwrap();
        assert_eq!(corrected.compressed_size, 8);
        assert_eq!(&sink[sink.len() - 8..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_give_up_streams_with_original_header() {
        let mut sink = Vec::new();
        let mut spool = EntrySpool::begin(template("a.txt"), 2, 4);
        spool.write(&[1, 2, 3], &mut sink).unwrap();
        assert!(sink.is_empty());
        assert!(spool.is_buffering());

        // This write crosses the spool limit: header + buffered bytes flush,
        // then the new bytes follow directly.
        spool.write(&[4, 5, 6], &mut sink).unwrap();
        assert!(!spool.is_buffering());
        assert!(!sink.is_empty());
        assert_eq!(&sink[sink.len() - 6..], &[1, 2, 3, 4, 5, 6]);
        let flushed = sink.len();

        assert!(spool.finish(0, 6, &mut sink).unwrap().is_none());
        assert_eq!(sink.len(), flushed, "finish adds nothing after a give-up");
    }

    #[test]
    fn test_streaming_policy_is_passthrough() {
        let mut sink = Vec::new();
        let mut spool = EntrySpool::passthrough(template("a.txt"));
        spool.write(&[9, 9, 9], &mut sink).unwrap();
        assert_eq!(sink, vec![9, 9, 9]);
        assert_eq!(spool.total(), 3);
        assert!(spool.finish(0, 3, &mut sink).unwrap().is_none());
    }

    #[test]
    fn test_empty_entry_still_gets_corrected_header() {
        let mut sink = Vec::new();
        let spool = EntrySpool::begin(template("a.txt"), 16, 1024);
        let corrected = spool.finish(0, 0, &mut sink).unwrap().unwrap();
        assert_eq!(corrected.compressed_size, 0);
        assert!(!corrected.has_data_descriptor());
    }

    #[test]
    fn test_finish_promotes_large_entries_to_zip64() {
        let mut sink = Vec::new();
        let mut spool = EntrySpool::begin(template("big.bin"), 64, 1024);
        spool.write(&[0u8; 10], &mut sink).unwrap();

        // An uncompressed size past the 32-bit cap turns the corrected
        // header into its zip64 form; the template never asked for it.
        let corrected = spool
            .finish(0x1234, 0x1_0000_0000, &mut sink)
            .unwrap()
            .unwrap();
        assert!(corrected.zip64);
        assert_eq!(corrected.version_needed, ZIP64_VERSION);
        assert_eq!(corrected.uncompressed_size, 0x1_0000_0000);
        assert!(!corrected.has_data_descriptor());
    }

    #[test]
    fn test_misconfigured_limits_are_rejected() {
        assert_eq!(
            BufferPolicy::deferred(1024, 16).unwrap_err(),
            ZipError::InvalidBufferLimits {
                memory: 1024,
                spool: 16
            }
        );
        assert!(BufferPolicy::deferred(16, 16).is_ok());
    }
}
