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

//! Archive reader over a forward-only source.
//!
//! The reader walks the stream in the order the writer produced it: local
//! headers and payloads first, then the central directory, then the end
//! records. [`ZipReader::next_entry`] yields headers until it runs into the
//! central directory signature, which it pushes back and reports as "no
//! more entries"; payload bytes come from [`ZipReader::read_payload`] or
//! the [`EntryReader`] adapter. If the header announces a trailing data
//! descriptor, it is parsed and checked once the payload ends.
//! An entry's payload can itself be handed to a second `ZipReader` for
//! archives nested inside archives.

use crate::binio;
use crate::codecs::Decoder;
use crate::rewind::RewindReader;
use crate::structures::{
    CentralDirectory, DataDescriptor, EndOfCentralDirectory, EndOfCentralDirectory64,
    LocalFileHeader, Zip64Locator,
};
use crate::{
    Result, ZipError, CD_SIG, CRC32, EOCD64_LOCATOR_SIG, EOCD64_SIG, EOCD_SIG, LFH_SIG,
};
use std::io::{self, Read};

/// The archive's end section: the legacy end record, preceded by the zip64
/// end record and its locator when the archive needed them.
#[derive(Debug, Clone)]
pub struct ArchiveEnd {
    pub zip64: Option<(EndOfCentralDirectory64, Zip64Locator)>,
    pub end: EndOfCentralDirectory,
}

struct OpenEntry {
    header: LocalFileHeader,
    decoder: Decoder,
    crc: crc::Digest<'static, u32>,
    uncompressed: u64,
    descriptor: Option<DataDescriptor>,
    done: bool,
}

/// Reads a zip archive from any [`Read`] source, in a single pass and
/// without seeking.
pub struct ZipReader<R: Read> {
    source: RewindReader<R>,
    current: Option<OpenEntry>,
}

impl<R: Read> ZipReader<R> {
    pub fn new(source: R) -> Self {
        ZipReader {
            source: RewindReader::new(source),
            current: None,
        }
    }

    /// Parses the next local file header, draining whatever is left of the
    /// current entry first. Returns `None` once the central directory (or,
    /// for an empty archive, the end record) begins; its signature is
    /// pushed back for the follow-up parsers.
    pub fn next_entry(&mut self) -> Result<Option<LocalFileHeader>> {
        self.finish_entry()?;
        let sig = binio::read_u32(&mut self.source)?;
        match sig {
            LFH_SIG => {}
            CD_SIG | EOCD_SIG | EOCD64_SIG => {
                self.source.rewind(4)?;
                return Ok(None);
            }
            other => return Err(ZipError::InvalidSignature(other)),
        }
        let header = LocalFileHeader::read_from(&mut self.source)?;
        let decoder = Decoder::for_method(header.compression, header.compressed_size)?;
        self.current = Some(OpenEntry {
            header: header.clone(),
            decoder,
            crc: CRC32.digest(),
            uncompressed: 0,
            descriptor: None,
            done: false,
        });
        Ok(Some(header))
    }

    /// Pulls decompressed payload bytes for the current entry. `Ok(0)`
    /// means end of payload; at that point the source has been rewound
    /// past the decoder's lookahead and any data descriptor has been
    /// parsed and verified.
    pub fn read_payload(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            // An empty read must not be mistaken for end of payload.
            return Ok(0);
        }
        let n = {
            let Some(entry) = self.current.as_mut() else {
                return Ok(0);
            };
            if entry.done {
                return Ok(0);
            }
            let n = entry.decoder.read(&mut self.source, out)?;
            if n > 0 {
                entry.crc.update(&out[..n]);
                entry.uncompressed += n as u64;
            }
            n
        };
        if n == 0 {
            self.complete_current()?;
        }
        Ok(n)
    }

    /// The current entry's payload as an [`io::Read`]. A second
    /// [`ZipReader`] can be stacked on top of it to read a nested archive.
    pub fn entry_reader(&mut self) -> EntryReader<'_, R> {
        EntryReader { zip: self }
    }

    /// The data descriptor of the current entry, once its payload has been
    /// read to the end.
    pub fn descriptor(&self) -> Option<DataDescriptor> {
        self.current.as_ref().and_then(|entry| entry.descriptor)
    }

    /// Parses the central directory, up to (not including) the end
    /// records. Call once [`next_entry`](ZipReader::next_entry) has
    /// returned `None`.
    pub fn read_central_directory(&mut self) -> Result<Vec<CentralDirectory>> {
        self.finish_entry()?;
        let mut entries = Vec::new();
        loop {
            let sig = binio::read_u32(&mut self.source)?;
            match sig {
                CD_SIG => entries.push(CentralDirectory::read_from(&mut self.source)?),
                EOCD_SIG | EOCD64_SIG => {
                    self.source.rewind(4)?;
                    return Ok(entries);
                }
                other => return Err(ZipError::InvalidSignature(other)),
            }
        }
    }

    /// Parses the end section: the zip64 end record and locator when
    /// present, then the legacy end record.
    pub fn read_end_of_archive(&mut self) -> Result<ArchiveEnd> {
        let mut sig = binio::read_u32(&mut self.source)?;
        let mut zip64 = None;
        if sig == EOCD64_SIG {
            let end64 = EndOfCentralDirectory64::read_from(&mut self.source)?;
            let locator_sig = binio::read_u32(&mut self.source)?;
            if locator_sig != EOCD64_LOCATOR_SIG {
                return Err(ZipError::InvalidSignature(locator_sig));
            }
            let locator = Zip64Locator::read_from(&mut self.source)?;
            zip64 = Some((end64, locator));
            sig = binio::read_u32(&mut self.source)?;
        }
        if sig != EOCD_SIG {
            return Err(ZipError::InvalidSignature(sig));
        }
        let end = EndOfCentralDirectory::read_from(&mut self.source)?;
        Ok(ArchiveEnd { zip64, end })
    }

    /// Drains the rest of the stream. When this reader sits on top of
    /// another consumer (an outer archive entry, say), that consumer's
    /// position stays correct.
    pub fn close(mut self) -> Result<()> {
        self.finish_entry()?;
        let mut scratch = [0u8; 4096];
        loop {
            if self.source.read(&mut scratch)? == 0 {
                return Ok(());
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    /// Reads the current entry's payload to its end, discarding it.
    fn finish_entry(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Ok(());
        }
        let mut scratch = [0u8; 4096];
        loop {
            let done = match &self.current {
                Some(entry) => entry.done,
                None => true,
            };
            if done {
                break;
            }
            self.read_payload(&mut scratch)?;
        }
        self.current = None;
        Ok(())
    }

    /// End-of-payload bookkeeping: rewind the decoder's lookahead, then
    /// settle the entry against its header or data descriptor.
    fn complete_current(&mut self) -> Result<()> {
        let Some(entry) = self.current.as_mut() else {
            return Ok(());
        };
        if entry.done {
            return Ok(());
        }
        self.source.rewind(entry.decoder.unconsumed())?;
        entry.done = true;

        let actual_crc = std::mem::replace(&mut entry.crc, CRC32.digest()).finalize();
        let actual_compressed = entry.decoder.compressed_bytes();
        let actual_uncompressed = entry.uncompressed;

        let expected = if entry.header.has_data_descriptor() {
            let descriptor = DataDescriptor::read_from(&mut self.source, entry.header.zip64)?;
            entry.descriptor = Some(descriptor);
            descriptor
        } else {
            DataDescriptor {
                crc32: entry.header.crc32,
                compressed_size: entry.header.compressed_size,
                uncompressed_size: entry.header.uncompressed_size,
            }
        };
        if expected.compressed_size != actual_compressed {
            return Err(ZipError::SizeMismatch {
                expected: expected.compressed_size,
                actual: actual_compressed,
            });
        }
        if expected.uncompressed_size != actual_uncompressed {
            return Err(ZipError::SizeMismatch {
                expected: expected.uncompressed_size,
                actual: actual_uncompressed,
            });
        }
        if expected.crc32 != actual_crc {
            return Err(ZipError::ChecksumMismatch {
                expected: expected.crc32,
                actual: actual_crc,
            });
        }
        Ok(())
    }
}

/// [`io::Read`] adapter over the current entry's payload.
pub struct EntryReader<'a, R: Read> {
    zip: &'a mut ZipReader<R>,
}

impl<R: Read> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.zip
            .read_payload(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
