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

//! Archive writer over a forward-only sink.
//!
//! Entries are written one at a time: [`ZipWriter::begin_entry`] takes a
//! header template, the returned [`EntryWriter`] accepts the payload (as a
//! [`std::io::Write`]), and its [`finish`](EntryWriter::finish) settles how
//! the header reaches the wire: corrected in place when the spool held the
//! whole payload, or followed by a data descriptor when it could not.
//! Closing the archive writes the accumulated central directory and the end
//! records, promoting to the zip64 forms when a count or offset overflows
//! its legacy field.

use crate::codecs::Encoder;
use crate::spool::{BufferPolicy, EntrySpool};
use crate::structures::{
    CentralDirectory, CompressionMethod, DataDescriptor, EndOfCentralDirectory,
    EndOfCentralDirectory64, LocalFileHeader, Zip64Locator, FLAG_DATA_DESCRIPTOR, ZIP64_RECORD_CAP,
    ZIP64_SIZE_CAP, ZIP64_VERSION,
};
use crate::{Result, ZipError, CRC32};
use std::io::{self, Write};

/// Tracks how many bytes went out, which is how local header offsets are
/// known without seeking.
struct CountWriter<W> {
    writer: W,
    count: u64,
}

impl<W> CountWriter<W> {
    fn new(writer: W) -> Self {
        CountWriter { writer, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Write for CountWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Writes a zip archive to any [`Write`] sink, in a single pass.
pub struct ZipWriter<W: Write> {
    sink: CountWriter<W>,
    policy: BufferPolicy,
    directory: Vec<CentralDirectory>,
    comment: Vec<u8>,
}

impl<W: Write> ZipWriter<W> {
    /// A writer with the default deferred-buffering policy.
    pub fn new(sink: W) -> Self {
        Self::with_policy(sink, BufferPolicy::default())
    }

    pub fn with_policy(sink: W, policy: BufferPolicy) -> Self {
        ZipWriter {
            sink: CountWriter::new(sink),
            policy,
            directory: Vec::new(),
            comment: Vec::new(),
        }
    }

    /// Sets the archive comment written with the end record.
    pub fn set_comment<C: Into<Vec<u8>>>(&mut self, comment: C) {
        self.comment = comment.into();
    }

    /// Opens the next entry. The template's sizes and crc may be zero;
    /// they are settled when the entry finishes.
    pub fn begin_entry(&mut self, header: LocalFileHeader) -> Result<EntryWriter<'_, W>> {
        if header.file_name.len() > u16::MAX as usize {
            return Err(ZipError::InvalidEntry("file name too long".into()));
        }
        if header.extra_field.len() + 20 > u16::MAX as usize {
            return Err(ZipError::InvalidEntry("extra field too long".into()));
        }
        let mut header = header;
        header.flags |= FLAG_DATA_DESCRIPTOR;
        let encoder = Encoder::for_method(header.compression)?;
        let offset = self.sink.count();
        let spool = match self.policy {
            BufferPolicy::Streaming => {
                if header.compression == CompressionMethod::Stored {
                    // A stored payload with descriptor-only sizes cannot be
                    // read back from a forward-only stream.
                    return Err(ZipError::UnknownStoredSize);
                }
                header.write_to(&mut self.sink)?;
                EntrySpool::passthrough(header.clone())
            }
            BufferPolicy::Deferred {
                memory_limit,
                spool_limit,
            } => EntrySpool::begin(header.clone(), memory_limit, spool_limit),
        };
        Ok(EntryWriter {
            archive: self,
            header,
            offset,
            encoder,
            spool,
            crc: CRC32.digest(),
            uncompressed: 0,
        })
    }

    /// Writes the central directory and the end records, and returns the
    /// underlying sink. Zip64 forms are inserted whenever a count, size or
    /// offset overflows its legacy field.
    pub fn finish(mut self) -> Result<W> {
        if self.comment.len() > u16::MAX as usize {
            return Err(ZipError::InvalidEntry("archive comment too long".into()));
        }
        let directory_offset = self.sink.count();
        for entry in &self.directory {
            entry.write_to(&mut self.sink)?;
        }
        let directory_size = self.sink.count() - directory_offset;
        let total_records = self.directory.len() as u64;

        let needs_zip64 = total_records >= ZIP64_RECORD_CAP
            || directory_size >= ZIP64_SIZE_CAP
            || directory_offset >= ZIP64_SIZE_CAP;
        if needs_zip64 {
            let eocd64_offset = self.sink.count();
            let eocd64 = EndOfCentralDirectory64 {
                size_of_end_of_central_directory: 44,
                version_made_by: ZIP64_VERSION,
                version_needed_to_extract: ZIP64_VERSION,
                disk_number: 0,
                first_disk: 0,
                number_of_central_directory_records_on_this_disk: total_records,
                total_number_of_central_directory_records: total_records,
                size_of_central_directory: directory_size,
                offset_of_start_of_central_directory: directory_offset,
                extensible_data_sector: Vec::new(),
            };
            eocd64.write_to(&mut self.sink)?;
            let locator = Zip64Locator {
                first_disk: 0,
                eocd64_offset,
                total_disks: 1,
            };
            locator.write_to(&mut self.sink)?;
        }

        let end = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            number_of_central_directory_records_on_this_disk: total_records
                .min(ZIP64_RECORD_CAP) as u16,
            total_number_of_central_directory_records: total_records.min(ZIP64_RECORD_CAP) as u16,
            size_of_central_directory: directory_size.min(ZIP64_SIZE_CAP) as u32,
            offset_of_start_of_central_directory: directory_offset.min(ZIP64_SIZE_CAP) as u32,
            zip_file_comment: self.comment,
        };
        end.write_to(&mut self.sink)?;
        self.sink.flush()?;
        Ok(self.sink.into_inner())
    }
}

/// Sink for one entry's payload. Bytes written here are checksummed,
/// compressed, and handed to the spool; call [`finish`](EntryWriter::finish)
/// to settle the entry. Dropping an unfinished entry leaves the archive in
/// an unusable state, mirroring the half-written stream it would produce.
pub struct EntryWriter<'a, W: Write> {
    archive: &'a mut ZipWriter<W>,
    header: LocalFileHeader,
    offset: u64,
    encoder: Encoder,
    spool: EntrySpool,
    crc: crc::Digest<'static, u32>,
    uncompressed: u64,
}

impl<W: Write> EntryWriter<'_, W> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        if self.header.compression == CompressionMethod::Stored
            && self.spool.would_give_up(buf.len() as u64)
        {
            // Falling back to a descriptor would make the stored entry
            // unreadable; refuse before anything hits the wire.
            return Err(ZipError::UnknownStoredSize);
        }
        self.crc.update(buf);
        self.uncompressed += buf.len() as u64;
        let spool = &mut self.spool;
        let sink = &mut self.archive.sink;
        self.encoder.write(buf, &mut |chunk| spool.write(chunk, sink))
    }

    /// Flushes the codec, writes whichever of corrected header or data
    /// descriptor this entry ends up needing, and records the entry for
    /// the central directory.
    pub fn finish(self) -> Result<()> {
        let EntryWriter {
            archive,
            mut header,
            offset,
            mut encoder,
            mut spool,
            crc,
            uncompressed,
        } = self;
        encoder.finish(&mut |chunk| spool.write(chunk, &mut archive.sink))?;
        let crc32 = crc.finalize();
        let compressed = spool.total();

        match spool.finish(crc32, uncompressed, &mut archive.sink)? {
            Some(corrected) => {
                archive
                    .directory
                    .push(CentralDirectory::from_header(&corrected, offset));
            }
            None => {
                if !header.zip64
                    && (compressed >= ZIP64_SIZE_CAP || uncompressed >= ZIP64_SIZE_CAP)
                {
                    return Err(ZipError::Zip64Required);
                }
                let descriptor = DataDescriptor {
                    crc32,
                    compressed_size: compressed,
                    uncompressed_size: uncompressed,
                };
                descriptor.write_to(&mut archive.sink, header.zip64)?;
                // The header on the wire keeps zero sizes and the
                // descriptor flag; the catalog records the real values.
                header.crc32 = crc32;
                header.compressed_size = compressed;
                header.uncompressed_size = uncompressed;
                archive
                    .directory
                    .push(CentralDirectory::from_header(&header, offset));
            }
        }
        Ok(())
    }
}

impl<W: Write> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.archive.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::FLAG_UTF8_NAME;

    fn le16(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn le32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn test_buffered_stored_entry_has_exact_header() {
        let mut archive = ZipWriter::new(Vec::new());
        let header = LocalFileHeader::builder("hello")
            .compression(CompressionMethod::Stored)
            .build();
        let mut entry = archive.begin_entry(header).unwrap();
        entry.write_all(&[1, 2, 3]).unwrap();
        entry.finish().unwrap();
        let bytes = archive.finish().unwrap();

        // Fixed local header layout: the sizes and crc are final, and the
        // descriptor flag is clear.
        assert_eq!(le32(&bytes, 0), crate::LFH_SIG);
        assert_eq!(le16(&bytes, 6) & FLAG_DATA_DESCRIPTOR, 0);
        assert_eq!(le16(&bytes, 8), 0); // stored
        assert_eq!(le32(&bytes, 14), CRC32.checksum(&[1, 2, 3]));
        assert_eq!(le32(&bytes, 18), 3);
        assert_eq!(le32(&bytes, 22), 3);
        assert_eq!(le16(&bytes, 26), 5);
        assert_eq!(le16(&bytes, 28), 0);
        assert_eq!(&bytes[30..35], b"hello");
        assert_eq!(&bytes[35..38], &[1, 2, 3]);
    }

    #[test]
    fn test_streamed_entry_defers_sizes_to_descriptor() {
        let mut archive = ZipWriter::with_policy(Vec::new(), BufferPolicy::streaming());
        let header = LocalFileHeader::builder("hello")
            .compression(CompressionMethod::Deflate)
            .build();
        let mut entry = archive.begin_entry(header).unwrap();
        entry.write_all(&[1, 2, 3]).unwrap();
        entry.finish().unwrap();
        let bytes = archive.finish().unwrap();

        assert_ne!(le16(&bytes, 6) & FLAG_DATA_DESCRIPTOR, 0);
        assert_eq!(le32(&bytes, 14), 0);
        assert_eq!(le32(&bytes, 18), 0);
        assert_eq!(le32(&bytes, 22), 0);

        // A descriptor with the real values follows the payload.
        let payload_start = 30 + 5;
        let descriptor_at = bytes
            .windows(4)
            .skip(payload_start)
            .position(|w| le32(w, 0) == crate::DD_SIG)
            .map(|p| p + payload_start)
            .expect("data descriptor magic");
        assert_eq!(le32(&bytes, descriptor_at + 4), CRC32.checksum(&[1, 2, 3]));
        assert_eq!(le32(&bytes, descriptor_at + 12), 3);
    }

    #[test]
    fn test_stored_entries_cannot_stream() {
        let mut archive = ZipWriter::with_policy(Vec::new(), BufferPolicy::streaming());
        let header = LocalFileHeader::builder("hello")
            .compression(CompressionMethod::Stored)
            .build();
        assert_eq!(
            archive.begin_entry(header).err(),
            Some(ZipError::UnknownStoredSize)
        );
    }

    #[test]
    fn test_stored_entry_larger_than_spool_limit_is_refused() {
        let mut archive =
            ZipWriter::with_policy(Vec::new(), BufferPolicy::deferred(4, 8).unwrap());
        let header = LocalFileHeader::builder("big")
            .compression(CompressionMethod::Stored)
            .build();
        let mut entry = archive.begin_entry(header).unwrap();
        entry.write_all(&[0u8; 8]).unwrap();
        let err = entry.write_bytes(&[1u8; 4]).unwrap_err();
        assert_eq!(err, ZipError::UnknownStoredSize);
    }

    #[test]
    fn test_unsupported_method_fails_at_encoder_selection() {
        let mut archive = ZipWriter::new(Vec::new());
        let header = LocalFileHeader::builder("x")
            .compression(CompressionMethod::Bzip2)
            .build();
        assert_eq!(
            archive.begin_entry(header).err(),
            Some(ZipError::UnsupportedMethod(12))
        );
    }

    #[test]
    fn test_utf8_names_set_the_flag_on_the_wire() {
        let mut archive = ZipWriter::new(Vec::new());
        let header = LocalFileHeader::builder("naïve.txt").build();
        let entry = archive.begin_entry(header).unwrap();
        entry.finish().unwrap();
        let bytes = archive.finish().unwrap();
        assert_ne!(le16(&bytes, 6) & FLAG_UTF8_NAME, 0);
    }

    #[test]
    fn test_record_count_overflow_promotes_end_section() {
        let mut archive = ZipWriter::new(Vec::new());
        for _ in 0..u16::MAX {
            let header = LocalFileHeader::builder("e")
                .compression(CompressionMethod::Stored)
                .build();
            archive.begin_entry(header).unwrap().finish().unwrap();
        }
        let bytes = archive.finish().unwrap();

        // Tail layout: zip64 end record, locator, then the legacy record.
        let eocd_at = bytes.len() - 22;
        let locator_at = eocd_at - 20;
        let eocd64_at = locator_at - 56;
        assert_eq!(le32(&bytes, eocd_at), crate::EOCD_SIG);
        assert_eq!(le32(&bytes, locator_at), crate::EOCD64_LOCATOR_SIG);
        assert_eq!(le32(&bytes, eocd64_at), crate::EOCD64_SIG);

        // The legacy count saturates; the real one lives in the zip64
        // record, and the locator points back at that record.
        assert_eq!(le16(&bytes, eocd_at + 10), u16::MAX);
        let records_total =
            u64::from_le_bytes(bytes[eocd64_at + 32..eocd64_at + 40].try_into().unwrap());
        assert_eq!(records_total, u16::MAX as u64);
        let eocd64_offset =
            u64::from_le_bytes(bytes[locator_at + 8..locator_at + 16].try_into().unwrap());
        assert_eq!(eocd64_offset, eocd64_at as u64);
    }

    #[test]
    fn test_empty_archive_is_just_an_end_record() {
        let bytes = ZipWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(bytes.len(), 22);
        assert_eq!(le32(&bytes, 0), crate::EOCD_SIG);
        assert_eq!(le16(&bytes, 10), 0);
    }
}
