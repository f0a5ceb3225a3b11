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

//! The zip record types and their wire encodings.
//!
//! Each record is a plain value with `read_from`/`write_to` methods; the
//! record signature itself is consumed by the caller, because which record
//! follows is only known after looking at the signature. Sizes and offsets
//! are held as `u64` in memory and saturate to `0xFFFFFFFF` on the wire,
//! with the real values carried in the zip64 extended-information extra
//! field when needed.

use crate::binio;
use crate::{Result, ZipError, CD_SIG, DD_SIG, EOCD64_LOCATOR_SIG, EOCD64_SIG, EOCD_SIG, LFH_SIG};
use std::io::{Read, Write};

/// General purpose flag bit 3: sizes and crc follow the payload in a data
/// descriptor instead of being present in the header.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose flag bit 11: the file name is UTF-8.
pub const FLAG_UTF8_NAME: u16 = 1 << 11;

/// Header id of the zip64 extended-information extra field.
pub const EXTRA_ZIP64: u16 = 0x0001;

/// Saturation value for 32-bit size and offset fields.
pub const ZIP64_SIZE_CAP: u64 = u32::MAX as u64;
/// Saturation value for 16-bit record counts.
pub const ZIP64_RECORD_CAP: u64 = u16::MAX as u64;

pub const BASE_VERSION: u16 = 20;
pub const ZIP64_VERSION: u16 = 45;

/// Fixed part of the zip64 end record that its own size field counts.
const EOCD64_FIXED_REMAINDER: u64 = 44;

/// The compression methods the format names. Only [`Stored`] and
/// [`Deflate`] have codecs here; the rest parse but cannot be decoded.
///
/// [`Stored`]: CompressionMethod::Stored
/// [`Deflate`]: CompressionMethod::Deflate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Deflate64,
    Bzip2,
    Lzma,
    Zstd,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            9 => CompressionMethod::Deflate64,
            12 => CompressionMethod::Bzip2,
            14 => CompressionMethod::Lzma,
            93 => CompressionMethod::Zstd,
            other => CompressionMethod::Unknown(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Deflate64 => 9,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Lzma => 14,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Describes a file in the zip archive, as written immediately before its
/// payload.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    /// The zip version needed to extract the file.
    pub version_needed: u16,
    /// The general purpose flags that are set for the file.
    pub flags: u16,
    /// The compression method used for the file.
    pub compression: CompressionMethod,
    /// The last modified time of the file, in DOS format.
    pub last_mod_time: u16,
    /// The last modified date of the file, in DOS format.
    pub last_mod_date: u16,
    /// The crc32 checksum of the file.
    pub crc32: u32,
    /// The size of the file after compression.
    pub compressed_size: u64,
    /// The size of the file before compression.
    pub uncompressed_size: u64,
    /// The filename of the file.
    pub file_name: String,
    /// The extra field of the file, minus the zip64 field managed here.
    pub extra_field: Vec<u8>,
    /// Whether the entry carries the zip64 extended-information field.
    pub zip64: bool,
}

impl LocalFileHeader {
    pub fn builder<S: Into<String>>(file_name: S) -> LocalFileHeaderBuilder {
        LocalFileHeaderBuilder {
            file_name: file_name.into(),
            compression: CompressionMethod::Stored,
            last_mod_time: 0,
            last_mod_date: 0,
            extra_field: Vec::new(),
            zip64: false,
        }
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/')
    }

    /// Last modification date as `(year, month, day)`.
    pub fn mod_date(&self) -> (u16, u8, u8) {
        dos_date(self.last_mod_date)
    }

    /// Last modification time as `(hour, minute, second)`.
    pub fn mod_time(&self) -> (u8, u8, u8) {
        dos_time(self.last_mod_time)
    }

    /// Parses the header, the signature having already been consumed.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let version_needed = binio::read_u16(r)?;
        let flags = binio::read_u16(r)?;
        let compression = CompressionMethod::from_u16(binio::read_u16(r)?);
        let last_mod_time = binio::read_u16(r)?;
        let last_mod_date = binio::read_u16(r)?;
        let crc32 = binio::read_u32(r)?;
        let mut compressed_size = binio::read_u32(r)? as u64;
        let mut uncompressed_size = binio::read_u32(r)? as u64;
        let fname_len = binio::read_u16(r)? as usize;
        let extra_len = binio::read_u16(r)? as usize;
        let file_name = String::from_utf8(binio::read_exact_vec(r, fname_len)?)
            .map_err(|_| ZipError::InvalidEntry("file name is not valid UTF-8".into()))?;
        let extra = binio::read_exact_vec(r, extra_len)?;
        let (extra_field, zip64) =
            take_zip64_extra(extra, &mut uncompressed_size, &mut compressed_size, None);

        Ok(LocalFileHeader {
            version_needed,
            flags,
            compression,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra_field,
            zip64,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        binio::write_u32(w, LFH_SIG)?;
        binio::write_u16(w, self.version_needed)?;
        binio::write_u16(w, self.flags)?;
        binio::write_u16(w, self.compression.as_u16())?;
        binio::write_u16(w, self.last_mod_time)?;
        binio::write_u16(w, self.last_mod_date)?;
        binio::write_u32(w, self.crc32)?;
        if self.zip64 {
            binio::write_u32(w, u32::MAX)?;
            binio::write_u32(w, u32::MAX)?;
        } else {
            binio::write_u32(w, self.compressed_size as u32)?;
            binio::write_u32(w, self.uncompressed_size as u32)?;
        }
        let zip64_extra_len = if self.zip64 { 20 } else { 0 };
        binio::write_u16(w, self.file_name.len() as u16)?;
        binio::write_u16(w, (self.extra_field.len() + zip64_extra_len) as u16)?;
        w.write_all(self.file_name.as_bytes())?;
        if self.zip64 {
            // Full-width sizes live here; the fixed fields above are saturated.
            binio::write_u16(w, EXTRA_ZIP64)?;
            binio::write_u16(w, 16)?;
            binio::write_u64(w, self.uncompressed_size)?;
            binio::write_u64(w, self.compressed_size)?;
        }
        w.write_all(&self.extra_field)?;
        Ok(())
    }
}

/// Builds the immutable header template handed to
/// [`ZipWriter::begin_entry`](crate::writer::ZipWriter::begin_entry).
pub struct LocalFileHeaderBuilder {
    file_name: String,
    compression: CompressionMethod,
    last_mod_time: u16,
    last_mod_date: u16,
    extra_field: Vec<u8>,
    zip64: bool,
}

impl LocalFileHeaderBuilder {
    pub fn compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Sets the modification timestamp, in DOS time and date format.
    pub fn last_modified(mut self, time: u16, date: u16) -> Self {
        self.last_mod_time = time;
        self.last_mod_date = date;
        self
    }

    /// Attaches a caller-supplied extra field, appended after any zip64
    /// field the writer manages itself.
    pub fn extra_field(mut self, extra: Vec<u8>) -> Self {
        self.extra_field = extra;
        self
    }

    /// Marks the entry as zip64. Required up front for streamed entries
    /// that may grow past 4 GiB; buffered entries promote on their own.
    pub fn zip64(mut self, zip64: bool) -> Self {
        self.zip64 = zip64;
        self
    }

    pub fn build(self) -> LocalFileHeader {
        let mut flags = 0u16;
        if !self.file_name.is_ascii() {
            flags |= FLAG_UTF8_NAME;
        }
        LocalFileHeader {
            version_needed: if self.zip64 { ZIP64_VERSION } else { BASE_VERSION },
            flags,
            compression: self.compression,
            last_mod_time: self.last_mod_time,
            last_mod_date: self.last_mod_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name: self.file_name,
            extra_field: self.extra_field,
            zip64: self.zip64,
        }
    }
}

/// This comes after the file data if bit 3 in the flags field is set.
/// It carries the crc32 and both sizes when they were unknown at the time
/// the header was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Parses a descriptor. The leading magic is optional in the wild: if
    /// the first word is not the magic, it is the checksum itself.
    pub fn read_from<R: Read>(r: &mut R, zip64: bool) -> Result<Self> {
        let first = binio::read_u32(r)?;
        let crc32 = if first == DD_SIG {
            binio::read_u32(r)?
        } else {
            first
        };
        let (compressed_size, uncompressed_size) = if zip64 {
            (binio::read_u64(r)?, binio::read_u64(r)?)
        } else {
            (binio::read_u32(r)? as u64, binio::read_u32(r)? as u64)
        };
        Ok(DataDescriptor {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W, zip64: bool) -> Result<()> {
        binio::write_u32(w, DD_SIG)?;
        binio::write_u32(w, self.crc32)?;
        if zip64 {
            binio::write_u64(w, self.compressed_size)?;
            binio::write_u64(w, self.uncompressed_size)?;
        } else {
            binio::write_u32(w, self.compressed_size as u32)?;
            binio::write_u32(w, self.uncompressed_size as u32)?;
        }
        Ok(())
    }
}

/// Catalog record for one file. Due to the way the zip format is designed,
/// these are all written together near the end of the archive.
#[derive(Debug, Clone)]
pub struct CentralDirectory {
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub flags: u16,
    pub compression: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_name: String,
    pub extra_field: Vec<u8>,
    pub file_comment: Vec<u8>,
    pub disk_number_start: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub local_header_offset: u64,
}

impl CentralDirectory {
    /// Catalog record for a finished entry whose local header sits at
    /// `offset`.
    pub fn from_header(header: &LocalFileHeader, offset: u64) -> Self {
        CentralDirectory {
            version_made_by: header.version_needed,
            version_needed_to_extract: header.version_needed,
            flags: header.flags,
            compression: header.compression,
            last_mod_time: header.last_mod_time,
            last_mod_date: header.last_mod_date,
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            file_name: header.file_name.clone(),
            extra_field: header.extra_field.clone(),
            file_comment: Vec::new(),
            disk_number_start: 0,
            internal_file_attributes: 0,
            external_file_attributes: 0,
            local_header_offset: offset,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/')
    }

    pub fn mod_date(&self) -> (u16, u8, u8) {
        dos_date(self.last_mod_date)
    }

    pub fn mod_time(&self) -> (u8, u8, u8) {
        dos_time(self.last_mod_time)
    }

    fn needs_zip64(&self) -> bool {
        self.compressed_size >= ZIP64_SIZE_CAP
            || self.uncompressed_size >= ZIP64_SIZE_CAP
            || self.local_header_offset >= ZIP64_SIZE_CAP
    }

    /// Parses an entry, the signature having already been consumed.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let version_made_by = binio::read_u16(r)?;
        let version_needed_to_extract = binio::read_u16(r)?;
        let flags = binio::read_u16(r)?;
        let compression = CompressionMethod::from_u16(binio::read_u16(r)?);
        let last_mod_time = binio::read_u16(r)?;
        let last_mod_date = binio::read_u16(r)?;
        let crc32 = binio::read_u32(r)?;
        let mut compressed_size = binio::read_u32(r)? as u64;
        let mut uncompressed_size = binio::read_u32(r)? as u64;
        let fname_len = binio::read_u16(r)? as usize;
        let extra_len = binio::read_u16(r)? as usize;
        let comment_len = binio::read_u16(r)? as usize;
        let disk_number_start = binio::read_u16(r)?;
        let internal_file_attributes = binio::read_u16(r)?;
        let external_file_attributes = binio::read_u32(r)?;
        let mut local_header_offset = binio::read_u32(r)? as u64;
        let file_name = String::from_utf8(binio::read_exact_vec(r, fname_len)?)
            .map_err(|_| ZipError::InvalidEntry("file name is not valid UTF-8".into()))?;
        let extra = binio::read_exact_vec(r, extra_len)?;
        let file_comment = binio::read_exact_vec(r, comment_len)?;
        let (extra_field, _) = take_zip64_extra(
            extra,
            &mut uncompressed_size,
            &mut compressed_size,
            Some(&mut local_header_offset),
        );

        Ok(CentralDirectory {
            version_made_by,
            version_needed_to_extract,
            flags,
            compression,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra_field,
            file_comment,
            disk_number_start,
            internal_file_attributes,
            external_file_attributes,
            local_header_offset,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        // Saturated fields spill their real values into the zip64 extra
        // field, in the order the format fixes for them.
        let mut zip64_extra = Vec::new();
        if self.needs_zip64() {
            let mut body = Vec::new();
            if self.uncompressed_size >= ZIP64_SIZE_CAP {
                binio::write_u64(&mut body, self.uncompressed_size)?;
            }
            if self.compressed_size >= ZIP64_SIZE_CAP {
                binio::write_u64(&mut body, self.compressed_size)?;
            }
            if self.local_header_offset >= ZIP64_SIZE_CAP {
                binio::write_u64(&mut body, self.local_header_offset)?;
            }
            binio::write_u16(&mut zip64_extra, EXTRA_ZIP64)?;
            binio::write_u16(&mut zip64_extra, body.len() as u16)?;
            zip64_extra.extend_from_slice(&body);
        }

        binio::write_u32(w, CD_SIG)?;
        binio::write_u16(w, self.version_made_by)?;
        binio::write_u16(w, self.version_needed_to_extract)?;
        binio::write_u16(w, self.flags)?;
        binio::write_u16(w, self.compression.as_u16())?;
        binio::write_u16(w, self.last_mod_time)?;
        binio::write_u16(w, self.last_mod_date)?;
        binio::write_u32(w, self.crc32)?;
        binio::write_u32(w, self.compressed_size.min(ZIP64_SIZE_CAP) as u32)?;
        binio::write_u32(w, self.uncompressed_size.min(ZIP64_SIZE_CAP) as u32)?;
        binio::write_u16(w, self.file_name.len() as u16)?;
        binio::write_u16(w, (zip64_extra.len() + self.extra_field.len()) as u16)?;
        binio::write_u16(w, self.file_comment.len() as u16)?;
        binio::write_u16(w, self.disk_number_start)?;
        binio::write_u16(w, self.internal_file_attributes)?;
        binio::write_u32(w, self.external_file_attributes)?;
        binio::write_u32(w, self.local_header_offset.min(ZIP64_SIZE_CAP) as u32)?;
        w.write_all(self.file_name.as_bytes())?;
        w.write_all(&zip64_extra)?;
        w.write_all(&self.extra_field)?;
        w.write_all(&self.file_comment)?;
        Ok(())
    }
}

/// Very last record in a zip archive; tells the reader where the central
/// directory is.
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub number_of_central_directory_records_on_this_disk: u16,
    pub total_number_of_central_directory_records: u16,
    pub size_of_central_directory: u32,
    pub offset_of_start_of_central_directory: u32,
    pub zip_file_comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// True when any field is saturated and the real values live in the
    /// zip64 end record.
    pub fn is_zip64(&self) -> bool {
        self.number_of_central_directory_records_on_this_disk == u16::MAX
            || self.total_number_of_central_directory_records == u16::MAX
            || self.size_of_central_directory == u32::MAX
            || self.offset_of_start_of_central_directory == u32::MAX
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        Ok(EndOfCentralDirectory {
            disk_number: binio::read_u16(r)?,
            disk_with_central_directory: binio::read_u16(r)?,
            number_of_central_directory_records_on_this_disk: binio::read_u16(r)?,
            total_number_of_central_directory_records: binio::read_u16(r)?,
            size_of_central_directory: binio::read_u32(r)?,
            offset_of_start_of_central_directory: binio::read_u32(r)?,
            zip_file_comment: binio::read_block16(r)?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        binio::write_u32(w, EOCD_SIG)?;
        binio::write_u16(w, self.disk_number)?;
        binio::write_u16(w, self.disk_with_central_directory)?;
        binio::write_u16(w, self.number_of_central_directory_records_on_this_disk)?;
        binio::write_u16(w, self.total_number_of_central_directory_records)?;
        binio::write_u32(w, self.size_of_central_directory)?;
        binio::write_u32(w, self.offset_of_start_of_central_directory)?;
        binio::write_block16(w, &self.zip_file_comment)?;
        Ok(())
    }
}

/// 64-bit form of the end record, written before the locator and the
/// legacy record whenever a count, size or offset overflows.
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory64 {
    pub size_of_end_of_central_directory: u64,
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub disk_number: u32,
    pub first_disk: u32,
    pub number_of_central_directory_records_on_this_disk: u64,
    pub total_number_of_central_directory_records: u64,
    pub size_of_central_directory: u64,
    pub offset_of_start_of_central_directory: u64,
    /// From offset 56 up to size_of_end_of_central_directory.
    pub extensible_data_sector: Vec<u8>,
}

impl EndOfCentralDirectory64 {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let size_of_end_of_central_directory = binio::read_u64(r)?;
        let version_made_by = binio::read_u16(r)?;
        let version_needed_to_extract = binio::read_u16(r)?;
        let disk_number = binio::read_u32(r)?;
        let first_disk = binio::read_u32(r)?;
        let number_of_central_directory_records_on_this_disk = binio::read_u64(r)?;
        let total_number_of_central_directory_records = binio::read_u64(r)?;
        let size_of_central_directory = binio::read_u64(r)?;
        let offset_of_start_of_central_directory = binio::read_u64(r)?;
        let ext_len = size_of_end_of_central_directory
            .checked_sub(EOCD64_FIXED_REMAINDER)
            .ok_or_else(|| {
                ZipError::InvalidEntry("zip64 end record size is shorter than its fixed part".into())
            })?;
        let extensible_data_sector = binio::read_exact_vec(r, ext_len as usize)?;

        Ok(EndOfCentralDirectory64 {
            size_of_end_of_central_directory,
            version_made_by,
            version_needed_to_extract,
            disk_number,
            first_disk,
            number_of_central_directory_records_on_this_disk,
            total_number_of_central_directory_records,
            size_of_central_directory,
            offset_of_start_of_central_directory,
            extensible_data_sector,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        binio::write_u32(w, EOCD64_SIG)?;
        binio::write_u64(
            w,
            EOCD64_FIXED_REMAINDER + self.extensible_data_sector.len() as u64,
        )?;
        binio::write_u16(w, self.version_made_by)?;
        binio::write_u16(w, self.version_needed_to_extract)?;
        binio::write_u32(w, self.disk_number)?;
        binio::write_u32(w, self.first_disk)?;
        binio::write_u64(w, self.number_of_central_directory_records_on_this_disk)?;
        binio::write_u64(w, self.total_number_of_central_directory_records)?;
        binio::write_u64(w, self.size_of_central_directory)?;
        binio::write_u64(w, self.offset_of_start_of_central_directory)?;
        w.write_all(&self.extensible_data_sector)?;
        Ok(())
    }
}

/// Points backwards at the zip64 end record; sits between it and the
/// legacy end record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64Locator {
    pub first_disk: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64Locator {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Zip64Locator {
            first_disk: binio::read_u32(r)?,
            eocd64_offset: binio::read_u64(r)?,
            total_disks: binio::read_u32(r)?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        binio::write_u32(w, EOCD64_LOCATOR_SIG)?;
        binio::write_u32(w, self.first_disk)?;
        binio::write_u64(w, self.eocd64_offset)?;
        binio::write_u32(w, self.total_disks)?;
        Ok(())
    }
}

fn dos_date(date: u16) -> (u16, u8, u8) {
    let day = (date & 0x1F) as u8;
    let month = ((date >> 5) & 0x0F) as u8;
    let year = ((date >> 9) & 0x7F) + 1980;
    (year, month, day)
}

fn dos_time(time: u16) -> (u8, u8, u8) {
    let second = ((time & 0x1F) * 2) as u8;
    let minute = ((time >> 5) & 0x3F) as u8;
    let hour = ((time >> 11) & 0x1F) as u8;
    (hour, minute, second)
}

/// Splits the zip64 extended-information field out of a raw extra block.
/// Saturated counters are replaced with the full-width values from the
/// field; everything else in the block is returned untouched. The second
/// part of the return value says whether the field was present at all.
fn take_zip64_extra(
    extra: Vec<u8>,
    uncompressed_size: &mut u64,
    compressed_size: &mut u64,
    mut local_header_offset: Option<&mut u64>,
) -> (Vec<u8>, bool) {
    let mut rest = Vec::with_capacity(extra.len());
    let mut found = false;
    let mut i = 0usize;
    while i + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[i], extra[i + 1]]);
        let len = u16::from_le_bytes([extra[i + 2], extra[i + 3]]) as usize;
        let end = (i + 4 + len).min(extra.len());
        if id == EXTRA_ZIP64 {
            found = true;
            let mut p = i + 4;
            let mut next = |p: &mut usize| -> Option<u64> {
                if *p + 8 <= end {
                    let mut v = [0u8; 8];
                    v.copy_from_slice(&extra[*p..*p + 8]);
                    *p += 8;
                    Some(u64::from_le_bytes(v))
                } else {
                    None
                }
            };
            // A field is only present for counters saturated in the fixed
            // record, in this fixed order.
            if *uncompressed_size == ZIP64_SIZE_CAP {
                if let Some(v) = next(&mut p) {
                    *uncompressed_size = v;
                }
            }
            if *compressed_size == ZIP64_SIZE_CAP {
                if let Some(v) = next(&mut p) {
                    *compressed_size = v;
                }
            }
            if let Some(offset) = local_header_offset.as_deref_mut() {
                if *offset == ZIP64_SIZE_CAP {
                    if let Some(v) = next(&mut p) {
                        *offset = v;
                    }
                }
            }
        } else {
            rest.extend_from_slice(&extra[i..end]);
        }
        i += 4 + len;
    }
    // A trailing fragment shorter than a field header is kept as-is.
    if i < extra.len() {
        rest.extend_from_slice(&extra[i..]);
    }
    (rest, found)
}
