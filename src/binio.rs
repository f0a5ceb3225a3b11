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

//! Little-endian field primitives shared by every record codec.
//!
//! All zip integers are little-endian. A short read of any fixed-width field
//! or counted block is a truncated archive, reported as
//! [`ZipError::UnexpectedEof`] so callers can tell it apart from transport
//! failures.

use crate::{Result, ZipError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

fn map_eof(e: std::io::Error) -> ZipError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ZipError::UnexpectedEof
    } else {
        ZipError::IOError(e)
    }
}

pub fn read_u16<R: Read>(r: &mut R) -> Result<u16> {
    r.read_u16::<LittleEndian>().map_err(map_eof)
}

pub fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    r.read_u32::<LittleEndian>().map_err(map_eof)
}

pub fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    r.read_u64::<LittleEndian>().map_err(map_eof)
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> Result<()> {
    w.write_u16::<LittleEndian>(v)?;
    Ok(())
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_u32::<LittleEndian>(v)?;
    Ok(())
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    w.write_u64::<LittleEndian>(v)?;
    Ok(())
}

/// Reads exactly `len` bytes, failing on a short stream.
pub fn read_exact_vec<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(map_eof)?;
    Ok(buf)
}

/// Reads a `u16` length prefix followed by that many bytes.
pub fn read_block16<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_u16(r)? as usize;
    read_exact_vec(r, len)
}

/// Writes a `u16` length prefix followed by the block itself. The caller is
/// responsible for having checked that the block fits the prefix.
pub fn write_block16<W: Write>(w: &mut W, block: &[u8]) -> Result<()> {
    write_u16(w, block.len() as u16)?;
    w.write_all(block)?;
    Ok(())
}
