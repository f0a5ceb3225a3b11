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

//! The stored (method 0) pass-through codec.

use crate::rewind::RewindReader;
use crate::{Result, ZipError};
use std::io::Read;

/// Copies exactly the declared compressed size out of the source. Because
/// the length is known up front it never reads ahead, so there is never
/// anything to rewind.
pub struct StoredDecoder {
    remaining: u64,
    taken: u64,
}

impl StoredDecoder {
    pub fn new(declared_size: u64) -> Self {
        StoredDecoder {
            remaining: declared_size,
            taken: 0,
        }
    }

    pub fn read<R: Read>(&mut self, src: &mut RewindReader<R>, out: &mut [u8]) -> Result<usize> {
        if self.remaining == 0 || out.is_empty() {
            return Ok(0);
        }
        let want = (out.len() as u64).min(self.remaining) as usize;
        let mut filled = 0;
        while filled < want {
            let n = src.read(&mut out[filled..want])?;
            if n == 0 {
                return Err(ZipError::UnexpectedEof);
            }
            filled += n;
        }
        self.remaining -= filled as u64;
        self.taken += filled as u64;
        Ok(filled)
    }

    pub fn unconsumed(&self) -> usize {
        0
    }

    pub fn compressed_bytes(&self) -> u64 {
        self.taken
    }
}

/// Pass-through encoder; output is input.
pub struct StoredEncoder;

impl StoredEncoder {
    pub fn write(
        &mut self,
        input: &[u8],
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        sink(input)
    }

    pub fn finish(&mut self, _sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decoder_stops_at_declared_size() {
        let mut src = RewindReader::new(Cursor::new(vec![1u8, 2, 3, 4, 5]));
        let mut decoder = StoredDecoder::new(3);
        let mut out = [0u8; 8];
        assert_eq!(decoder.read(&mut src, &mut out).unwrap(), 3);
        assert_eq!(&out[..3], [1, 2, 3]);
        assert_eq!(decoder.read(&mut src, &mut out).unwrap(), 0);
        assert_eq!(decoder.unconsumed(), 0);
        assert_eq!(decoder.compressed_bytes(), 3);

        // The bytes after the payload are untouched.
        let mut tail = [0u8; 2];
        src.read_exact(&mut tail).unwrap();
        assert_eq!(tail, [4, 5]);
    }

    #[test]
    fn test_decoder_reports_truncation() {
        let mut src = RewindReader::new(Cursor::new(vec![1u8, 2]));
        let mut decoder = StoredDecoder::new(5);
        let mut out = [0u8; 8];
        assert_eq!(
            decoder.read(&mut src, &mut out).unwrap_err(),
            ZipError::UnexpectedEof
        );
    }
}
