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

//! The DEFLATE (method 8) codec, over `flate2`'s raw streaming primitives.
//!
//! Zip payloads are raw deflate streams with no zlib framing, so both
//! directions run with the header flag off. The decoder is where the
//! pushback contract is earned: input is pulled in chunks small enough
//! that the overshoot past the end of the stream always fits in the
//! source's replay window, and `total_in` deltas tell us exactly how much
//! of the final chunk the primitive left untouched.

use crate::rewind::RewindReader;
use crate::{Result, ZipError};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::io::Read;

/// One refill of compressed input; a single physical source read, so the
/// unconsumed remainder is always rewindable.
const INPUT_CHUNK: usize = 512;
/// Compressed output is drained to the sink in pieces of this size.
const OUTPUT_CHUNK: usize = 4096;

pub struct DeflateDecoder {
    inflate: Decompress,
    chunk: [u8; INPUT_CHUNK],
    start: usize,
    end: usize,
    done: bool,
    unconsumed: usize,
}

impl DeflateDecoder {
    pub fn new() -> Self {
        DeflateDecoder {
            inflate: Decompress::new(false),
            chunk: [0u8; INPUT_CHUNK],
            start: 0,
            end: 0,
            done: false,
            unconsumed: 0,
        }
    }

    pub fn read<R: Read>(&mut self, src: &mut RewindReader<R>, out: &mut [u8]) -> Result<usize> {
        if self.done || out.is_empty() {
            return Ok(0);
        }
        let mut produced = 0;
        while produced < out.len() {
            if self.start == self.end {
                let n = src.read(&mut self.chunk)?;
                if n == 0 {
                    // The stream ended inside a deflate block.
                    return Err(ZipError::UnexpectedEof);
                }
                self.start = 0;
                self.end = n;
            }
            let before_in = self.inflate.total_in();
            let before_out = self.inflate.total_out();
            let status = self
                .inflate
                .decompress(
                    &self.chunk[self.start..self.end],
                    &mut out[produced..],
                    FlushDecompress::None,
                )
                .map_err(|e| ZipError::CorruptData(e.to_string()))?;
            let consumed = (self.inflate.total_in() - before_in) as usize;
            let emitted = (self.inflate.total_out() - before_out) as usize;
            self.start += consumed;
            produced += emitted;
            match status {
                Status::StreamEnd => {
                    self.done = true;
                    self.unconsumed = self.end - self.start;
                    break;
                }
                // With room in both buffers the primitive must make progress.
                Status::BufError if consumed == 0 && emitted == 0 => {
                    return Err(ZipError::CorruptData("inflate made no progress".into()));
                }
                _ => {}
            }
        }
        Ok(produced)
    }

    pub fn unconsumed(&self) -> usize {
        self.unconsumed
    }

    pub fn compressed_bytes(&self) -> u64 {
        self.inflate.total_in()
    }
}

impl Default for DeflateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DeflateEncoder {
    deflate: Compress,
    out: Vec<u8>,
}

impl DeflateEncoder {
    pub fn new() -> Self {
        DeflateEncoder {
            deflate: Compress::new(Compression::default(), false),
            out: vec![0u8; OUTPUT_CHUNK],
        }
    }

    pub fn write(
        &mut self,
        mut input: &[u8],
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        while !input.is_empty() {
            let before_in = self.deflate.total_in();
            let before_out = self.deflate.total_out();
            self.deflate
                .compress(input, &mut self.out, FlushCompress::None)
                .map_err(|e| ZipError::CorruptData(e.to_string()))?;
            let consumed = (self.deflate.total_in() - before_in) as usize;
            let produced = (self.deflate.total_out() - before_out) as usize;
            input = &input[consumed..];
            if produced > 0 {
                sink(&self.out[..produced])?;
            }
            if consumed == 0 && produced == 0 {
                return Err(ZipError::CorruptData("deflate made no progress".into()));
            }
        }
        Ok(())
    }

    pub fn finish(&mut self, sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        loop {
            let before_out = self.deflate.total_out();
            let status = self
                .deflate
                .compress(&[], &mut self.out, FlushCompress::Finish)
                .map_err(|e| ZipError::CorruptData(e.to_string()))?;
            let produced = (self.deflate.total_out() - before_out) as usize;
            if produced > 0 {
                sink(&self.out[..produced])?;
            }
            if let Status::StreamEnd = status {
                return Ok(());
            }
        }
    }
}

impl Default for DeflateEncoder {
    fn default() -> Self {
        Self::new()
    }
}
