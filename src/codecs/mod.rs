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

//! Codec adapters between the container protocol and the compression
//! primitives.
//!
//! The container drives a decoder with a pull loop: ask for bytes until the
//! decoder reports end of payload, then rewind the source by however many
//! lookahead bytes the decoder pulled but never consumed. Encoders are
//! push-driven and hand compressed output to a caller-supplied sink, so the
//! same loop works whether the bytes land in a spool buffer or go straight
//! out.

pub mod deflate;
pub mod stored;

use crate::rewind::RewindReader;
use crate::structures::CompressionMethod;
use crate::{Result, ZipError};
use std::io::Read;

/// Decoder for one entry's payload.
pub enum Decoder {
    Stored(stored::StoredDecoder),
    Deflate(deflate::DeflateDecoder),
}

impl Decoder {
    /// Picks the decoder for `method`, failing before anything is built
    /// when the method has no codec here.
    pub fn for_method(method: CompressionMethod, compressed_size: u64) -> Result<Decoder> {
        match method {
            CompressionMethod::Stored => {
                Ok(Decoder::Stored(stored::StoredDecoder::new(compressed_size)))
            }
            CompressionMethod::Deflate => Ok(Decoder::Deflate(deflate::DeflateDecoder::new())),
            other => Err(ZipError::UnsupportedMethod(other.as_u16())),
        }
    }

    /// Pulls the next chunk of decoded bytes into `out`, filling it as far
    /// as the payload allows. `Ok(0)` means end of payload.
    pub fn read<R: Read>(&mut self, src: &mut RewindReader<R>, out: &mut [u8]) -> Result<usize> {
        match self {
            Decoder::Stored(d) => d.read(src, out),
            Decoder::Deflate(d) => d.read(src, out),
        }
    }

    /// Bytes pulled from the source that the codec never consumed; the
    /// caller rewinds the source by exactly this much.
    pub fn unconsumed(&self) -> usize {
        match self {
            Decoder::Stored(d) => d.unconsumed(),
            Decoder::Deflate(d) => d.unconsumed(),
        }
    }

    /// Compressed payload bytes consumed so far.
    pub fn compressed_bytes(&self) -> u64 {
        match self {
            Decoder::Stored(d) => d.compressed_bytes(),
            Decoder::Deflate(d) => d.compressed_bytes(),
        }
    }
}

/// Encoder for one entry's payload.
pub enum Encoder {
    Stored(stored::StoredEncoder),
    Deflate(deflate::DeflateEncoder),
}

impl Encoder {
    pub fn for_method(method: CompressionMethod) -> Result<Encoder> {
        match method {
            CompressionMethod::Stored => Ok(Encoder::Stored(stored::StoredEncoder)),
            CompressionMethod::Deflate => Ok(Encoder::Deflate(deflate::DeflateEncoder::new())),
            other => Err(ZipError::UnsupportedMethod(other.as_u16())),
        }
    }

    /// Feeds `input` through the codec, handing compressed output to `sink`.
    pub fn write(
        &mut self,
        input: &[u8],
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        match self {
            Encoder::Stored(e) => e.write(input, sink),
            Encoder::Deflate(e) => e.write(input, sink),
        }
    }

    /// Signals end of input and drains the codec to completion.
    pub fn finish(&mut self, sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        match self {
            Encoder::Stored(e) => e.finish(sink),
            Encoder::Deflate(e) => e.finish(sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_methods_without_codecs_are_rejected() {
        for method in [
            CompressionMethod::Deflate64,
            CompressionMethod::Bzip2,
            CompressionMethod::Lzma,
            CompressionMethod::Zstd,
            CompressionMethod::Unknown(42),
        ] {
            let id = method.as_u16();
            assert_eq!(
                Decoder::for_method(method, 0).err(),
                Some(ZipError::UnsupportedMethod(id))
            );
            assert_eq!(
                Encoder::for_method(method).err(),
                Some(ZipError::UnsupportedMethod(id))
            );
        }
    }
}
