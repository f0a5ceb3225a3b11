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

//! A byte source that can take back what it just handed out.
//!
//! DEFLATE payloads carry no length up front, so a streaming decoder only
//! learns where a payload ends by reading past it. [`RewindReader`] keeps a
//! window of recently delivered bytes and lets the container push the
//! overshoot back, so the record that follows the payload is parsed from the
//! same forward-only stream as if nothing had been over-read. The same
//! mechanism un-reads boundary signatures (central directory, end record)
//! so the next parser can consume them cleanly.

use crate::{Result, ZipError};
use std::io::{self, Read};

/// Delivered bytes retained for replay, beyond the most recent read. Covers
/// a full decoder input chunk plus a descriptor and a signature.
const RETAIN: usize = 1024;

/// Wraps a [`Read`] source with a bounded pushback window.
///
/// `read` replays pending pushback before touching the wrapped source, and
/// performs at most one physical read per call. [`RewindReader::rewind`]
/// un-reads the trailing `n` delivered bytes; it is guaranteed to cover at
/// least the most recent physical read, which is all the container protocol
/// ever needs.
pub struct RewindReader<R> {
    inner: R,
    /// Retained delivered bytes, followed by any pending pushback.
    window: Vec<u8>,
    /// Split point: `window[..pos]` was delivered, `window[pos..]` replays next.
    pos: usize,
    /// Length of the most recent physical read; never trimmed out of the window.
    last_read: usize,
}

impl<R: Read> RewindReader<R> {
    pub fn new(inner: R) -> Self {
        RewindReader {
            inner,
            window: Vec::new(),
            pos: 0,
            last_read: 0,
        }
    }

    /// Marks the trailing `n` delivered bytes as unread, to be replayed by
    /// the next reads. Rewinding more than was delivered (or further back
    /// than the retained window) is a caller bug, not a data error.
    pub fn rewind(&mut self, n: usize) -> Result<()> {
        if n > self.pos {
            return Err(ZipError::InvalidRewind {
                requested: n,
                available: self.pos,
            });
        }
        self.pos -= n;
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Drops delivered history that no rewind can reach anymore.
    fn trim(&mut self) {
        let keep = self.last_read.max(RETAIN);
        if self.pos > keep {
            let cut = self.pos - keep;
            self.window.drain(..cut);
            self.pos -= cut;
        }
    }
}

impl<R: Read> Read for RewindReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos < self.window.len() {
            let n = (self.window.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.window[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        let n = self.inner.read(buf)?;
        self.window.extend_from_slice(&buf[..n]);
        self.pos = self.window.len();
        self.last_read = n;
        self.trim();
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_rewind_replays_tail_of_last_read() {
        let mut src = RewindReader::new(Cursor::new(vec![1u8, 2, 3, 4, 5, 6, 7, 8]));
        let mut one = [0u8; 1];
        let mut four = [0u8; 4];

        assert_eq!(src.read(&mut one).unwrap(), 1);
        assert_eq!(one, [1]);
        assert_eq!(src.read(&mut four).unwrap(), 4);
        assert_eq!(four, [2, 3, 4, 5]);

        src.rewind(2).unwrap();

        // The replay comes first, then the stream continues where it left off.
        assert_eq!(src.read(&mut four).unwrap(), 2);
        assert_eq!(&four[..2], [4, 5]);
        assert_eq!(src.read(&mut four).unwrap(), 3);
        assert_eq!(&four[..3], [6, 7, 8]);
        assert_eq!(src.read(&mut four).unwrap(), 0);
    }

    #[test]
    fn test_rewind_beyond_delivered_bytes_fails() {
        let mut src = RewindReader::new(Cursor::new(vec![1u8, 2, 3]));
        let mut buf = [0u8; 3];
        assert_eq!(src.read(&mut buf).unwrap(), 3);
        assert_eq!(
            src.rewind(4).unwrap_err(),
            ZipError::InvalidRewind {
                requested: 4,
                available: 3
            }
        );
        // The failed rewind must not have moved anything.
        src.rewind(3).unwrap();
        assert_eq!(src.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_rewind_spanning_a_replay_boundary() {
        // A signature can straddle the end of a pushback region and the next
        // physical read; rewinding it must still work.
        let mut src = RewindReader::new(Cursor::new(vec![10u8, 11, 12, 13, 14, 15]));
        let mut buf = [0u8; 4];
        assert_eq!(src.read(&mut buf).unwrap(), 4);
        src.rewind(2).unwrap();

        let mut sig = [0u8; 4];
        src.read_exact(&mut sig).unwrap();
        assert_eq!(sig, [12, 13, 14, 15]);
        src.rewind(4).unwrap();
        src.read_exact(&mut sig).unwrap();
        assert_eq!(sig, [12, 13, 14, 15]);
    }

    #[test]
    fn test_zero_rewind_is_a_no_op() {
        let mut src = RewindReader::new(Cursor::new(vec![1u8, 2]));
        let mut buf = [0u8; 2];
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        src.rewind(0).unwrap();
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }
}
