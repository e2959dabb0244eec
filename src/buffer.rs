//! Per-connection line accumulation.
//!
//! Bytes arrive in arbitrarily sized chunks. `LineBuffer` keeps exactly the
//! unterminated suffix between reads, so a command line may span any number
//! of reads and is handed out once, in order, as soon as its `\n` arrives.
//! The line length limit applies the same way whether a line arrives in one
//! read or in many.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Initial read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// A line, terminated or not, grew past the configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Accumulates raw bytes and splits them into `\n`-terminated lines.
#[derive(Debug)]
pub struct LineBuffer {
    buffer: BytesMut,
    /// Bytes at the front of `buffer` already known to contain no `\n`
    scanned: usize,
    max_line_length: usize,
}

impl LineBuffer {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            scanned: 0,
            max_line_length,
        }
    }

    /// Read one chunk from `reader` and append it.
    ///
    /// Returns the number of bytes read; `0` means end of stream.
    pub async fn read_from<R>(&mut self, reader: &mut R) -> std::io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        if self.buffer.capacity() - self.buffer.len() < BUFFER_SIZE / 4 {
            self.buffer.reserve(BUFFER_SIZE);
        }
        reader.read_buf(&mut self.buffer).await
    }

    /// Remove and return the next complete line, without its terminator.
    ///
    /// A `\r` directly before the `\n` is stripped as well. Fails once the
    /// line in front, counted up to but excluding the `\n`, is longer than
    /// `max_line_length`, whether or not its terminator has arrived yet.
    pub fn next_line(&mut self) -> Result<Option<Bytes>, LineTooLong> {
        let offset = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == b'\n');

        let Some(offset) = offset else {
            self.scanned = self.buffer.len();
            return self.check_length(self.buffer.len()).map(|()| None);
        };

        let end = self.scanned + offset;
        self.check_length(end)?;

        let mut line = self.buffer.split_to(end + 1);
        self.scanned = 0;

        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }
        Ok(Some(line.freeze()))
    }

    fn check_length(&self, len: usize) -> Result<(), LineTooLong> {
        if len > self.max_line_length {
            return Err(LineTooLong {
                limit: self.max_line_length,
            });
        }
        Ok(())
    }

    /// Number of buffered bytes not yet terminated by `\n`.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
