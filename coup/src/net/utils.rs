use std::io::{self, Read, Write};

/// Maximum unterminated text buffered for one frame (64KiB) to prevent DoS
/// attacks via unbounded allocation.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// Splits a byte stream into newline-terminated frames.
///
/// A frame is every complete line available after a read; the bytes after
/// the last newline stay buffered until the rest of their line arrives.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Block until at least one complete line is buffered and return all
    /// complete lines. Returns `None` on a clean EOF. A partial line left at
    /// EOF is returned as a final frame.
    pub fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut chunk = [0; READ_CHUNK];
        loop {
            if let Some(pos) = self.buf.iter().rposition(|b| *b == b'\n') {
                let rest = self.buf.split_off(pos + 1);
                return Ok(Some(std::mem::replace(&mut self.buf, rest)));
            }
            if self.buf.len() > MAX_FRAME_SIZE {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "frame exceeds maximum allowed size of {MAX_FRAME_SIZE} bytes"
                    ),
                ));
            }
            match self.reader.read(&mut chunk) {
                Ok(0) if self.buf.is_empty() => return Ok(None),
                Ok(0) => return Ok(Some(std::mem::take(&mut self.buf))),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error),
            }
        }
    }
}

/// Write `frame` as one newline-terminated chunk and flush it.
pub fn write_frame<W: Write>(writer: &mut W, frame: &str) -> io::Result<()> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "frame size {} exceeds maximum allowed size of {MAX_FRAME_SIZE} bytes",
                frame.len()
            ),
        ));
    }
    // One write per frame so concurrent readers never see half a line
    // followed by someone else's.
    let mut buf = Vec::with_capacity(frame.len() + 1);
    buf.extend_from_slice(frame.as_bytes());
    if !frame.ends_with('\n') {
        buf.push(b'\n');
    }
    writer.write_all(&buf)?;
    writer.flush()
}
