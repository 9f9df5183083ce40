//! Send and receive whole frames over a byte stream with full-buffer
//! read/write discipline: every operation transfers exactly the expected
//! byte count or fails, a short transfer is never surfaced to a caller.

use std::io::{self, Read, Write};

use crate::{
    error::{ProtocolError, Result},
    header::Header,
};

/// Construct a header, write it in full, then write exactly
/// `payload.len()` bytes. Returns the total bytes written.
pub fn send_message<W: Write>(
    writer: &mut W,
    message_type: u16,
    payload: &[u8],
    session_token: &[u8],
) -> Result<usize> {
    let header = Header::build(
        message_type,
        u32::try_from(payload.len()).unwrap_or(u32::MAX),
        session_token,
    );

    write_all(writer, &header.to_bytes())
        .map_err(|e| ProtocolError::HeaderWriteFailed(e.to_string()))?;
    write_all(writer, payload).map_err(|e| ProtocolError::PayloadWriteFailed(e.to_string()))?;

    Ok(Header::SIZE + payload.len())
}

/// Read exactly [`Header::SIZE`] bytes, validate, then read exactly
/// `payload_length` bytes into a freshly allocated buffer. A trailing NUL
/// byte is appended past the logical length as a convenience for text
/// payloads; callers must trust the returned length (see
/// [`ReceivedFrame::payload`]), never search for the sentinel.
pub fn receive_message<R: Read>(
    reader: &mut R,
    max_payload_capacity: usize,
) -> Result<ReceivedFrame> {
    let mut header_bytes = [0u8; Header::SIZE];
    read_exact_or_peer_closed(reader, &mut header_bytes).map_err(|e| {
        ProtocolError::HeaderReadFailed { kind: e.kind(), message: e.to_string() }
    })?;

    let header = *Header::ref_from_bytes(&header_bytes);
    header.validate()?;

    let payload_length = header.payload_length() as usize;
    if payload_length > max_payload_capacity {
        return Err(ProtocolError::BufferTooSmall {
            needed: payload_length + 1,
            capacity: max_payload_capacity,
        });
    }

    let mut payload = vec![0u8; payload_length + 1];
    read_exact_or_peer_closed(reader, &mut payload[..payload_length]).map_err(|e| {
        ProtocolError::PayloadReadFailed { kind: e.kind(), message: e.to_string() }
    })?;
    payload[payload_length] = 0;

    Ok(ReceivedFrame { header, payload, payload_length })
}

/// A frame read off the wire: a validated header and its payload buffer.
pub struct ReceivedFrame {
    header: Header,
    payload: Vec<u8>,
    payload_length: usize,
}

impl ReceivedFrame {
    /// The frame's validated header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The logical payload, excluding the trailing NUL sentinel.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_length]
    }
}

fn write_all<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        let n = writer.write(&buf[written..])?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed during write"));
        }
        written += n;
    }
    Ok(())
}

fn read_exact_or_peer_closed<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut read = 0;
    while read < buf.len() {
        let n = reader.read(&mut buf[read..])?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed during read"));
        }
        read += n;
    }
    Ok(())
}
