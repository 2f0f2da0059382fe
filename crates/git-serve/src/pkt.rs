//! pkt-line encode/decode.
//!
//! Every unit on the wire is a four digit hex length (header included)
//! followed by the payload. `0000` is a flush and `0001` a delimiter.

use std::io::{ErrorKind, Read, Write};

use crate::errors::ServeError;

pub const PKT_FLUSH: &[u8] = b"0000";

pub const PKT_DELIM: &[u8] = b"0001";

/// Largest packet git will send or accept, header included.
pub const MAX_PKT_LEN: usize = 65520;

pub const MAX_PKT_DATA: usize = MAX_PKT_LEN - 4;

/// One protocol unit as seen by the request state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Text line with a single trailing newline removed.
    Line(String),
    Delimiter,
    Flush,
    /// The input ended cleanly on a packet boundary.
    Eof,
}

pub fn encode_pkt_line(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    let len = 4 + data.len();
    out.extend_from_slice(format!("{len:04x}").as_bytes());
    out.extend_from_slice(data);
    out
}

pub fn write_pkt_line<W: Write + ?Sized>(out: &mut W, data: &[u8]) -> Result<(), ServeError> {
    if data.len() > MAX_PKT_DATA {
        return Err(ServeError::PacketTooLong(data.len()));
    }
    out.write_all(&encode_pkt_line(data))?;
    Ok(())
}

pub fn write_flush<W: Write + ?Sized>(out: &mut W) -> Result<(), ServeError> {
    out.write_all(PKT_FLUSH)?;
    Ok(())
}

pub fn write_delim<W: Write + ?Sized>(out: &mut W) -> Result<(), ServeError> {
    out.write_all(PKT_DELIM)?;
    Ok(())
}

/// Blocking reader yielding one [`Packet`] per call.
pub struct PacketReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: Read> PacketReader<R> {
    pub fn new(inner: R) -> Self {
        PacketReader { inner, buf: Vec::with_capacity(1024) }
    }

    pub fn read(&mut self) -> Result<Packet, ServeError> {
        let mut header = [0u8; 4];
        match read_full(&mut self.inner, &mut header)? {
            0 => return Ok(Packet::Eof),
            4 => {}
            _ => return Err(ServeError::Protocol("truncated pkt-line length".into())),
        }

        let len = parse_len(&header)?;
        match len {
            0 => return Ok(Packet::Flush),
            1 => return Ok(Packet::Delimiter),
            2..=3 => return Err(ServeError::Protocol(format!("bad line length {len}"))),
            _ if len > MAX_PKT_LEN => {
                return Err(ServeError::Protocol(format!("bad line length {len}")));
            }
            _ => {}
        }

        let data_len = len - 4;
        self.buf.resize(data_len, 0);
        if read_full(&mut self.inner, &mut self.buf)? != data_len {
            return Err(ServeError::Protocol("truncated pkt-line data".into()));
        }

        let data = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf[..]);
        let line = std::str::from_utf8(data)
            .map_err(|_| ServeError::Protocol("pkt-line is not valid UTF-8".into()))?;
        Ok(Packet::Line(line.to_owned()))
    }
}

fn parse_len(header: &[u8; 4]) -> Result<usize, ServeError> {
    std::str::from_utf8(header)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_hexdigit()))
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .ok_or_else(|| {
            ServeError::Protocol(format!(
                "invalid pkt-line length header {:?}",
                String::from_utf8_lossy(header)
            ))
        })
}

// Fills `buf` unless the input ends first; returns how many bytes arrived.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ServeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
