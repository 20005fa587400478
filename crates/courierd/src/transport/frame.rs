//! Length-prefixed duplex framing.
//!
//! Every frame starts with a five byte header: one opcode byte followed by
//! the body length as a big-endian `u32`.
//!
//! | opcode | frame  | body                                  |
//! |--------|--------|---------------------------------------|
//! | `0x1`  | text   | UTF-8 text                            |
//! | `0x2`  | binary | opaque bytes                          |
//! | `0x8`  | close  | big-endian `u16` status, UTF-8 reason |
//! | `0x9`  | ping   | opaque bytes                          |
//! | `0xA`  | pong   | body of the ping being answered       |

use std::io::{self, Read, Write};

use courier_wire::{CloseStatus, Frame};

use super::FrameError;

/// Largest accepted frame body.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const OP_TEXT: u8 = 0x1;
const OP_BINARY: u8 = 0x2;
const OP_CLOSE: u8 = 0x8;
const OP_PING: u8 = 0x9;
const OP_PONG: u8 = 0xA;

/// A frame as carried on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// Text or binary data handed to the codec.
    Data(Frame),
    /// Orderly shutdown with a status and reason.
    Close { status: CloseStatus, reason: String },
    /// Liveness probe.
    Ping(Vec<u8>),
    /// Answer to a probe.
    Pong(Vec<u8>),
}

impl WireFrame {
    /// Builds a close frame.
    pub fn close(status: CloseStatus, reason: impl Into<String>) -> Self {
        Self::Close {
            status,
            reason: reason.into(),
        }
    }
}

/// Reads the next frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between
/// frames.
///
/// # Errors
///
/// Returns [`FrameError`] for truncated, oversized or malformed frames.
pub fn read_frame(reader: &mut impl Read) -> Result<Option<WireFrame>, FrameError> {
    let mut opcode = [0_u8; 1];
    loop {
        match reader.read(&mut opcode) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error.into()),
        }
    }

    let mut length = [0_u8; 4];
    reader.read_exact(&mut length)?;
    let size = usize::try_from(u32::from_be_bytes(length)).unwrap_or(usize::MAX);
    if size > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            size,
            max: MAX_FRAME_BYTES,
        });
    }
    let [opcode] = opcode;
    if !matches!(opcode, OP_TEXT | OP_BINARY | OP_CLOSE | OP_PING | OP_PONG) {
        return Err(FrameError::UnknownOpcode(opcode));
    }

    let mut body = vec![0_u8; size];
    reader.read_exact(&mut body)?;
    let frame = match opcode {
        OP_TEXT => {
            let text = String::from_utf8(body).map_err(|_| FrameError::InvalidText)?;
            WireFrame::Data(Frame::Text(text))
        }
        OP_BINARY => WireFrame::Data(Frame::Binary(body)),
        OP_CLOSE => decode_close(&body)?,
        OP_PING => WireFrame::Ping(body),
        _ => WireFrame::Pong(body),
    };
    Ok(Some(frame))
}

fn decode_close(body: &[u8]) -> Result<WireFrame, FrameError> {
    let [high, low, reason @ ..] = body else {
        return Err(FrameError::InvalidClose);
    };
    let reason = std::str::from_utf8(reason).map_err(|_| FrameError::InvalidText)?;
    Ok(WireFrame::close(
        CloseStatus::from_code(u16::from_be_bytes([*high, *low])),
        reason,
    ))
}

/// Writes one frame and flushes.
///
/// # Errors
///
/// Propagates write failures; bodies above [`MAX_FRAME_BYTES`] are refused
/// with [`io::ErrorKind::InvalidInput`].
pub fn write_frame(writer: &mut impl Write, frame: &WireFrame) -> io::Result<()> {
    let (opcode, body): (u8, std::borrow::Cow<'_, [u8]>) = match frame {
        WireFrame::Data(Frame::Text(text)) => (OP_TEXT, text.as_bytes().into()),
        WireFrame::Data(Frame::Binary(bytes)) => (OP_BINARY, bytes.as_slice().into()),
        WireFrame::Close { status, reason } => {
            let mut body = status.code().to_be_bytes().to_vec();
            body.extend_from_slice(reason.as_bytes());
            (OP_CLOSE, body.into())
        }
        WireFrame::Ping(body) => (OP_PING, body.as_slice().into()),
        WireFrame::Pong(body) => (OP_PONG, body.as_slice().into()),
    };
    if body.len() > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds the frame limit", body.len()),
        ));
    }
    let length = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    let mut header = [0_u8; 5];
    header[0] = opcode;
    header[1..].copy_from_slice(&length.to_be_bytes());
    writer.write_all(&header)?;
    writer.write_all(&body)?;
    writer.flush()
}
