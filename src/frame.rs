//! RFC 6455 frame header encode/decode, and payload masking.
//!
//! This module only knows how to turn one frame's worth of bytes into an
//! [`OpCode`] + payload and back; fragmentation across frames, control-frame
//! dispatch, and the close handshake live one layer up in [`crate::message`]
//! and [`crate::connection`].

use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The direction a frame travels, which determines whether it must (dialer)
/// or must not (listener) be masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Dialer,
    Listener,
}

/// Frame opcodes. Text is intentionally absent from the payload-carrying
/// variants accepted on receive — text-frame payloads are not a supported
/// message type, so an inbound text frame is a protocol violation (close
/// 1003).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// A raw opcode nibble as read off the wire, before we've decided whether
/// it's one we support. `Text` and `Unknown` only ever appear transiently
/// while decoding; they never reach the message assembler as an `OpCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawOpCode {
    Known(OpCode),
    Text,
    Unknown(u8),
}

impl RawOpCode {
    fn from_nibble(b: u8) -> Self {
        match b {
            0x0 => RawOpCode::Known(OpCode::Continuation),
            0x1 => RawOpCode::Text,
            0x2 => RawOpCode::Known(OpCode::Binary),
            0x8 => RawOpCode::Known(OpCode::Close),
            0x9 => RawOpCode::Known(OpCode::Ping),
            0xA => RawOpCode::Known(OpCode::Pong),
            other => RawOpCode::Unknown(other),
        }
    }
}

/// One WebSocket frame: header metadata plus an unmasked payload.
///
/// Payloads are always heap-allocated `Vec<u8>` here; an inline buffer for
/// short (≤125 byte) frames would save an allocation per control frame, but
/// is skipped to keep the codec's ownership story simple.
#[derive(Debug, Clone)]
pub struct Frame {
    pub opcode: OpCode,
    pub final_fragment: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: OpCode, final_fragment: bool, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            final_fragment,
            payload,
        }
    }

    pub fn control(opcode: OpCode, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > 125 {
            return Err(Error::Invalid(
                "control frame payload exceeds 125 bytes".into(),
            ));
        }
        Ok(Self::new(opcode, true, payload))
    }

    pub fn close(code: u16) -> Self {
        Self::new(OpCode::Close, true, code.to_be_bytes().to_vec())
    }

    /// Encode this frame's header + (masked, if dialer) payload into `out`.
    pub fn encode(&self, role: Role, out: &mut Vec<u8>) {
        let first_byte = (self.final_fragment as u8) << 7 | self.opcode.as_u8();
        out.push(first_byte);

        let len = self.payload.len();
        let masked = role == Role::Dialer;
        let mask_bit = if masked { 0x80 } else { 0x00 };

        if len < 126 {
            out.push(mask_bit | len as u8);
        } else if len < 65_536 {
            out.push(mask_bit | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(mask_bit | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }

        if masked {
            let key: [u8; 4] = rand::random();
            out.extend_from_slice(&key);
            let start = out.len();
            out.extend_from_slice(&self.payload);
            mask_unmask(&mut out[start..], &key);
        } else {
            out.extend_from_slice(&self.payload);
        }
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, role: Role, writer: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(14 + self.payload.len());
        self.encode(role, &mut buf);
        writer.write_all(&buf).await?;
        Ok(())
    }

    /// Read and decode one frame from `reader`, enforcing `max_payload` and
    /// the masking direction implied by `role` (the role of *this* endpoint
    /// — a listener must see masked inbound frames, a dialer must see
    /// unmasked ones).
    pub async fn read<R: AsyncRead + Unpin>(
        reader: &mut R,
        role: Role,
        max_payload: usize,
    ) -> Result<Frame> {
        let mut header = [0u8; 2];
        reader.read_exact(&mut header).await?;

        let final_fragment = header[0] & 0x80 != 0;
        let rsv = header[0] & 0x70;
        if rsv != 0 {
            return Err(Error::Proto);
        }
        let raw_opcode = RawOpCode::from_nibble(header[0] & 0x0F);

        let masked = header[1] & 0x80 != 0;
        let len7 = header[1] & 0x7F;

        // Server (listener) must see masked frames; client (dialer) must
        // see unmasked frames. Violation is a protocol error.
        let expect_masked = role == Role::Listener;
        if masked != expect_masked {
            return Err(Error::Proto);
        }

        let is_control = matches!(raw_opcode, RawOpCode::Known(op) if op.is_control());
        if !final_fragment && is_control {
            return Err(Error::Proto);
        }

        let len: u64 = match len7 {
            127 => {
                let mut buf = [0u8; 8];
                reader.read_exact(&mut buf).await?;
                let len = u64::from_be_bytes(buf);
                if len < 65_536 {
                    return Err(Error::Proto);
                }
                len
            }
            126 => {
                let mut buf = [0u8; 2];
                reader.read_exact(&mut buf).await?;
                let len = u16::from_be_bytes(buf) as u64;
                if len < 126 {
                    return Err(Error::Proto);
                }
                len
            }
            n => n as u64,
        };

        if is_control && len > 125 {
            return Err(Error::Proto);
        }
        if len > max_payload as u64 {
            return Err(Error::Invalid("oversize frame".into()));
        }
        let len = len as usize;

        let mask = if masked {
            let mut key = [0u8; 4];
            reader.read_exact(&mut key).await?;
            Some(key)
        } else {
            None
        };

        let mut payload = vec![0u8; len];
        if len > 0 {
            reader.read_exact(&mut payload).await?;
        }
        if let Some(key) = mask {
            mask_unmask(&mut payload, &key);
        }

        let opcode = match raw_opcode {
            RawOpCode::Known(op) => op,
            RawOpCode::Text => return Err(Error::Unsupported),
            RawOpCode::Unknown(_) => return Err(Error::Proto),
        };

        Ok(Frame::new(opcode, final_fragment, payload))
    }
}

/// XOR each payload byte with `key[i % 4]`. Applying this twice with the
/// same key is the identity, so the same routine masks and unmasks.
pub fn mask_unmask(data: &mut [u8], key: &[u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}
