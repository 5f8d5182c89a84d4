//! Message assembly: turning an application payload into a chain of frames
//! on the way out, and a chain of frames back into one payload on the way
//! in.

use crate::frame::{Frame, OpCode};

/// Split one application message into the frame sequence the connection
/// engine will transmit in order. The first frame is `Binary`, the rest are
/// `Continuation`, and the last carries `final_fragment = true`. An empty
/// message still produces exactly one (final, empty) frame.
///
/// `header` is an optional block the caller wants prepended to `body`
/// before fragmenting, rather than shipped as its own tiny frame — mirrors
/// `nni_msg_header`/`nni_msg_body` being flattened before `ws_msg_init_tx`
/// splits on `fragsize`.
pub fn split_into_frames(header: Option<&[u8]>, body: &[u8], fragsize: usize) -> Vec<Frame> {
    debug_assert!(fragsize > 0);

    let total_len = header.map(|h| h.len()).unwrap_or(0) + body.len();
    if total_len == 0 {
        return vec![Frame::new(OpCode::Binary, true, Vec::new())];
    }

    let mut combined;
    let payload: &[u8] = match header {
        Some(h) if !h.is_empty() => {
            combined = Vec::with_capacity(h.len() + body.len());
            combined.extend_from_slice(h);
            combined.extend_from_slice(body);
            &combined
        }
        _ => body,
    };

    let mut frames = Vec::with_capacity(payload.len().div_ceil(fragsize).max(1));
    let mut first = true;
    for chunk in payload.chunks(fragsize) {
        let opcode = if first {
            OpCode::Binary
        } else {
            OpCode::Continuation
        };
        frames.push(Frame::new(opcode, false, chunk.to_vec()));
        first = false;
    }
    if let Some(last) = frames.last_mut() {
        last.final_fragment = true;
    }
    frames
}

/// The action the connection engine should take after feeding one inbound
/// frame to the assembler.
pub enum AssemblerEvent {
    /// No caller-visible event yet; more frames are needed.
    Pending,
    /// A complete application message is ready for delivery.
    Message(Vec<u8>),
    /// A pong with the given payload should be sent back immediately.
    SendPong(Vec<u8>),
    /// The peer initiated the close handshake; no reply frame is sent.
    PeerClosed,
    /// The peer violated the protocol; close with this code.
    ProtocolError(u16),
}

/// Reassembles one in-progress receive message from a sequence of frames.
///
/// One of these lives per connection, fed one completed frame at a time by
/// the reader task. It does not know about queued receivers or
/// back-pressure — `Connection` checks "is anyone waiting?" before/after
/// calling this and decides whether to close with 1001.
#[derive(Default)]
pub struct Assembler {
    in_progress: Option<Vec<u8>>,
}

impl Assembler {
    pub fn new() -> Self {
        Self { in_progress: None }
    }

    pub fn feed(&mut self, frame: Frame) -> AssemblerEvent {
        match frame.opcode {
            OpCode::Binary => {
                if self.in_progress.is_some() {
                    return AssemblerEvent::ProtocolError(1002);
                }
                if frame.final_fragment {
                    return AssemblerEvent::Message(frame.payload);
                }
                self.in_progress = Some(frame.payload);
                AssemblerEvent::Pending
            }
            OpCode::Continuation => {
                let Some(buf) = self.in_progress.as_mut() else {
                    return AssemblerEvent::ProtocolError(1002);
                };
                buf.extend_from_slice(&frame.payload);
                if frame.final_fragment {
                    let msg = self.in_progress.take().unwrap();
                    AssemblerEvent::Message(msg)
                } else {
                    AssemblerEvent::Pending
                }
            }
            OpCode::Ping => {
                if frame.payload.len() > 125 {
                    return AssemblerEvent::ProtocolError(1002);
                }
                AssemblerEvent::SendPong(frame.payload)
            }
            OpCode::Pong => AssemblerEvent::Pending,
            OpCode::Close => AssemblerEvent::PeerClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_emits_one_final_frame() {
        let frames = split_into_frames(None, b"", 1024);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].final_fragment);
        assert_eq!(frames[0].opcode, OpCode::Binary);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn large_message_splits_into_expected_frame_count() {
        let body = vec![7u8; 3 * 1024 * 1024];
        let frames = split_into_frames(None, &body, 1024 * 1024);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].opcode, OpCode::Binary);
        assert_eq!(frames[1].opcode, OpCode::Continuation);
        assert_eq!(frames[2].opcode, OpCode::Continuation);
        assert!(!frames[0].final_fragment);
        assert!(!frames[1].final_fragment);
        assert!(frames[2].final_fragment);
        let total: usize = frames.iter().map(|f| f.payload.len()).sum();
        assert_eq!(total, body.len());
    }

    #[test]
    fn header_is_prepended_before_fragmenting() {
        let frames = split_into_frames(Some(b"HDR"), b"body", 2);
        let total: Vec<u8> = frames.iter().flat_map(|f| f.payload.clone()).collect();
        assert_eq!(total, b"HDRbody");
    }

    #[test]
    fn assembler_round_trips_single_frame_message() {
        let mut asm = Assembler::new();
        let frame = Frame::new(OpCode::Binary, true, b"hello".to_vec());
        match asm.feed(frame) {
            AssemblerEvent::Message(payload) => assert_eq!(payload, b"hello"),
            _ => panic!("expected Message"),
        }
    }

    #[test]
    fn assembler_reassembles_fragmented_message() {
        let mut asm = Assembler::new();
        assert!(matches!(
            asm.feed(Frame::new(OpCode::Binary, false, b"abc".to_vec())),
            AssemblerEvent::Pending
        ));
        assert!(matches!(
            asm.feed(Frame::new(OpCode::Continuation, false, b"def".to_vec())),
            AssemblerEvent::Pending
        ));
        match asm.feed(Frame::new(OpCode::Continuation, true, b"ghi".to_vec())) {
            AssemblerEvent::Message(payload) => assert_eq!(payload, b"abcdefghi"),
            _ => panic!("expected Message"),
        }
    }

    #[test]
    fn ping_mid_fragment_does_not_disturb_assembly() {
        let mut asm = Assembler::new();
        asm.feed(Frame::new(OpCode::Binary, false, b"part1".to_vec()));
        match asm.feed(Frame::new(OpCode::Ping, true, b"abc".to_vec())) {
            AssemblerEvent::SendPong(payload) => assert_eq!(payload, b"abc"),
            _ => panic!("expected SendPong"),
        }
        match asm.feed(Frame::new(OpCode::Continuation, true, b"part2".to_vec())) {
            AssemblerEvent::Message(payload) => assert_eq!(payload, b"part1part2"),
            _ => panic!("expected Message"),
        }
    }

    #[test]
    fn binary_while_fragment_in_progress_is_protocol_error() {
        let mut asm = Assembler::new();
        asm.feed(Frame::new(OpCode::Binary, false, b"part1".to_vec()));
        assert!(matches!(
            asm.feed(Frame::new(OpCode::Binary, true, b"oops".to_vec())),
            AssemblerEvent::ProtocolError(1002)
        ));
    }

    #[test]
    fn continuation_without_start_is_protocol_error() {
        let mut asm = Assembler::new();
        assert!(matches!(
            asm.feed(Frame::new(OpCode::Continuation, true, b"oops".to_vec())),
            AssemblerEvent::ProtocolError(1002)
        ));
    }

    #[test]
    fn oversize_ping_is_protocol_error() {
        let mut asm = Assembler::new();
        assert!(matches!(
            asm.feed(Frame::new(OpCode::Ping, true, vec![0u8; 200])),
            AssemblerEvent::ProtocolError(1002)
        ));
    }

    #[test]
    fn close_frame_reports_peer_closed() {
        let mut asm = Assembler::new();
        assert!(matches!(
            asm.feed(Frame::new(OpCode::Close, true, Vec::new())),
            AssemblerEvent::PeerClosed
        ));
    }
}
