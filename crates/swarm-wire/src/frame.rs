// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Opcode framing and incremental stream reassembly.
// Author: Lukas Bower

//! Message framing: `opcode | length (LE) | payload`.

use std::collections::VecDeque;

use crate::error::CodecError;

/// Bytes of frame overhead per message: one opcode byte plus a four-byte
/// little-endian payload length.
pub const FRAME_HEADER_LEN: usize = 5;

/// Recognized message opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Worker hello / master's id reply.
    Hey = 1,
    /// Liveness probe.
    Ping = 2,
    /// Liveness reply.
    Pong = 3,
    /// Orderly shutdown.
    Bye = 4,
    /// List of objects a worker must fetch.
    GetObjects = 5,
    /// Instruct a worker to generate camera rays for a tile.
    GenerateRays = 6,
    /// Introduce a worker to a peer's datagram address.
    ConnectTo = 7,
    /// Peer (or master) handshake request.
    ConnectionRequest = 8,
    /// Handshake reply carrying the responder's treelets.
    ConnectionResponse = 9,
    /// A batch of rays shipped between peers.
    SendRays = 10,
    /// Finished radiance samples for the film.
    FinishedRays = 11,
    /// Periodic worker statistics snapshot.
    WorkerStats = 12,
    /// Ask the master for an owner of a treelet.
    GetWorker = 13,
    /// Ask every worker for a final diagnostics snapshot.
    RequestDiagnostics = 14,
}

impl TryFrom<u8> for OpCode {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use OpCode::*;
        Ok(match value {
            1 => Hey,
            2 => Ping,
            3 => Pong,
            4 => Bye,
            5 => GetObjects,
            6 => GenerateRays,
            7 => ConnectTo,
            8 => ConnectionRequest,
            9 => ConnectionResponse,
            10 => SendRays,
            11 => FinishedRays,
            12 => WorkerStats,
            13 => GetWorker,
            14 => RequestDiagnostics,
            other => return Err(CodecError::UnknownOpcode(other)),
        })
    }
}

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message opcode.
    pub opcode: OpCode,
    /// Opaque payload body.
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a message.
    #[must_use]
    pub fn new(opcode: OpCode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    /// A message with an empty payload.
    #[must_use]
    pub fn empty(opcode: OpCode) -> Self {
        Self::new(opcode, Vec::new())
    }

    /// Total encoded size including the frame header.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }

    /// Encode into a frame.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        out.push(self.opcode as u8);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode exactly one frame occupying the whole buffer, as carried in a
    /// single datagram.
    pub fn from_datagram(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < FRAME_HEADER_LEN {
            return Err(CodecError::Truncated);
        }
        let opcode = OpCode::try_from(bytes[0])?;
        let len = u32::from_le_bytes(bytes[1..5].try_into().expect("4 bytes")) as usize;
        if bytes.len() != FRAME_HEADER_LEN + len {
            return Err(CodecError::BadLength);
        }
        Ok(Self::new(opcode, bytes[FRAME_HEADER_LEN..].to_vec()))
    }
}

/// Incremental reassembler for framed messages on a byte stream.
///
/// Feed arbitrary chunks with [`MessageParser::parse`]; complete messages
/// accumulate in arrival order and are drained with [`MessageParser::pop`].
#[derive(Debug, Default)]
pub struct MessageParser {
    buf: Vec<u8>,
    complete: VecDeque<Message>,
}

impl MessageParser {
    /// New empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of stream data, queueing any completed messages.
    pub fn parse(&mut self, data: &[u8]) -> Result<(), CodecError> {
        self.buf.extend_from_slice(data);
        loop {
            if self.buf.len() < FRAME_HEADER_LEN {
                return Ok(());
            }
            let opcode = OpCode::try_from(self.buf[0])?;
            let len = u32::from_le_bytes(self.buf[1..5].try_into().expect("4 bytes")) as usize;
            let total = FRAME_HEADER_LEN + len;
            if self.buf.len() < total {
                return Ok(());
            }
            let payload = self.buf[FRAME_HEADER_LEN..total].to_vec();
            self.buf.drain(..total);
            self.complete.push_back(Message::new(opcode, payload));
        }
    }

    /// Whether any complete message is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.complete.is_empty()
    }

    /// Take the oldest complete message.
    pub fn pop(&mut self) -> Option<Message> {
        self.complete.pop_front()
    }
}
