// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode swarmtrace wire messages.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Wire protocol shared by the swarmtrace master and workers.
//!
//! Every message is framed as `opcode (1 byte) | length (4 bytes LE) |
//! payload`. On the reliable channel frames are concatenated on a byte
//! stream and reassembled by [`MessageParser`]; on the datagram channel one
//! frame is carried per packet. Payload bodies are field-tagged records
//! (see [`record`]); `SendRays` and `FinishedRays` payloads are sequences of
//! length-prefixed inner records.

mod error;
mod frame;
mod messages;
mod ray_codec;
pub mod record;

pub use error::CodecError;
pub use frame::{Message, MessageParser, OpCode, FRAME_HEADER_LEN};
pub use messages::{
    ConnectRequest, ConnectResponse, ConnectTo, FinishedRay, GenerateRays, GetObjects, GetWorker,
    Hello, HelloAck, QueueSnapshot, RayCounters, WorkerStatsMsg,
};
pub use ray_codec::{decode_ray, encode_ray};
