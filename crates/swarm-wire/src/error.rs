// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Error type for the swarmtrace wire codec.
// Author: Lukas Bower

//! Codec error definitions.

/// Possible errors produced while encoding or decoding wire messages.
///
/// The control plane is trusted; any of these on a live channel is fatal to
/// the receiving process.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before the declared length.
    #[error("truncated frame")]
    Truncated,
    /// Encountered an opcode outside the recognized set.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    /// A record field carried a different wire type than expected.
    #[error("field {field} has wire type {found}, expected {expected}")]
    WireType {
        /// Field number.
        field: u32,
        /// Wire type found on the wire.
        found: u8,
        /// Wire type the decoder expected.
        expected: u8,
    },
    /// A varint ran past ten bytes or the end of the buffer.
    #[error("malformed varint")]
    BadVarint,
    /// A string field held invalid UTF-8.
    #[error("invalid utf8 in string field")]
    InvalidUtf8,
    /// A required field was absent from a record.
    #[error("missing required field {0}")]
    MissingField(u32),
    /// A length prefix pointed past the end of the payload.
    #[error("length prefix out of bounds")]
    BadLength,
    /// A field held a value outside its domain.
    #[error("invalid value for field {0}")]
    InvalidValue(u32),
}
