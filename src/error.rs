//! Error taxonomy for the frame decoder.
//!
//! A decoder reports at most one error per instance: once raised it is
//! sticky, the visitor's `on_error` fires exactly once, and every later
//! `process_input` call is a no-op. The `Display` rendering of each variant
//! is the human-readable detail surfaced to peers and logs, so the wording
//! is part of the contract and covered by tests.

use thiserror::Error;

/// Reason the decoder gave up on its stream.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecoderError {
    /// Generic framing violation; the detail names the offending frame or
    /// field.
    #[error("{detail}")]
    Frame {
        /// What exactly could not be read.
        detail: &'static str,
    },

    /// The declared payload length exceeds the cap for the frame type.
    #[error("Frame is too large.")]
    FrameTooLarge,

    /// A SETTINGS payload listed the same identifier twice.
    #[error("Duplicate setting identifier.")]
    DuplicateSettingIdentifier,

    /// A frame type defined by HTTP/2 that has no meaning in HTTP/3.
    #[error("HTTP/2 frame received in a HTTP/3 connection: {frame_type}")]
    Http2Frame {
        /// Offending wire type code.
        frame_type: u64,
    },

    /// The decoder was driven past the point where parsing is possible.
    #[error("{detail}")]
    Internal {
        /// Description of the contract violation.
        detail: &'static str,
    },
}

impl DecoderError {
    /// Shorthand for the generic framing violation.
    pub(crate) const fn frame(detail: &'static str) -> Self { Self::Frame { detail } }

    /// Stable category label for logging and metrics.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Frame { .. } => "frame_error",
            Self::FrameTooLarge => "frame_too_large",
            Self::DuplicateSettingIdentifier => "duplicate_setting_identifier",
            Self::Http2Frame { .. } => "http2_frame",
            Self::Internal { .. } => "internal",
        }
    }
}
