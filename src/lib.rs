#![doc(html_root_url = "https://docs.rs/h3frame/latest")]
//! Incremental decoder for HTTP/3 frames carried on a QUIC stream.
//!
//! The central type is [`FrameDecoder`], a push-driven state machine fed
//! through [`FrameDecoder::process_input`] with input sliced however the
//! transport happens to deliver it. Frame boundaries and payload fragments
//! are surfaced through the [`FrameVisitor`] callback trait as soon as they
//! become available; payload bytes are never buffered whole, so consumers
//! can apply backpressure by returning `false` from any callback and resume
//! later at exactly the same position.
//!
//! Frame *encoding*, header-block decompression, and HTTP semantics live in
//! other crates; this one only finds frames and reports what it found.

pub mod decoder;
pub mod error;
pub mod frames;
pub mod varint;
pub mod visitor;

pub use decoder::{decode_settings, DecoderOptions, FrameDecoder};
pub use error::DecoderError;
pub use frames::{
    AcceptChEntry,
    AcceptChFrame,
    CancelPushFrame,
    GoAwayFrame,
    MaxPushIdFrame,
    PriorityUpdateFrame,
    PrioritizedElementType,
    SettingsFrame,
};
pub use visitor::FrameVisitor;
