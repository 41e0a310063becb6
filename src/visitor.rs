//! Consumer-facing callback interface for decoded frames.
//!
//! A [`FrameVisitor`] receives frame boundaries, payload fragments, and
//! parsed frame values as the decoder works through its input. Every method
//! returning `bool` may return `false` to pause decoding: the decoder then
//! returns from `process_input` having consumed exactly the bytes that
//! produced the callbacks so far, and the next call resumes at the same
//! logical position. End-of-frame callbacks consume no bytes of their own;
//! refusing one keeps the decoder parked on it until it is accepted.
//!
//! Callbacks for one frame arrive strictly in order: a start event, zero or
//! more payload fragments (streamed frames) or one value event (buffered
//! frames), then an end event where the frame has one. Payload slices
//! borrow from the caller's input buffer and must be copied if retained.
//!
//! Every method has a permissive default, so implementors only write the
//! handlers for the frames they care about.

use crate::{
    error::DecoderError,
    frames::{
        AcceptChFrame,
        CancelPushFrame,
        GoAwayFrame,
        MaxPushIdFrame,
        PriorityUpdateFrame,
        SettingsFrame,
    },
};

/// Callbacks announcing decoded HTTP/3 frames.
///
/// `header_length` arguments count the bytes of the frame's type and length
/// varints; payload lengths are the declared payload size in bytes.
#[allow(unused_variables)]
pub trait FrameVisitor {
    /// Called exactly once when a decoding error becomes sticky.
    fn on_error(&mut self, error: &DecoderError) {}

    /// SETTINGS frame header decoded; the payload will be buffered.
    fn on_settings_frame_start(&mut self, header_length: usize) -> bool { true }

    /// SETTINGS frame fully parsed.
    fn on_settings_frame(&mut self, frame: SettingsFrame) -> bool { true }

    /// DATA frame header decoded.
    fn on_data_frame_start(&mut self, header_length: usize, payload_length: u64) -> bool { true }

    /// A fragment of DATA payload, in wire order.
    fn on_data_frame_payload(&mut self, payload: &[u8]) -> bool { true }

    /// DATA payload fully delivered.
    fn on_data_frame_end(&mut self) -> bool { true }

    /// HEADERS frame header decoded.
    fn on_headers_frame_start(&mut self, header_length: usize, payload_length: u64) -> bool { true }

    /// A fragment of the HEADERS field section, in wire order.
    fn on_headers_frame_payload(&mut self, payload: &[u8]) -> bool { true }

    /// HEADERS payload fully delivered.
    fn on_headers_frame_end(&mut self) -> bool { true }

    /// CANCEL_PUSH frame fully parsed.
    fn on_cancel_push_frame(&mut self, frame: CancelPushFrame) -> bool { true }

    /// GOAWAY frame fully parsed.
    fn on_goaway_frame(&mut self, frame: GoAwayFrame) -> bool { true }

    /// MAX_PUSH_ID frame fully parsed.
    fn on_max_push_id_frame(&mut self, frame: MaxPushIdFrame) -> bool { true }

    /// PUSH_PROMISE frame header decoded; the push id follows.
    fn on_push_promise_frame_start(&mut self, header_length: usize) -> bool { true }

    /// PUSH_PROMISE push id decoded. `header_block_length` is the payload
    /// length minus the push id encoding.
    fn on_push_promise_frame_push_id(
        &mut self,
        push_id: u64,
        push_id_length: usize,
        header_block_length: u64,
    ) -> bool {
        true
    }

    /// A fragment of the PUSH_PROMISE header block, in wire order.
    fn on_push_promise_frame_payload(&mut self, payload: &[u8]) -> bool { true }

    /// PUSH_PROMISE header block fully delivered.
    fn on_push_promise_frame_end(&mut self) -> bool { true }

    /// PRIORITY_UPDATE frame header decoded; the payload will be buffered.
    fn on_priority_update_frame_start(&mut self, header_length: usize) -> bool { true }

    /// PRIORITY_UPDATE frame fully parsed.
    fn on_priority_update_frame(&mut self, frame: PriorityUpdateFrame) -> bool { true }

    /// ACCEPT_CH frame header decoded; the payload will be buffered.
    fn on_accept_ch_frame_start(&mut self, header_length: usize) -> bool { true }

    /// ACCEPT_CH frame fully parsed.
    fn on_accept_ch_frame(&mut self, frame: AcceptChFrame) -> bool { true }

    /// A WebTransport stream preface was recognised. No further frames will
    /// be decoded on this stream; the rest of the bytes belong to the
    /// session identified here.
    fn on_web_transport_stream_frame_type(&mut self, header_length: usize, session_id: u64) {}

    /// Header of a frame with an unrecognised type decoded.
    fn on_unknown_frame_start(
        &mut self,
        frame_type: u64,
        header_length: usize,
        payload_length: u64,
    ) -> bool {
        true
    }

    /// A fragment of an unrecognised frame's payload, in wire order.
    fn on_unknown_frame_payload(&mut self, payload: &[u8]) -> bool { true }

    /// Unrecognised frame payload fully delivered.
    fn on_unknown_frame_end(&mut self) -> bool { true }
}
