//! Push-driven state machine that finds HTTP/3 frames in a byte stream.
//!
//! [`FrameDecoder`] consumes input in whatever pieces the transport
//! delivers. Frame headers (type and length varints) are accumulated across
//! calls with resumable varint readers; streamed payloads (DATA, HEADERS,
//! PUSH_PROMISE header blocks, unknown frames) are forwarded to the visitor
//! as they arrive, while small structured frames (SETTINGS, CANCEL_PUSH,
//! GOAWAY, MAX_PUSH_ID, PRIORITY_UPDATE, ACCEPT_CH) are buffered up to
//! their declared length and parsed whole.
//!
//! `process_input` returns how many bytes it consumed, which is less than
//! the input length when the visitor pauses or an error is raised. Consumed
//! bytes must not be fed again; unconsumed bytes must be re-submitted once
//! the visitor is ready to continue.

use bytes::BytesMut;
use log::{debug, error};

use crate::{
    error::DecoderError,
    frames::{
        self,
        AcceptChFrame,
        CancelPushFrame,
        GoAwayFrame,
        MaxPushIdFrame,
        PriorityUpdateFrame,
        SettingsFrame,
    },
    varint::{self, Varint62Reader},
    visitor::FrameVisitor,
};

/// Payload cap for frames that are buffered whole before parsing.
const BUFFERED_PAYLOAD_LIMIT: u64 = 1024 * 1024;

/// Payload cap for frames whose payload is a single varint62.
const SINGLE_VARINT_LIMIT: u64 = 8;

/// Per-instance configuration toggles.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecoderOptions {
    /// Treat frame type 0x41 as a WebTransport stream preface: after its
    /// session id varint the decoder stops and hands the rest of the stream
    /// to the session layer.
    pub allow_web_transport_stream: bool,
    /// Reject CANCEL_PUSH and PUSH_PROMISE frames instead of decoding them.
    pub error_on_http3_push: bool,
    /// Route the obsolete PRIORITY_UPDATE type (0x0f) through the
    /// unknown-frame callbacks instead of interpreting its payload.
    pub ignore_old_priority_update_frame: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecoderState {
    ReadingFrameType,
    ReadingWebTransportSessionId,
    ReadingFrameLength,
    ReadingFramePayload,
    FinishParsing,
    /// Terminal state after a WebTransport preface: the remaining stream
    /// bytes are not frames.
    ParsingDone,
    Error,
}

/// How a frame's wire type is handled once decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Data,
    Headers,
    CancelPush,
    Settings,
    PushPromise,
    GoAway,
    MaxPushId,
    ObsoletePriorityUpdate,
    PriorityUpdate,
    AcceptCh,
    Unknown,
}

impl FrameKind {
    fn from_type(frame_type: u64, options: DecoderOptions) -> Self {
        match frame_type {
            frames::DATA => Self::Data,
            frames::HEADERS => Self::Headers,
            frames::CANCEL_PUSH => Self::CancelPush,
            frames::SETTINGS => Self::Settings,
            frames::PUSH_PROMISE => Self::PushPromise,
            frames::GOAWAY => Self::GoAway,
            frames::MAX_PUSH_ID => Self::MaxPushId,
            frames::PRIORITY_UPDATE_OBSOLETE if !options.ignore_old_priority_update_frame => {
                Self::ObsoletePriorityUpdate
            }
            frames::PRIORITY_UPDATE => Self::PriorityUpdate,
            frames::ACCEPT_CH => Self::AcceptCh,
            _ => Self::Unknown,
        }
    }

    /// Whether the payload is buffered whole and parsed at frame end.
    const fn is_buffered(self) -> bool {
        matches!(
            self,
            Self::CancelPush
                | Self::Settings
                | Self::GoAway
                | Self::MaxPushId
                | Self::ObsoletePriorityUpdate
                | Self::PriorityUpdate
                | Self::AcceptCh
        )
    }

    /// Largest declared payload length accepted for this kind.
    const fn max_frame_length(self) -> u64 {
        match self {
            Self::CancelPush | Self::GoAway | Self::MaxPushId => SINGLE_VARINT_LIMIT,
            Self::Settings | Self::ObsoletePriorityUpdate | Self::PriorityUpdate | Self::AcceptCh => {
                BUFFERED_PAYLOAD_LIMIT
            }
            Self::Data | Self::Headers | Self::PushPromise | Self::Unknown => u64::MAX,
        }
    }
}

/// Per-kind accumulator for the payload phase of the current frame.
#[derive(Debug)]
enum FramePayload {
    /// Fragments go straight to the visitor.
    Streamed,
    /// PUSH_PROMISE while its leading push id is still incomplete.
    PushId(Varint62Reader),
    /// Payload image collected for parsing at frame end.
    Buffered(BytesMut),
}

/// Cursor over one `process_input` call's bytes.
struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(input: &'a [u8]) -> Self { Self { input, pos: 0 } }

    fn remaining(&self) -> &'a [u8] { &self.input[self.pos..] }

    const fn has_remaining(&self) -> bool { self.pos < self.input.len() }

    fn advance(&mut self, n: usize) { self.pos += n; }

    const fn consumed(&self) -> usize { self.pos }
}

/// Incremental HTTP/3 frame decoder.
///
/// One instance decodes the sequential frames of a single QUIC stream
/// direction. It owns its visitor; reach it through
/// [`visitor`](Self::visitor) / [`visitor_mut`](Self::visitor_mut).
#[derive(Debug)]
pub struct FrameDecoder<V> {
    visitor: V,
    options: DecoderOptions,
    state: DecoderState,
    type_reader: Varint62Reader,
    length_reader: Varint62Reader,
    session_id_reader: Varint62Reader,
    current_frame_type: u64,
    current_frame_kind: FrameKind,
    current_type_field_length: usize,
    current_length_field_length: usize,
    current_frame_length: u64,
    remaining_frame_length: u64,
    payload: FramePayload,
    error: Option<DecoderError>,
}

impl<V: FrameVisitor> FrameDecoder<V> {
    /// Create a decoder with default options.
    pub fn new(visitor: V) -> Self { Self::with_options(visitor, DecoderOptions::default()) }

    /// Create a decoder with explicit options.
    pub fn with_options(visitor: V, options: DecoderOptions) -> Self {
        Self {
            visitor,
            options,
            state: DecoderState::ReadingFrameType,
            type_reader: Varint62Reader::default(),
            length_reader: Varint62Reader::default(),
            session_id_reader: Varint62Reader::default(),
            current_frame_type: 0,
            current_frame_kind: FrameKind::Unknown,
            current_type_field_length: 0,
            current_length_field_length: 0,
            current_frame_length: 0,
            remaining_frame_length: 0,
            payload: FramePayload::Streamed,
            error: None,
        }
    }

    /// Borrow the visitor.
    pub const fn visitor(&self) -> &V { &self.visitor }

    /// Mutably borrow the visitor.
    pub fn visitor_mut(&mut self) -> &mut V { &mut self.visitor }

    /// The sticky decoding error, if one has been raised.
    #[must_use]
    pub const fn error(&self) -> Option<&DecoderError> { self.error.as_ref() }

    /// Feed the decoder more of the stream.
    ///
    /// Returns the number of bytes consumed. Bytes `[0..n)` are done with
    /// and must not be submitted again; bytes `[n..)` were left untouched
    /// because the visitor paused, an error was raised, or an indefinite
    /// frame ended parsing. After an error this is a no-op returning 0.
    pub fn process_input(&mut self, input: &[u8]) -> usize {
        if self.error.is_some() {
            return 0;
        }
        if self.state == DecoderState::ParsingDone {
            error!("FrameDecoder called after an indefinite-length frame");
            self.raise_error(DecoderError::Internal {
                detail: "FrameDecoder called after an indefinite-length frame",
            });
            return 0;
        }

        let mut cursor = Cursor::new(input);
        let mut keep_going = true;
        while keep_going
            && self.error.is_none()
            && (cursor.has_remaining() || self.state == DecoderState::FinishParsing)
        {
            keep_going = match self.state {
                DecoderState::ReadingFrameType => self.read_frame_type(&mut cursor),
                DecoderState::ReadingWebTransportSessionId => self.read_session_id(&mut cursor),
                DecoderState::ReadingFrameLength => self.read_frame_length(&mut cursor),
                DecoderState::ReadingFramePayload => self.read_frame_payload(&mut cursor),
                DecoderState::FinishParsing => self.finish_parsing(),
                DecoderState::ParsingDone | DecoderState::Error => break,
            };
        }
        cursor.consumed()
    }

    fn read_frame_type(&mut self, cursor: &mut Cursor<'_>) -> bool {
        let (taken, done) = self.type_reader.read(cursor.remaining());
        cursor.advance(taken);
        let Some(varint) = done else {
            return true;
        };
        self.current_frame_type = varint.value;
        self.current_type_field_length = varint.encoded_len;

        if frames::is_http2_only_type(varint.value) {
            self.raise_error(DecoderError::Http2Frame {
                frame_type: varint.value,
            });
            return false;
        }
        if self.options.error_on_http3_push {
            if varint.value == frames::CANCEL_PUSH {
                self.raise_error(DecoderError::frame("CANCEL_PUSH frame received."));
                return false;
            }
            if varint.value == frames::PUSH_PROMISE {
                self.raise_error(DecoderError::frame("PUSH_PROMISE frame received."));
                return false;
            }
        }
        if self.options.allow_web_transport_stream
            && varint.value == frames::WEBTRANSPORT_STREAM
        {
            self.state = DecoderState::ReadingWebTransportSessionId;
            return true;
        }

        self.current_frame_kind = FrameKind::from_type(varint.value, self.options);
        self.state = DecoderState::ReadingFrameLength;
        true
    }

    fn read_session_id(&mut self, cursor: &mut Cursor<'_>) -> bool {
        let (taken, done) = self.session_id_reader.read(cursor.remaining());
        cursor.advance(taken);
        let Some(varint) = done else {
            return true;
        };
        let header_length = self.current_type_field_length + varint.encoded_len;
        self.visitor
            .on_web_transport_stream_frame_type(header_length, varint.value);
        self.state = DecoderState::ParsingDone;
        false
    }

    fn read_frame_length(&mut self, cursor: &mut Cursor<'_>) -> bool {
        let (taken, done) = self.length_reader.read(cursor.remaining());
        cursor.advance(taken);
        let Some(varint) = done else {
            return true;
        };
        self.current_frame_length = varint.value;
        self.current_length_field_length = varint.encoded_len;
        self.remaining_frame_length = varint.value;

        if varint.value > self.current_frame_kind.max_frame_length() {
            self.raise_error(DecoderError::FrameTooLarge);
            return false;
        }
        if self.current_frame_kind == FrameKind::PushPromise && varint.value == 0 {
            self.raise_error(DecoderError::frame("PUSH_PROMISE frame with empty payload."));
            return false;
        }

        let header_length = self.current_type_field_length + self.current_length_field_length;
        let keep_going = match self.current_frame_kind {
            FrameKind::Data => self
                .visitor
                .on_data_frame_start(header_length, self.current_frame_length),
            FrameKind::Headers => self
                .visitor
                .on_headers_frame_start(header_length, self.current_frame_length),
            FrameKind::Settings => self.visitor.on_settings_frame_start(header_length),
            FrameKind::PushPromise => self.visitor.on_push_promise_frame_start(header_length),
            FrameKind::ObsoletePriorityUpdate | FrameKind::PriorityUpdate => {
                self.visitor.on_priority_update_frame_start(header_length)
            }
            FrameKind::AcceptCh => self.visitor.on_accept_ch_frame_start(header_length),
            FrameKind::Unknown => self.visitor.on_unknown_frame_start(
                self.current_frame_type,
                header_length,
                self.current_frame_length,
            ),
            FrameKind::CancelPush | FrameKind::GoAway | FrameKind::MaxPushId => true,
        };

        self.payload = match self.current_frame_kind {
            FrameKind::PushPromise => FramePayload::PushId(Varint62Reader::default()),
            kind if kind.is_buffered() => FramePayload::Buffered(BytesMut::with_capacity(
                usize::try_from(self.current_frame_length).unwrap_or_default(),
            )),
            _ => FramePayload::Streamed,
        };
        self.state = if self.remaining_frame_length == 0 {
            DecoderState::FinishParsing
        } else {
            DecoderState::ReadingFramePayload
        };
        keep_going
    }

    fn read_frame_payload(&mut self, cursor: &mut Cursor<'_>) -> bool {
        debug_assert!(cursor.has_remaining());
        debug_assert!(self.remaining_frame_length > 0);
        match self.payload {
            FramePayload::PushId(_) => self.read_push_id(cursor),
            FramePayload::Buffered(_) => {
                self.buffer_payload(cursor);
                true
            }
            FramePayload::Streamed => self.stream_payload(cursor),
        }
    }

    /// Forward as much payload as is available, up to the frame boundary.
    fn stream_payload(&mut self, cursor: &mut Cursor<'_>) -> bool {
        let available = cursor.remaining();
        let take = usize::try_from(self.remaining_frame_length)
            .map_or(available.len(), |remaining| available.len().min(remaining));
        let fragment = &available[..take];

        let keep_going = match self.current_frame_kind {
            FrameKind::Data => self.visitor.on_data_frame_payload(fragment),
            FrameKind::Headers => self.visitor.on_headers_frame_payload(fragment),
            FrameKind::PushPromise => self.visitor.on_push_promise_frame_payload(fragment),
            FrameKind::Unknown => self.visitor.on_unknown_frame_payload(fragment),
            kind => {
                debug_assert!(false, "streamed payload for buffered kind {kind:?}");
                true
            }
        };

        cursor.advance(take);
        self.remaining_frame_length -= take as u64;
        if self.remaining_frame_length == 0 {
            self.state = DecoderState::FinishParsing;
        }
        keep_going
    }

    /// Accumulate payload for a frame that is parsed whole.
    fn buffer_payload(&mut self, cursor: &mut Cursor<'_>) {
        let FramePayload::Buffered(buffer) = &mut self.payload else {
            debug_assert!(false, "buffering without an accumulator");
            return;
        };
        let available = cursor.remaining();
        let take = usize::try_from(self.remaining_frame_length)
            .map_or(available.len(), |remaining| available.len().min(remaining));
        buffer.extend_from_slice(&available[..take]);
        cursor.advance(take);
        self.remaining_frame_length -= take as u64;
        if self.remaining_frame_length == 0 {
            self.state = DecoderState::FinishParsing;
        }
    }

    /// Read the push id varint at the head of a PUSH_PROMISE payload.
    fn read_push_id(&mut self, cursor: &mut Cursor<'_>) -> bool {
        let available = cursor.remaining();
        let Some(&first) = available.first() else {
            return true;
        };

        // The id's encoded length is known from its first byte; a frame too
        // short to hold it can be failed before consuming further.
        let required = match &self.payload {
            FramePayload::PushId(reader) => reader
                .required_len()
                .unwrap_or_else(|| varint::encoded_len(first)),
            _ => {
                debug_assert!(false, "push id phase without a reader");
                return true;
            }
        };
        if required as u64 > self.current_frame_length {
            self.raise_error(DecoderError::frame("Unable to read PUSH_PROMISE push_id."));
            return false;
        }

        let FramePayload::PushId(reader) = &mut self.payload else {
            return true;
        };
        let (taken, done) = reader.read(available);
        cursor.advance(taken);
        let Some(varint) = done else {
            return true;
        };

        self.remaining_frame_length -= varint.encoded_len as u64;
        self.payload = FramePayload::Streamed;
        if self.remaining_frame_length == 0 {
            self.state = DecoderState::FinishParsing;
        }
        self.visitor.on_push_promise_frame_push_id(
            varint.value,
            varint.encoded_len,
            self.remaining_frame_length,
        )
    }

    /// Close out the current frame: parse buffered payloads, emit end
    /// events, and rearm for the next frame.
    fn finish_parsing(&mut self) -> bool {
        debug_assert_eq!(self.remaining_frame_length, 0);

        if self.current_frame_kind.is_buffered() {
            let keep_going = self.parse_buffered_payload();
            if self.error.is_some() {
                return false;
            }
            self.reset_frame();
            return keep_going;
        }

        let keep_going = match self.current_frame_kind {
            FrameKind::Data => self.visitor.on_data_frame_end(),
            FrameKind::Headers => self.visitor.on_headers_frame_end(),
            FrameKind::PushPromise => self.visitor.on_push_promise_frame_end(),
            _ => self.visitor.on_unknown_frame_end(),
        };
        // A refused end event is replayed on the next call.
        if keep_going {
            self.reset_frame();
        }
        keep_going
    }

    fn parse_buffered_payload(&mut self) -> bool {
        let FramePayload::Buffered(buffer) =
            std::mem::replace(&mut self.payload, FramePayload::Streamed)
        else {
            debug_assert!(false, "no buffered payload to parse");
            return true;
        };
        let payload = buffer.freeze();

        let outcome = match self.current_frame_kind {
            FrameKind::Settings => {
                SettingsFrame::parse(&payload).map(|frame| self.visitor.on_settings_frame(frame))
            }
            FrameKind::CancelPush => CancelPushFrame::parse(&payload)
                .map(|frame| self.visitor.on_cancel_push_frame(frame)),
            FrameKind::GoAway => {
                GoAwayFrame::parse(&payload).map(|frame| self.visitor.on_goaway_frame(frame))
            }
            FrameKind::MaxPushId => MaxPushIdFrame::parse(&payload)
                .map(|frame| self.visitor.on_max_push_id_frame(frame)),
            FrameKind::ObsoletePriorityUpdate => PriorityUpdateFrame::parse_obsolete(&payload)
                .map(|frame| self.visitor.on_priority_update_frame(frame)),
            FrameKind::PriorityUpdate => PriorityUpdateFrame::parse(&payload)
                .map(|frame| self.visitor.on_priority_update_frame(frame)),
            FrameKind::AcceptCh => {
                AcceptChFrame::parse(&payload).map(|frame| self.visitor.on_accept_ch_frame(frame))
            }
            kind => {
                debug_assert!(false, "parse requested for streamed kind {kind:?}");
                Ok(true)
            }
        };

        match outcome {
            Ok(keep_going) => keep_going,
            Err(error) => {
                self.raise_error(error);
                false
            }
        }
    }

    fn reset_frame(&mut self) {
        // The frame type survives so owners can inspect what just finished.
        self.current_type_field_length = 0;
        self.current_length_field_length = 0;
        self.current_frame_length = 0;
        self.remaining_frame_length = 0;
        self.payload = FramePayload::Streamed;
        self.state = DecoderState::ReadingFrameType;
    }

    fn raise_error(&mut self, error: DecoderError) {
        debug!("frame decoding failed ({}): {error}", error.code());
        self.state = DecoderState::Error;
        self.visitor.on_error(&error);
        self.error = Some(error);
    }

    /// Wire type of the frame currently or most recently decoded.
    #[cfg(test)]
    pub(crate) const fn current_frame_type(&self) -> u64 { self.current_frame_type }
}

/// Decode a buffer expected to contain exactly one SETTINGS frame.
///
/// Runs a fresh decoder over `input` and returns the parsed settings map.
///
/// # Errors
///
/// Returns the decoder's error when the frame is malformed, or a generic
/// framing error when the input does not start with a SETTINGS frame or
/// ends before the frame is complete.
pub fn decode_settings(input: &[u8]) -> Result<SettingsFrame, DecoderError> {
    #[derive(Default)]
    struct Capture {
        frame: Option<SettingsFrame>,
    }

    impl FrameVisitor for Capture {
        fn on_settings_frame(&mut self, frame: SettingsFrame) -> bool {
            self.frame = Some(frame);
            // One frame is all we wanted.
            false
        }
    }

    let Some((frame_type, _)) = varint::read_varint62(input) else {
        return Err(DecoderError::frame("Incomplete SETTINGS frame."));
    };
    if frame_type != frames::SETTINGS {
        return Err(DecoderError::frame("Input does not begin with a SETTINGS frame."));
    }

    let mut decoder = FrameDecoder::new(Capture::default());
    decoder.process_input(input);
    if let Some(error) = decoder.error() {
        return Err(error.clone());
    }
    decoder
        .visitor_mut()
        .frame
        .take()
        .ok_or(DecoderError::frame("Incomplete SETTINGS frame."))
}
