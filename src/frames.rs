//! HTTP/3 frame types and the structured values surfaced to visitors.
//!
//! Every HTTP/3 frame is `type (varint62) || length (varint62) || payload`.
//! DATA, HEADERS, and unrecognised frames stream their payload straight to
//! the visitor; the frame kinds modelled here have their payload buffered by
//! the decoder and parsed whole, with the parsers in this module producing
//! the values handed to the single value callback.

use std::collections::HashMap;

use bytes::Bytes;

use crate::{error::DecoderError, varint};

/// DATA frame type (RFC 9114 §7.2.1).
pub const DATA: u64 = 0x00;
/// HEADERS frame type (RFC 9114 §7.2.2).
pub const HEADERS: u64 = 0x01;
/// CANCEL_PUSH frame type (RFC 9114 §7.2.3).
pub const CANCEL_PUSH: u64 = 0x03;
/// SETTINGS frame type (RFC 9114 §7.2.4).
pub const SETTINGS: u64 = 0x04;
/// PUSH_PROMISE frame type (RFC 9114 §7.2.5).
pub const PUSH_PROMISE: u64 = 0x05;
/// GOAWAY frame type (RFC 9114 §7.2.6).
pub const GOAWAY: u64 = 0x07;
/// MAX_PUSH_ID frame type (RFC 9114 §7.2.7).
pub const MAX_PUSH_ID: u64 = 0x0d;
/// PRIORITY_UPDATE as first drafted, carrying an element type byte in its
/// payload. Superseded by [`PRIORITY_UPDATE`].
pub const PRIORITY_UPDATE_OBSOLETE: u64 = 0x0f;
/// PRIORITY_UPDATE for request streams (RFC 9218); `80 0f 07 00` on the
/// wire.
pub const PRIORITY_UPDATE: u64 = 0xf_0700;
/// ACCEPT_CH frame type (HTTP client hints); `40 89` on the wire.
pub const ACCEPT_CH: u64 = 0x89;
/// WebTransport stream preface; only meaningful when
/// [`DecoderOptions::allow_web_transport_stream`](crate::DecoderOptions)
/// is set.
pub const WEBTRANSPORT_STREAM: u64 = 0x41;

/// Whether `frame_type` is defined by HTTP/2 and therefore forbidden on an
/// HTTP/3 stream (PRIORITY, PING, WINDOW_UPDATE, CONTINUATION).
pub(crate) const fn is_http2_only_type(frame_type: u64) -> bool {
    matches!(frame_type, 0x02 | 0x06 | 0x08 | 0x09)
}

/// SETTINGS frame: an identifier/value map (RFC 9114 §7.2.4).
///
/// Identifiers are surfaced verbatim, including ones this crate knows
/// nothing about; filtering is the consumer's business.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsFrame {
    /// Raw identifier-to-value map.
    pub values: HashMap<u64, u64>,
}

impl SettingsFrame {
    pub(crate) fn parse(payload: &Bytes) -> Result<Self, DecoderError> {
        let mut values = HashMap::new();
        let mut rest: &[u8] = payload;
        while !rest.is_empty() {
            let (identifier, len) = varint::read_varint62(rest)
                .ok_or(DecoderError::frame("Unable to read setting identifier."))?;
            rest = &rest[len..];
            let (value, len) = varint::read_varint62(rest)
                .ok_or(DecoderError::frame("Unable to read setting value."))?;
            rest = &rest[len..];
            if values.insert(identifier, value).is_some() {
                return Err(DecoderError::DuplicateSettingIdentifier);
            }
        }
        Ok(Self { values })
    }
}

/// CANCEL_PUSH frame: the push id being cancelled (RFC 9114 §7.2.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelPushFrame {
    /// Identifier of the cancelled push.
    pub push_id: u64,
}

impl CancelPushFrame {
    pub(crate) fn parse(payload: &Bytes) -> Result<Self, DecoderError> {
        read_sole_varint(
            payload,
            "Unable to read CANCEL_PUSH push_id.",
            "Superfluous data in CANCEL_PUSH frame.",
        )
        .map(|push_id| Self { push_id })
    }
}

/// GOAWAY frame: the last stream or push id the sender will process
/// (RFC 9114 §5.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GoAwayFrame {
    /// Stream id or push id, depending on which endpoint sent the frame.
    pub id: u64,
}

impl GoAwayFrame {
    pub(crate) fn parse(payload: &Bytes) -> Result<Self, DecoderError> {
        read_sole_varint(
            payload,
            "Unable to read GOAWAY ID.",
            "Superfluous data in GOAWAY frame.",
        )
        .map(|id| Self { id })
    }
}

/// MAX_PUSH_ID frame: the highest push id the client will accept
/// (RFC 9114 §7.2.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaxPushIdFrame {
    /// Highest permitted push id.
    pub push_id: u64,
}

impl MaxPushIdFrame {
    pub(crate) fn parse(payload: &Bytes) -> Result<Self, DecoderError> {
        read_sole_varint(
            payload,
            "Unable to read MAX_PUSH_ID push_id.",
            "Superfluous data in MAX_PUSH_ID frame.",
        )
        .map(|push_id| Self { push_id })
    }
}

/// Kind of element a PRIORITY_UPDATE frame addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrioritizedElementType {
    /// A request stream; the only kind the current encoding can express.
    RequestStream,
    /// A server push; expressible only in the obsolete encoding.
    PushStream,
}

/// PRIORITY_UPDATE frame (RFC 9218, plus the obsolete 0x0f draft shape).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriorityUpdateFrame {
    /// What the update addresses.
    pub prioritized_element_type: PrioritizedElementType,
    /// Stream id or push id of the addressed element.
    pub prioritized_element_id: u64,
    /// Priority field value, an opaque byte string at this layer.
    pub priority_field_value: Bytes,
}

impl PriorityUpdateFrame {
    /// Parse the obsolete encoding: element type byte, element id varint,
    /// field value to end of payload.
    pub(crate) fn parse_obsolete(payload: &Bytes) -> Result<Self, DecoderError> {
        let Some(&type_byte) = payload.first() else {
            return Err(DecoderError::frame(
                "Unable to read prioritized element type.",
            ));
        };
        let prioritized_element_type = match type_byte {
            0x00 => PrioritizedElementType::RequestStream,
            0x80 => PrioritizedElementType::PushStream,
            _ => return Err(DecoderError::frame("Invalid prioritized element type.")),
        };
        let (prioritized_element_id, id_len) = varint::read_varint62(&payload[1..])
            .ok_or(DecoderError::frame("Unable to read prioritized element id."))?;
        Ok(Self {
            prioritized_element_type,
            prioritized_element_id,
            priority_field_value: payload.slice(1 + id_len..),
        })
    }

    /// Parse the current encoding: element id varint, field value to end of
    /// payload. The element type is implicitly a request stream.
    pub(crate) fn parse(payload: &Bytes) -> Result<Self, DecoderError> {
        let (prioritized_element_id, id_len) = varint::read_varint62(payload)
            .ok_or(DecoderError::frame("Unable to read prioritized element id."))?;
        Ok(Self {
            prioritized_element_type: PrioritizedElementType::RequestStream,
            prioritized_element_id,
            priority_field_value: payload.slice(id_len..),
        })
    }
}

/// One origin/value pair in an ACCEPT_CH frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptChEntry {
    /// Origin the hints apply to.
    pub origin: Bytes,
    /// Accept-CH header value for that origin.
    pub value: Bytes,
}

/// ACCEPT_CH frame: client-hint advertisements per origin.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptChFrame {
    /// Entries in wire order; an empty payload yields an empty list.
    pub entries: Vec<AcceptChEntry>,
}

impl AcceptChFrame {
    pub(crate) fn parse(payload: &Bytes) -> Result<Self, DecoderError> {
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < payload.len() {
            let origin =
                read_length_prefixed(payload, &mut offset, "Unable to read ACCEPT_CH origin.")?;
            let value =
                read_length_prefixed(payload, &mut offset, "Unable to read ACCEPT_CH value.")?;
            entries.push(AcceptChEntry { origin, value });
        }
        Ok(Self { entries })
    }
}

/// Parse a payload that must hold exactly one varint62.
fn read_sole_varint(
    payload: &[u8],
    truncated: &'static str,
    superfluous: &'static str,
) -> Result<u64, DecoderError> {
    let (value, len) = varint::read_varint62(payload).ok_or(DecoderError::frame(truncated))?;
    if len != payload.len() {
        return Err(DecoderError::frame(superfluous));
    }
    Ok(value)
}

/// Read a varint-length-prefixed byte string starting at `*offset`,
/// advancing the offset past it.
fn read_length_prefixed(
    payload: &Bytes,
    offset: &mut usize,
    detail: &'static str,
) -> Result<Bytes, DecoderError> {
    let (length, length_len) =
        varint::read_varint62(&payload[*offset..]).ok_or(DecoderError::frame(detail))?;
    let start = *offset + length_len;
    let end = usize::try_from(length)
        .ok()
        .and_then(|length| start.checked_add(length))
        .ok_or(DecoderError::frame(detail))?;
    if end > payload.len() {
        return Err(DecoderError::frame(detail));
    }
    *offset = end;
    Ok(payload.slice(start..end))
}
