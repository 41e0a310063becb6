//! Generated checks for the frame decoder's universal properties.
//!
//! Chunking invariance is the load-bearing one: for any frame sequence and
//! any partition of its wire image, the decoder must produce the same
//! callbacks and the same error outcome as a single whole-buffer call.
//! Payload fragments are compared coalesced, since fragment boundaries are
//! explicitly unspecified.

use std::collections::BTreeMap;

use bytes::BytesMut;
use h3frame::{
    varint::{put_varint62, MAX_VARINT62},
    AcceptChFrame,
    CancelPushFrame,
    DecoderError,
    FrameDecoder,
    FrameVisitor,
    GoAwayFrame,
    MaxPushIdFrame,
    SettingsFrame,
};
use proptest::{
    collection::{btree_map, vec},
    prelude::{any, prop_oneof, Strategy},
    sample::Index,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestCaseError, TestRng, TestRunner},
};
use rstest::rstest;

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    let rng = TestRng::deterministic_rng(RngAlgorithm::ChaCha);
    TestRunner::new_with_rng(config, rng)
}

#[derive(Clone, Debug, PartialEq)]
enum TraceEvent {
    Error(DecoderError),
    Settings(SettingsFrame),
    SettingsStart(usize),
    DataStart(usize, u64),
    DataPayload(Vec<u8>),
    DataEnd,
    HeadersStart(usize, u64),
    HeadersPayload(Vec<u8>),
    HeadersEnd,
    CancelPush(CancelPushFrame),
    GoAway(GoAwayFrame),
    MaxPushId(MaxPushIdFrame),
    PushPromiseStart(usize),
    PushPromisePushId(u64, usize, u64),
    PushPromisePayload(Vec<u8>),
    PushPromiseEnd,
    AcceptChStart(usize),
    AcceptCh(AcceptChFrame),
    UnknownStart(u64, usize, u64),
    UnknownPayload(Vec<u8>),
    UnknownEnd,
}

/// Records every callback; never pauses.
#[derive(Debug, Default)]
struct TraceVisitor {
    trace: Vec<TraceEvent>,
}

impl FrameVisitor for TraceVisitor {
    fn on_error(&mut self, error: &DecoderError) {
        self.trace.push(TraceEvent::Error(error.clone()));
    }

    fn on_settings_frame_start(&mut self, header_length: usize) -> bool {
        self.trace.push(TraceEvent::SettingsStart(header_length));
        true
    }

    fn on_settings_frame(&mut self, frame: SettingsFrame) -> bool {
        self.trace.push(TraceEvent::Settings(frame));
        true
    }

    fn on_data_frame_start(&mut self, header_length: usize, payload_length: u64) -> bool {
        self.trace
            .push(TraceEvent::DataStart(header_length, payload_length));
        true
    }

    fn on_data_frame_payload(&mut self, payload: &[u8]) -> bool {
        self.trace.push(TraceEvent::DataPayload(payload.to_vec()));
        true
    }

    fn on_data_frame_end(&mut self) -> bool {
        self.trace.push(TraceEvent::DataEnd);
        true
    }

    fn on_headers_frame_start(&mut self, header_length: usize, payload_length: u64) -> bool {
        self.trace
            .push(TraceEvent::HeadersStart(header_length, payload_length));
        true
    }

    fn on_headers_frame_payload(&mut self, payload: &[u8]) -> bool {
        self.trace.push(TraceEvent::HeadersPayload(payload.to_vec()));
        true
    }

    fn on_headers_frame_end(&mut self) -> bool {
        self.trace.push(TraceEvent::HeadersEnd);
        true
    }

    fn on_cancel_push_frame(&mut self, frame: CancelPushFrame) -> bool {
        self.trace.push(TraceEvent::CancelPush(frame));
        true
    }

    fn on_goaway_frame(&mut self, frame: GoAwayFrame) -> bool {
        self.trace.push(TraceEvent::GoAway(frame));
        true
    }

    fn on_max_push_id_frame(&mut self, frame: MaxPushIdFrame) -> bool {
        self.trace.push(TraceEvent::MaxPushId(frame));
        true
    }

    fn on_push_promise_frame_start(&mut self, header_length: usize) -> bool {
        self.trace.push(TraceEvent::PushPromiseStart(header_length));
        true
    }

    fn on_push_promise_frame_push_id(
        &mut self,
        push_id: u64,
        push_id_length: usize,
        header_block_length: u64,
    ) -> bool {
        self.trace.push(TraceEvent::PushPromisePushId(
            push_id,
            push_id_length,
            header_block_length,
        ));
        true
    }

    fn on_push_promise_frame_payload(&mut self, payload: &[u8]) -> bool {
        self.trace
            .push(TraceEvent::PushPromisePayload(payload.to_vec()));
        true
    }

    fn on_push_promise_frame_end(&mut self) -> bool {
        self.trace.push(TraceEvent::PushPromiseEnd);
        true
    }

    fn on_accept_ch_frame_start(&mut self, header_length: usize) -> bool {
        self.trace.push(TraceEvent::AcceptChStart(header_length));
        true
    }

    fn on_accept_ch_frame(&mut self, frame: AcceptChFrame) -> bool {
        self.trace.push(TraceEvent::AcceptCh(frame));
        true
    }

    fn on_unknown_frame_start(
        &mut self,
        frame_type: u64,
        header_length: usize,
        payload_length: u64,
    ) -> bool {
        self.trace.push(TraceEvent::UnknownStart(
            frame_type,
            header_length,
            payload_length,
        ));
        true
    }

    fn on_unknown_frame_payload(&mut self, payload: &[u8]) -> bool {
        self.trace.push(TraceEvent::UnknownPayload(payload.to_vec()));
        true
    }

    fn on_unknown_frame_end(&mut self) -> bool {
        self.trace.push(TraceEvent::UnknownEnd);
        true
    }
}

/// Coalesce consecutive payload fragments so traces compare by content
/// rather than by delivery granularity.
fn normalise(trace: Vec<TraceEvent>) -> Vec<TraceEvent> {
    let mut merged: Vec<TraceEvent> = Vec::with_capacity(trace.len());
    for event in trace {
        match (merged.last_mut(), event) {
            (Some(TraceEvent::DataPayload(acc)), TraceEvent::DataPayload(more)) => {
                acc.extend_from_slice(&more);
            }
            (Some(TraceEvent::HeadersPayload(acc)), TraceEvent::HeadersPayload(more)) => {
                acc.extend_from_slice(&more);
            }
            (
                Some(TraceEvent::PushPromisePayload(acc)),
                TraceEvent::PushPromisePayload(more),
            ) => {
                acc.extend_from_slice(&more);
            }
            (Some(TraceEvent::UnknownPayload(acc)), TraceEvent::UnknownPayload(more)) => {
                acc.extend_from_slice(&more);
            }
            (_, event) => merged.push(event),
        }
    }
    merged
}

#[derive(Clone, Debug)]
enum FrameSpec {
    Data(Vec<u8>),
    Headers(Vec<u8>),
    Unknown { frame_type: u64, payload: Vec<u8> },
    Settings(BTreeMap<u64, u64>),
    CancelPush(u64),
    GoAway(u64),
    MaxPushId(u64),
    PushPromise { push_id: u64, header_block: Vec<u8> },
    AcceptCh(Vec<(Vec<u8>, Vec<u8>)>),
}

fn encode_frame(spec: &FrameSpec, wire: &mut BytesMut) {
    let mut payload = BytesMut::new();
    let frame_type = match spec {
        FrameSpec::Data(body) => {
            payload.extend_from_slice(body);
            0x00
        }
        FrameSpec::Headers(body) => {
            payload.extend_from_slice(body);
            0x01
        }
        FrameSpec::Unknown {
            frame_type,
            payload: body,
        } => {
            payload.extend_from_slice(body);
            *frame_type
        }
        FrameSpec::Settings(values) => {
            for (&identifier, &value) in values {
                put_varint62(&mut payload, identifier);
                put_varint62(&mut payload, value);
            }
            0x04
        }
        FrameSpec::CancelPush(push_id) => {
            put_varint62(&mut payload, *push_id);
            0x03
        }
        FrameSpec::GoAway(id) => {
            put_varint62(&mut payload, *id);
            0x07
        }
        FrameSpec::MaxPushId(push_id) => {
            put_varint62(&mut payload, *push_id);
            0x0d
        }
        FrameSpec::PushPromise {
            push_id,
            header_block,
        } => {
            put_varint62(&mut payload, *push_id);
            payload.extend_from_slice(header_block);
            0x05
        }
        FrameSpec::AcceptCh(entries) => {
            for (origin, value) in entries {
                put_varint62(&mut payload, origin.len() as u64);
                payload.extend_from_slice(origin);
                put_varint62(&mut payload, value.len() as u64);
                payload.extend_from_slice(value);
            }
            0x89
        }
    };
    put_varint62(wire, frame_type);
    put_varint62(wire, payload.len() as u64);
    wire.extend_from_slice(&payload);
}

fn varint_value() -> impl Strategy<Value = u64> {
    any::<u64>().prop_map(|value| value & MAX_VARINT62)
}

fn frame_spec() -> impl Strategy<Value = FrameSpec> {
    let body = vec(any::<u8>(), 0..64);
    prop_oneof![
        body.clone().prop_map(FrameSpec::Data),
        body.clone().prop_map(FrameSpec::Headers),
        // Unassigned types clear of every recognised code.
        (0x15u64..0x20, body.clone()).prop_map(|(frame_type, payload)| FrameSpec::Unknown {
            frame_type,
            payload,
        }),
        btree_map(0u64..1024, varint_value(), 0..4).prop_map(FrameSpec::Settings),
        varint_value().prop_map(FrameSpec::CancelPush),
        varint_value().prop_map(FrameSpec::GoAway),
        varint_value().prop_map(FrameSpec::MaxPushId),
        (varint_value(), vec(any::<u8>(), 0..32)).prop_map(|(push_id, header_block)| {
            FrameSpec::PushPromise {
                push_id,
                header_block,
            }
        }),
        vec((vec(any::<u8>(), 0..8), vec(any::<u8>(), 0..8)), 0..3)
            .prop_map(FrameSpec::AcceptCh),
    ]
}

fn wire_image(frames: &[FrameSpec]) -> Vec<u8> {
    let mut wire = BytesMut::new();
    for spec in frames {
        encode_frame(spec, &mut wire);
    }
    wire.to_vec()
}

/// Split positions for a wire image, derived from arbitrary indices.
fn cut_points(cuts: &[Index], len: usize) -> Vec<usize> {
    let mut positions: Vec<usize> = cuts.iter().map(|cut| cut.index(len + 1)).collect();
    positions.sort_unstable();
    positions.dedup();
    positions
}

fn run_whole(input: &[u8]) -> (usize, Vec<TraceEvent>, Option<DecoderError>) {
    let mut decoder = FrameDecoder::new(TraceVisitor::default());
    let consumed = decoder.process_input(input);
    let error = decoder.error().cloned();
    (consumed, std::mem::take(&mut decoder.visitor_mut().trace), error)
}

fn run_chunked(input: &[u8], positions: &[usize]) -> (usize, Vec<TraceEvent>, Option<DecoderError>) {
    let mut decoder = FrameDecoder::new(TraceVisitor::default());
    let mut consumed = 0;
    let mut start = 0;
    for &position in positions.iter().chain(std::iter::once(&input.len())) {
        if position <= start {
            continue;
        }
        let chunk = &input[start..position];
        let taken = decoder.process_input(chunk);
        assert!(taken <= chunk.len(), "consumed beyond the chunk");
        consumed += taken;
        if taken < chunk.len() {
            // An error stopped the decoder; later bytes must be ignored.
            break;
        }
        start = position;
    }
    let error = decoder.error().cloned();
    (consumed, std::mem::take(&mut decoder.visitor_mut().trace), error)
}

#[rstest]
#[case::small_batches(128)]
#[case::larger_batches(64)]
fn chunking_never_changes_the_outcome(#[case] cases: u32) {
    let mut runner = deterministic_runner(cases);
    let strategy = (vec(frame_spec(), 1..5), vec(any::<Index>(), 0..8));

    runner
        .run(&strategy, |(frames, cuts)| {
            let wire = wire_image(&frames);
            let positions = cut_points(&cuts, wire.len());

            let (whole_consumed, whole_trace, whole_error) = run_whole(&wire);
            if whole_error.is_some() {
                return Err(TestCaseError::fail(format!(
                    "generated frames should decode cleanly: {whole_error:?}"
                )));
            }
            if whole_consumed != wire.len() {
                return Err(TestCaseError::fail("whole-buffer feed left bytes behind"));
            }

            let (chunked_consumed, chunked_trace, chunked_error) =
                run_chunked(&wire, &positions);
            if chunked_error.is_some() {
                return Err(TestCaseError::fail(format!(
                    "chunked feed raised an error: {chunked_error:?}"
                )));
            }
            if chunked_consumed != wire.len() {
                return Err(TestCaseError::fail("chunked feed left bytes behind"));
            }
            if normalise(whole_trace) != normalise(chunked_trace) {
                return Err(TestCaseError::fail("traces diverged between feeds"));
            }
            Ok(())
        })
        .expect("chunking invariance should hold for generated frame sequences");
}

/// Malformed inputs paired with the error they must produce, fed whole and
/// under generated partitions.
fn corrupt_inputs() -> Vec<(Vec<u8>, DecoderError)> {
    vec![
        (
            vec![0x03, 0x01, 0x40],
            DecoderError::Frame {
                detail: "Unable to read CANCEL_PUSH push_id.",
            },
        ),
        (
            vec![0x07, 0x04, 0x05, b'f', b'o', b'o'],
            DecoderError::Frame {
                detail: "Superfluous data in GOAWAY frame.",
            },
        ),
        (
            vec![0x04, 0x04, 0x01, 0x01, 0x01, 0x02],
            DecoderError::DuplicateSettingIdentifier,
        ),
        (
            vec![0x06, 0x05, 0x15],
            DecoderError::Http2Frame { frame_type: 6 },
        ),
        (
            vec![0x05, 0x01, 0x40],
            DecoderError::Frame {
                detail: "Unable to read PUSH_PROMISE push_id.",
            },
        ),
        (vec![0x03, 0x10, 0x15], DecoderError::FrameTooLarge),
    ]
}

#[test]
fn errors_are_partition_independent() {
    let corrupt = corrupt_inputs();
    let mut runner = deterministic_runner(96);
    let strategy = (0..corrupt.len(), vec(any::<Index>(), 0..6));

    runner
        .run(&strategy, |(which, cuts)| {
            let (input, expected) = &corrupt[which];
            let positions = cut_points(&cuts, input.len());

            let (_, whole_trace, whole_error) = run_whole(input);
            let (_, chunked_trace, chunked_error) = run_chunked(input, &positions);

            if whole_error.as_ref() != Some(expected) {
                return Err(TestCaseError::fail(format!(
                    "whole feed produced {whole_error:?}, expected {expected:?}"
                )));
            }
            if chunked_error.as_ref() != Some(expected) {
                return Err(TestCaseError::fail(format!(
                    "chunked feed produced {chunked_error:?}, expected {expected:?}"
                )));
            }
            if normalise(whole_trace) != normalise(chunked_trace) {
                return Err(TestCaseError::fail("corrupt traces diverged between feeds"));
            }
            Ok(())
        })
        .expect("error outcomes should not depend on input partitioning");
}

#[test]
fn errors_stay_sticky_under_further_input() {
    for (input, expected) in corrupt_inputs() {
        let mut decoder = FrameDecoder::new(TraceVisitor::default());
        decoder.process_input(&input);
        assert_eq!(decoder.error(), Some(&expected));

        let events_after_error = decoder.visitor_mut().trace.len();
        assert_eq!(decoder.process_input(b"\x00\x05Data!"), 0);
        assert_eq!(decoder.process_input(&[]), 0);
        assert_eq!(decoder.visitor_mut().trace.len(), events_after_error);
    }
}
