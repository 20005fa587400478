//! Dispatch engine behaviour over in-memory channels.

use std::io;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use mockall::mock;
use rstest::{fixture, rstest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use courier_config::MapConfigSource;
use courier_wire::codec::{CborCodec, JsonCodec};
use courier_wire::document::{self, Document};
use courier_wire::{
    Binary, CloseStatus, Codec, CorrelationId, Envelope, Frame, PROTOCOL_VERSION, Version,
};

use crate::components::ComponentGraphBuilder;
use crate::registry::{ModuleDefinition, OperationDefinition, OperationRegistry, ServiceDefinition};
use crate::session::{ConnectionHandle, SessionListener};

use super::*;

#[derive(Debug, Default)]
struct Greeter;

#[derive(Debug)]
struct Visitor {
    peer: String,
    presence: Mutex<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct Greeting {
    message: String,
}

#[derive(Debug, Serialize)]
struct Tick {
    n: u32,
}

#[derive(Debug, Deserialize)]
struct Stamp {
    data: Binary,
}

#[derive(Debug, Deserialize)]
struct Presence {
    status: String,
}

#[derive(Debug, Error)]
#[error("greeting refused: {reason}")]
struct Refused {
    reason: String,
}

impl MarshalableError for Refused {
    fn protocol_message_type(&self) -> &str {
        "core.greeter.refused"
    }

    fn details(&self) -> Vec<(String, Document)> {
        vec![("reason".to_owned(), Document::Text(self.reason.clone()))]
    }
}

type Op = OperationDefinition<Greeter, Visitor>;

fn greeter_module() -> ModuleDefinition<Visitor> {
    let greet: Op = OperationDefinition::unary("greet", |_: &Greeter, call| {
        let name = call.arg::<String>("name")?;
        let title = call.optional_arg::<String>("title")?;
        let message = match title {
            Some(title) => format!("hello {title} {name}"),
            None => format!("hello {name}"),
        };
        Ok(Greeting { message })
    })
    .param::<String>("name")
    .optional::<String>("title");

    let upload: Op = OperationDefinition::unary("upload", |_: &Greeter, call| {
        Ok(call.arg::<Vec<u8>>("data")?.len())
    })
    .bytes("data");

    let stamp: Op = OperationDefinition::unary("stamp", |_: &Greeter, call| {
        Ok(call.arg::<Stamp>("stamp")?.data.as_bytes().len())
    })
    .param::<Stamp>("stamp");

    let forget: Op = OperationDefinition::unary("forget", |_: &Greeter, _call| Ok(()));

    let count_down: Op =
        OperationDefinition::streaming::<Tick, _>("countDown", |_: &Greeter, call, emitter| {
            let from = call.arg::<u32>("from")?;
            for n in (1..=from).rev() {
                emitter.emit(".tick", &Tick { n })?;
            }
            Ok(())
        })
        .param::<u32>("from");

    let refuse: Op = OperationDefinition::unary("refuse", |_: &Greeter, _call| {
        Err::<(), _>(
            Refused {
                reason: "closed".to_owned(),
            }
            .into(),
        )
    });

    let crash: Op = OperationDefinition::unary("crash", |_: &Greeter, _call| {
        Err::<(), _>(anyhow!("database password rejected").into())
    });

    let explode: Op =
        OperationDefinition::unary("explode", |_: &Greeter, _call| -> Result<(), OperationError> {
            panic!("handler blew up")
        });

    let whoami: Op = OperationDefinition::unary("whoami", |_: &Greeter, call: &mut Call<'_, Visitor>| {
        Ok(format!("{}@{}", call.session().peer, call.connection().peer()))
    })
    .result_type(".identity");

    let service = [
        greet, upload, stamp, forget, count_down, refuse, crash, explode, whoami,
    ]
    .into_iter()
    .fold(ServiceDefinition::new("greeter"), ServiceDefinition::operation);
    ModuleDefinition::new("core").service(service)
}

fn dispatcher() -> Dispatcher<Visitor> {
    let graph = ComponentGraphBuilder::new(Arc::new(MapConfigSource::new()))
        .instance(Greeter)
        .build()
        .expect("graph builds");
    let registry = OperationRegistry::build([greeter_module()], &graph).expect("registry");
    Dispatcher::new(registry, |connection: &ConnectionHandle| Visitor {
        peer: connection.peer().to_owned(),
        presence: Mutex::new(Vec::new()),
    })
}

struct Harness {
    dispatcher: Dispatcher<Visitor>,
    connection: ConnectionHandle,
}

impl Harness {
    fn new(dispatcher: Dispatcher<Visitor>) -> Self {
        let connection = ConnectionHandle::new("127.0.0.1:4000", "json");
        dispatcher
            .create_session(&connection)
            .expect("session created");
        Self {
            dispatcher,
            connection,
        }
    }

    fn send(&self, codec: &dyn Codec, envelope: &Envelope) -> Result<Vec<Envelope>, DispatchError> {
        let frame = codec.encode(envelope).expect("encode request");
        self.send_frame(codec, &frame)
    }

    fn send_frame(&self, codec: &dyn Codec, frame: &Frame) -> Result<Vec<Envelope>, DispatchError> {
        let mut channel = CollectingChannel::default();
        self.dispatcher
            .dispatch(&self.connection, frame, codec, &mut channel)?;
        Ok(channel
            .into_frames()
            .iter()
            .map(|frame| codec.decode(frame).expect("decode response"))
            .collect())
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new(dispatcher())
}

fn request(message_type: &str, payload: Option<Document>) -> Envelope {
    Envelope::new(
        Version::new(2, 5, 0),
        CorrelationId::new(vec![0xca, 0xfe]),
        message_type,
        payload,
    )
}

fn payload<const N: usize>(entries: [(&str, Document); N]) -> Option<Document> {
    Some(document::map(entries))
}

fn text(value: &str) -> Document {
    Document::Text(value.to_owned())
}

fn field<'a>(envelope: &'a Envelope, name: &str) -> Option<&'a Document> {
    envelope
        .payload
        .as_ref()
        .and_then(|payload| document::field(payload, name))
}

fn single(responses: Vec<Envelope>) -> Envelope {
    let mut responses = responses.into_iter();
    let response = responses.next().expect("one response");
    assert!(responses.next().is_none(), "expected exactly one response");
    response
}

#[rstest]
#[case::json(Arc::new(JsonCodec) as Arc<dyn Codec>)]
#[case::cbor(Arc::new(CborCodec) as Arc<dyn Codec>)]
fn unary_results_echo_the_correlation_id(harness: Harness, #[case] codec: Arc<dyn Codec>) {
    let response = single(
        harness
            .send(
                codec.as_ref(),
                &request("core.greeter.greet", payload([("name", text("ada"))])),
            )
            .expect("dispatch"),
    );

    assert_eq!(response.correlation_id, CorrelationId::new(vec![0xca, 0xfe]));
    assert_eq!(response.message_type, "core.greeter.greet-result");
    assert_eq!(response.protocol_version, PROTOCOL_VERSION);
    assert_eq!(field(&response, "message"), Some(&text("hello ada")));
}

#[rstest]
fn optional_parameters_bind_when_present(harness: Harness) {
    let response = single(
        harness
            .send(
                &JsonCodec,
                &request(
                    "core.greeter.greet",
                    payload([("name", text("ada")), ("title", text("countess"))]),
                ),
            )
            .expect("dispatch"),
    );
    assert_eq!(field(&response, "message"), Some(&text("hello countess ada")));
}

#[test]
fn responses_carry_the_configured_release_version() {
    let harness = Harness::new(dispatcher().with_release_version(Version::new(3, 1, 4)));
    let response = single(
        harness
            .send(
                &CborCodec,
                &request("core.greeter.greet", payload([("name", text("ada"))])),
            )
            .expect("dispatch"),
    );
    assert_eq!(response.release_version, Version::new(3, 1, 4));
}

#[rstest]
fn unknown_message_types_get_a_structured_error(harness: Harness) {
    let response = single(
        harness
            .send(&JsonCodec, &request("core.greeter.missing", None))
            .expect("dispatch"),
    );
    assert_eq!(response.message_type, "core.error.unknown-message-type");
    assert_eq!(response.correlation_id, CorrelationId::new(vec![0xca, 0xfe]));
    assert_eq!(
        field(&response, "messageType"),
        Some(&text("core.greeter.missing"))
    );
}

#[rstest]
#[case::absent(None)]
#[case::empty(payload([]))]
#[case::null(payload([("name", Document::Null)]))]
fn required_parameters_must_be_present(harness: Harness, #[case] body: Option<Document>) {
    let response = single(
        harness
            .send(&CborCodec, &request("core.greeter.greet", body))
            .expect("dispatch"),
    );
    assert_eq!(response.message_type, "core.error.missing-parameter");
    assert_eq!(field(&response, "parameter"), Some(&text("name")));
    assert!(field(&response, "message").is_some());
}

#[rstest]
fn mistyped_parameters_are_reported(harness: Harness) {
    let response = single(
        harness
            .send(
                &JsonCodec,
                &request("core.greeter.count-down", payload([("from", text("three"))])),
            )
            .expect("dispatch"),
    );
    assert_eq!(response.message_type, "core.error.invalid-parameter-format");
    assert_eq!(field(&response, "parameter"), Some(&text("from")));
}

#[rstest]
#[case::standard(text("AQID"), 3)]
#[case::url_safe(text("-_8"), 2)]
fn top_level_byte_parameters_accept_both_base64_alphabets(
    harness: Harness,
    #[case] data: Document,
    #[case] expected: u64,
) {
    let response = single(
        harness
            .send(
                &JsonCodec,
                &request("core.greeter.upload", payload([("data", data)])),
            )
            .expect("dispatch"),
    );
    assert_eq!(response.message_type, "core.greeter.upload-result");
    assert_eq!(response.payload, Some(Document::Integer(expected.into())));
}

#[rstest]
fn nested_binary_fields_accept_standard_base64(harness: Harness) {
    let stamp = document::map([("data", text("AQID"))]);
    let response = single(
        harness
            .send(
                &JsonCodec,
                &request("core.greeter.stamp", payload([("stamp", stamp)])),
            )
            .expect("dispatch"),
    );
    assert_eq!(response.payload, Some(Document::Integer(3_u64.into())));
}

#[rstest]
fn nested_binary_fields_do_not_fall_back_to_url_safe(harness: Harness) {
    let stamp = document::map([("data", text("-_8"))]);
    let response = single(
        harness
            .send(
                &JsonCodec,
                &request("core.greeter.stamp", payload([("stamp", stamp)])),
            )
            .expect("dispatch"),
    );
    assert_eq!(response.message_type, "core.error.invalid-parameter-format");
}

#[rstest]
#[case::json(Arc::new(JsonCodec) as Arc<dyn Codec>)]
#[case::cbor(Arc::new(CborCodec) as Arc<dyn Codec>)]
fn streaming_operations_emit_items_in_order(harness: Harness, #[case] codec: Arc<dyn Codec>) {
    let responses = harness
        .send(
            codec.as_ref(),
            &request(
                "core.greeter.count-down",
                payload([("from", Document::Integer(3.into()))]),
            ),
        )
        .expect("dispatch");

    let ticks: Vec<_> = responses
        .iter()
        .map(|response| {
            assert_eq!(response.message_type, "core.greeter.tick");
            assert_eq!(response.correlation_id, CorrelationId::new(vec![0xca, 0xfe]));
            field(response, "n").cloned()
        })
        .collect();
    assert_eq!(
        ticks,
        [3, 2, 1].map(|n: u32| Some(Document::Integer(n.into())))
    );
}

#[rstest]
fn empty_streams_send_nothing(harness: Harness) {
    let responses = harness
        .send(
            &CborCodec,
            &request(
                "core.greeter.count-down",
                payload([("from", Document::Integer(0.into()))]),
            ),
        )
        .expect("dispatch");
    assert!(responses.is_empty());
}

#[rstest]
fn void_operations_answer_without_a_payload(harness: Harness) {
    let response = single(
        harness
            .send(&JsonCodec, &request("core.greeter.forget", None))
            .expect("dispatch"),
    );
    assert_eq!(response.message_type, "core.greeter.forget-result");
    assert_eq!(response.payload, None);
}

#[rstest]
fn result_type_overrides_name_the_response(harness: Harness) {
    let response = single(
        harness
            .send(&JsonCodec, &request("core.greeter.whoami", None))
            .expect("dispatch"),
    );
    assert_eq!(response.message_type, "core.greeter.identity");
    assert_eq!(
        response.payload,
        Some(text("127.0.0.1:4000@127.0.0.1:4000"))
    );
}

#[rstest]
fn structured_errors_become_error_envelopes(harness: Harness) {
    let response = single(
        harness
            .send(&CborCodec, &request("core.greeter.refuse", None))
            .expect("dispatch"),
    );
    assert_eq!(response.message_type, "core.greeter.refused");
    assert_eq!(response.correlation_id, CorrelationId::new(vec![0xca, 0xfe]));
    assert_eq!(
        field(&response, "message"),
        Some(&text("greeting refused: closed"))
    );
    assert_eq!(field(&response, "reason"), Some(&text("closed")));
}

#[rstest]
#[case::error("core.greeter.crash")]
#[case::panic("core.greeter.explode")]
fn internal_failures_hide_their_detail(harness: Harness, #[case] message_type: &str) {
    let response = single(
        harness
            .send(&JsonCodec, &request(message_type, None))
            .expect("dispatch"),
    );
    assert_eq!(response.message_type, "core.error.internal-server-error");
    assert_eq!(response.correlation_id, CorrelationId::new(vec![0xca, 0xfe]));
    assert_eq!(
        field(&response, "message"),
        Some(&text("internal server error"))
    );
}

#[rstest]
fn the_connection_survives_failed_operations(harness: Harness) {
    harness
        .send(&JsonCodec, &request("core.greeter.explode", None))
        .expect("first dispatch");
    let response = single(
        harness
            .send(
                &JsonCodec,
                &request("core.greeter.greet", payload([("name", text("bob"))])),
            )
            .expect("second dispatch"),
    );
    assert_eq!(response.message_type, "core.greeter.greet-result");
}

#[test]
fn control_listeners_bypass_the_registry() {
    let mut dispatcher = dispatcher();
    dispatcher.put_message_listener::<Presence, _>(
        "presence.update",
        |_connection, session: &Visitor, presence| {
            session
                .presence
                .lock()
                .expect("presence lock")
                .push(presence.status);
        },
    );
    let harness = Harness::new(dispatcher);

    let responses = harness
        .send(
            &JsonCodec,
            &request("presence.update", payload([("status", text("away"))])),
        )
        .expect("dispatch");
    assert!(responses.is_empty());

    let malformed = harness
        .send(&JsonCodec, &request("presence.update", None))
        .expect("dispatch");
    assert!(malformed.is_empty());

    let session = harness
        .dispatcher
        .sessions()
        .get(harness.connection.id())
        .expect("store")
        .expect("session");
    assert_eq!(*session.presence.lock().expect("presence lock"), ["away"]);
}

#[rstest]
fn messages_without_a_session_end_the_connection(harness: Harness) {
    let stranger = ConnectionHandle::new("10.0.0.1:1", "json");
    let frame = JsonCodec
        .encode(&request("core.greeter.forget", None))
        .expect("encode");
    let mut channel = CollectingChannel::default();
    let error = harness
        .dispatcher
        .dispatch(&stranger, &frame, &JsonCodec, &mut channel)
        .expect_err("no session");
    assert!(matches!(error, DispatchError::NoSession { .. }));
    assert_eq!(error.close_status(), CloseStatus::POLICY_VIOLATION);
    assert!(channel.frames().is_empty());
}

#[rstest]
fn mismatched_protocol_major_versions_end_the_connection(harness: Harness) {
    let mut envelope = request("core.greeter.forget", None);
    envelope.protocol_version = Version::new(PROTOCOL_VERSION.major() + 1, 0, 0);
    let error = harness
        .send(&CborCodec, &envelope)
        .expect_err("version mismatch");
    assert!(matches!(error, DispatchError::ProtocolVersion { .. }));
    assert_eq!(error.close_status(), CloseStatus::PROTOCOL_ERROR);
}

#[rstest]
fn newer_minor_versions_are_accepted(harness: Harness) {
    let mut envelope = request("core.greeter.forget", None);
    envelope.protocol_version = Version::new(PROTOCOL_VERSION.major(), 9, 9);
    assert_eq!(harness.send(&CborCodec, &envelope).expect("dispatch").len(), 1);
}

#[rstest]
fn text_frames_on_the_binary_codec_are_bad_data(harness: Harness) {
    let error = harness
        .send_frame(&CborCodec, &Frame::Text("{}".to_owned()))
        .expect_err("text on cbor");
    assert_eq!(error.close_status(), CloseStatus::BAD_DATA);
}

#[rstest]
fn unparseable_frames_are_bad_payloads(harness: Harness) {
    let error = harness
        .send_frame(&JsonCodec, &Frame::Text("{not json".to_owned()))
        .expect_err("malformed");
    assert_eq!(error.close_status(), CloseStatus::BAD_PAYLOAD);
}

#[derive(Default)]
struct BrokenChannel;

impl ReturnChannel for BrokenChannel {
    fn send_bytes(&mut self, _bytes: Vec<u8>) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }

    fn send_text(&mut self, _text: String) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }
}

#[rstest]
#[case::unary(request("core.greeter.forget", None))]
#[case::stream(request("core.greeter.count-down", payload([("from", Document::Integer(5.into()))])))]
#[case::error(request("core.greeter.refuse", None))]
fn broken_channels_end_the_connection(harness: Harness, #[case] envelope: Envelope) {
    let frame = JsonCodec.encode(&envelope).expect("encode");
    let error = harness
        .dispatcher
        .dispatch(&harness.connection, &frame, &JsonCodec, &mut BrokenChannel)
        .expect_err("broken channel");
    assert!(matches!(error, DispatchError::Send(_)));
    assert_eq!(error.close_status(), CloseStatus::ABNORMAL);
}

mock! {
    Listener {}

    impl SessionListener<Visitor> for Listener {
        fn session_created(&self, connection: &ConnectionHandle, session: &Visitor);
        fn session_dropped(&self, connection: &ConnectionHandle, session: &Visitor);
    }
}

#[test]
fn session_listeners_see_creation_and_removal_once() {
    let mut listener = MockListener::new();
    listener
        .expect_session_created()
        .withf(|connection, session| session.peer == connection.peer())
        .times(1)
        .return_const(());
    listener
        .expect_session_dropped()
        .times(1)
        .return_const(());

    let mut dispatcher = dispatcher();
    dispatcher.add_session_listener(Arc::new(listener));
    let connection = ConnectionHandle::new("[::1]:9000", "cbor");

    dispatcher
        .create_session(&connection)
        .expect("session created");
    assert!(dispatcher.create_session(&connection).is_err());
    assert_eq!(dispatcher.sessions().len().expect("store"), 1);

    assert!(dispatcher.drop_session(&connection).expect("dropped"));
    assert!(!dispatcher.drop_session(&connection).expect("second drop"));
    assert_eq!(dispatcher.sessions().len().expect("store"), 0);
}

#[test]
fn session_guards_drop_the_session() {
    let dispatcher = dispatcher();
    let connection = ConnectionHandle::new("unix", "json");
    dispatcher
        .create_session(&connection)
        .expect("session created");
    {
        let _guard = SessionGuard::new(&dispatcher, &connection);
    }
    assert!(
        dispatcher
            .sessions()
            .get(connection.id())
            .expect("store")
            .is_none()
    );
}
