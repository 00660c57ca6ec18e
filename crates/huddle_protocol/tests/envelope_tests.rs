use huddle_domain::RoomId;
use huddle_protocol::{
	DEFAULT_MAX_MESSAGE_SIZE, Envelope, EnvelopeError, InboundFrame, ServerMessage, SignalKind, decode_envelope,
};
use proptest::prelude::*;

fn room(id: &str) -> RoomId {
	RoomId::new(id).expect("valid RoomId")
}

#[test]
fn join_requires_username_and_room() {
	let env = decode_envelope(r#"{"type":"join","username":"alice","roomId":"R"}"#).expect("join");
	assert_eq!(
		env,
		Envelope::Join {
			username: "alice".to_string(),
			room_id: room("R"),
		}
	);
	assert!(!env.excludes_sender());

	let err = decode_envelope(r#"{"type":"join","roomId":"R"}"#).unwrap_err();
	assert!(matches!(err, EnvelopeError::MissingField("username")), "got {err:?}");

	let err = decode_envelope(r#"{"type":"join","username":"alice"}"#).unwrap_err();
	assert!(matches!(err, EnvelopeError::MissingField("roomId")), "got {err:?}");

	let err = decode_envelope(r#"{"type":"join","username":"alice","roomId":""}"#).unwrap_err();
	assert!(matches!(err, EnvelopeError::InvalidRoom(_)), "got {err:?}");
}

#[test]
fn whitespace_only_join_fields_are_rejected() {
	let err = decode_envelope(r#"{"type":"join","username":"alice","roomId":"  "}"#).unwrap_err();
	assert!(matches!(err, EnvelopeError::InvalidRoom(_)), "got {err:?}");

	let err = decode_envelope(r#"{"type":"join","username":" \t","roomId":"R"}"#).unwrap_err();
	assert!(matches!(err, EnvelopeError::MissingField("username")), "got {err:?}");
}

#[test]
fn signaling_types_exclude_sender() {
	for kind in SignalKind::ALL {
		let text = format!(r#"{{"type":"{}","roomId":"R","offer":{{"sdp":"x"}}}}"#, kind.as_str());
		let env = decode_envelope(&text).expect("signal");
		assert_eq!(env.kind(), kind.as_str());
		assert_eq!(env.room_id(), Some(&room("R")));
		assert!(env.excludes_sender(), "{} should exclude the sender", kind.as_str());
	}
}

#[test]
fn unknown_types_are_relayed_to_whole_room() {
	let env = decode_envelope(r#"{"type":"chat","roomId":"R","text":"hi"}"#).expect("chat");
	assert_eq!(
		env,
		Envelope::Other {
			kind: "chat".to_string(),
			room_id: Some(room("R")),
		}
	);
	assert!(!env.excludes_sender());

	// Clients may send server-looking types; they are ordinary room traffic.
	let env = decode_envelope(r#"{"type":"leave","roomId":"R"}"#).expect("leave");
	assert!(matches!(env, Envelope::Other { .. }));
}

#[test]
fn missing_or_empty_room_is_kept_as_none() {
	let env = decode_envelope(r#"{"type":"chat","text":"hi"}"#).expect("chat");
	assert_eq!(env.room_id(), None);

	let env = decode_envelope(r#"{"type":"offer","roomId":"   "}"#).expect("offer");
	assert_eq!(env.room_id(), None);
}

#[test]
fn username_is_payload_outside_joins() {
	let env = decode_envelope(r#"{"type":"chat","roomId":"R","username":7,"text":"hi"}"#).expect("chat");
	assert_eq!(env.room_id(), Some(&room("R")));

	let env = decode_envelope(r#"{"type":"offer","roomId":"R","username":{"nick":"a"}}"#).expect("offer");
	assert!(env.excludes_sender());

	let err = decode_envelope(r#"{"type":"join","username":7,"roomId":"R"}"#).unwrap_err();
	assert!(matches!(err, EnvelopeError::MissingField("username")), "got {err:?}");
	let err = decode_envelope(r#"{"type":"join","username":"alice","roomId":["R"]}"#).unwrap_err();
	assert!(matches!(err, EnvelopeError::MissingField("roomId")), "got {err:?}");
}

#[test]
fn non_string_room_is_kept_as_none() {
	let env = decode_envelope(r#"{"type":"chat","roomId":42}"#).expect("chat");
	assert_eq!(env.room_id(), None);
}

#[test]
fn malformed_frames_are_rejected() {
	assert!(matches!(decode_envelope("not json"), Err(EnvelopeError::Json(_))));
	assert!(matches!(decode_envelope("[1,2,3]"), Err(EnvelopeError::Json(_))));
	assert!(matches!(decode_envelope(r#"{"roomId":"R"}"#), Err(EnvelopeError::Json(_))));
	assert!(matches!(decode_envelope(r#"{"type":7,"roomId":"R"}"#), Err(EnvelopeError::Json(_))));
}

#[test]
fn inbound_frame_keeps_text_verbatim() {
	let text = r#"{"type":"ice-candidate","roomId":"R","candidate":{"sdpMid":"0","x":[1,2]}}"#;
	let frame = InboundFrame::parse(text, DEFAULT_MAX_MESSAGE_SIZE).expect("parse");
	assert_eq!(frame.text(), text);
	assert_eq!(frame.envelope.kind(), "ice-candidate");
}

#[test]
fn inbound_frame_enforces_size_limit() {
	let text = r#"{"type":"chat","roomId":"R","text":"hello"}"#;
	let err = InboundFrame::parse(text, 8).unwrap_err();
	match err {
		EnvelopeError::TooLarge { len, max } => {
			assert_eq!(len, text.len());
			assert_eq!(max, 8);
		}
		other => panic!("unexpected error: {other:?}"),
	}
}

#[test]
fn server_messages_have_wire_shape() {
	let system = ServerMessage::System {
		message: "Connected to chat server".to_string(),
		timestamp: 1_700_000_000_000,
	};
	let v: serde_json::Value = serde_json::from_str(&system.to_text().expect("encode")).expect("json");
	assert_eq!(v["type"], "system");
	assert_eq!(v["message"], "Connected to chat server");
	assert_eq!(v["timestamp"], 1_700_000_000_000_i64);
	assert!(v.get("roomId").is_none());

	let leave = ServerMessage::Leave {
		username: "alice".to_string(),
		room_id: room("R"),
		timestamp: 5,
	};
	let v: serde_json::Value = serde_json::from_str(&leave.to_text().expect("encode")).expect("json");
	assert_eq!(v["type"], "leave");
	assert_eq!(v["username"], "alice");
	assert_eq!(v["roomId"], "R");
	assert_eq!(v["timestamp"], 5);
}

proptest! {
	#[test]
	fn decode_never_panics_on_arbitrary_text(s in ".*") {
		let _ = decode_envelope(&s);
	}

	#[test]
	fn any_non_join_type_keeps_its_tag(kind in "[a-z][a-z-]{0,15}", room_s in "[A-Za-z0-9]{1,8}") {
		prop_assume!(kind != "join");
		let text = serde_json::json!({ "type": kind, "roomId": room_s }).to_string();
		let env = decode_envelope(&text).expect("decode");
		prop_assert_eq!(env.kind(), kind.as_str());
		prop_assert_eq!(env.room_id().map(RoomId::as_str), Some(room_s.as_str()));
		prop_assert_eq!(env.excludes_sender(), SignalKind::from_type(&kind).is_some());
	}
}
