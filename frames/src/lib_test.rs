use super::*;

fn sample_rpc() -> Rpc {
    Rpc {
        id: 513,
        path: "math.add".to_owned(),
        data: serde_json::json!({
            "x": 1.25,
            "ok": true,
            "tags": ["a", "b"],
            "nested": {"k": "v"},
            "nil": null
        }),
        kind: RpcType::Request,
        from: "client-1".to_owned(),
        to: "server".to_owned(),
        time: 42,
        need_reply: true,
        status: false,
        timeout: Some(1500),
    }
}

#[test]
fn type_numeric_mapping_matches_wire_enum() {
    assert_eq!(RpcType::Heart.as_i32(), 0);
    assert_eq!(RpcType::Login.as_i32(), 1);
    assert_eq!(RpcType::Request.as_i32(), 4);
    assert_eq!(RpcType::Response.as_i32(), 5);
    assert_eq!(RpcType::Move.as_i32(), 10);
    assert_eq!(RpcType::Proxy.as_i32(), 11);
}

#[test]
fn type_from_wire_rejects_out_of_range_value() {
    let err = RpcType::from_i32(99).expect_err("type should be invalid");
    assert!(matches!(err, CodecError::InvalidType(99)));
}

#[test]
fn binary_round_trip_preserves_envelope() {
    let rpc = sample_rpc();
    let decoded = decode_rpc(&encode_rpc(&rpc)).expect("decode should succeed");
    assert_eq!(decoded, rpc);
}

#[test]
fn decode_rpc_rejects_malformed_bytes() {
    let err = decode_rpc(&[0xff, 0x00, 0x01]).expect_err("bytes should fail");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_rpc_rejects_invalid_wire_type() {
    let mut wire = rpc_to_wire(&sample_rpc());
    wire.kind = 77;
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let err = decode_rpc(&bytes).expect_err("type should fail");
    assert!(matches!(err, CodecError::InvalidType(77)));
}

#[test]
fn decode_rpc_rejects_identifier_wider_than_sixteen_bits() {
    let mut wire = rpc_to_wire(&sample_rpc());
    wire.id = 70_000;
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let err = decode_rpc(&bytes).expect_err("id should fail");
    assert!(matches!(err, CodecError::InvalidId(70_000)));
}

#[test]
fn decode_rpc_defaults_missing_data_to_null() {
    let mut wire = rpc_to_wire(&sample_rpc());
    wire.data = None;
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let rpc = decode_rpc(&bytes).expect("decode");
    assert_eq!(rpc.data, Value::Null);
}

#[test]
fn integral_numbers_come_back_as_json_integers() {
    let mut rpc = sample_rpc();
    rpc.data = serde_json::json!({"count": 2, "ratio": 0.5});

    let decoded = decode_rpc(&encode_rpc(&rpc)).expect("decode");
    assert_eq!(decoded.data, serde_json::json!({"count": 2, "ratio": 0.5}));
}

#[test]
fn json_uses_protocol_field_names() {
    let text = serde_json::to_string(&sample_rpc()).expect("serialize");
    let value: Value = serde_json::from_str(&text).expect("parse");

    assert_eq!(value["ID"], serde_json::json!(513));
    assert_eq!(value["Type"], serde_json::json!(4));
    assert_eq!(value["Path"], serde_json::json!("math.add"));
    assert_eq!(value["NeedReply"], serde_json::json!(true));
    assert_eq!(value["Timeout"], serde_json::json!(1500));
}

#[test]
fn json_omits_absent_timeout_and_fills_missing_fields() {
    let mut rpc = sample_rpc();
    rpc.timeout = None;
    let text = serde_json::to_string(&rpc).expect("serialize");
    assert!(!text.contains("Timeout"));

    let sparse = decode(&Payload::Text(r#"{"Type":7,"Path":"room.1","Data":"hi"}"#.to_owned()))
        .expect("sparse envelope should decode");
    assert_eq!(sparse.kind, RpcType::Pub);
    assert_eq!(sparse.id, 0);
    assert_eq!(sparse.from, "");
    assert!(!sparse.need_reply);
    assert_eq!(sparse.data, serde_json::json!("hi"));
}

#[test]
fn json_rejects_unknown_type() {
    let err = decode(&Payload::Text(r#"{"Type":42}"#.to_owned())).expect_err("type 42");
    assert!(matches!(err, CodecError::Json(_)));
}

#[test]
fn codec_mode_selects_payload_kind() {
    let rpc = sample_rpc();
    assert!(matches!(Codec::Binary.encode(&rpc), Payload::Binary(_)));
    assert!(matches!(Codec::Json.encode(&rpc), Payload::Text(_)));
    assert_eq!(Codec::default(), Codec::Binary);
}

#[test]
fn decode_follows_payload_kind_not_mode() {
    let rpc = sample_rpc();
    let from_text = decode(&Codec::Json.encode(&rpc)).expect("text decode");
    let from_binary = decode(&Codec::Binary.encode(&rpc)).expect("binary decode");
    assert_eq!(from_text, rpc);
    assert_eq!(from_binary, rpc);
}

#[test]
fn reply_addresses_original_sender() {
    let request = sample_rpc();
    let reply = request.reply("client-2", true, serde_json::json!(3));

    assert_eq!(reply.kind, RpcType::Response);
    assert_eq!(reply.id, request.id);
    assert_eq!(reply.to, "client-1");
    assert_eq!(reply.from, "client-2");
    assert!(reply.status);
    assert!(!reply.need_reply);
}

#[test]
fn new_stamps_creation_time() {
    let rpc = Rpc::new(RpcType::Heart, "", Value::Null);
    assert!(rpc.time > 0);
    assert_eq!(rpc.id, 0);
}

#[test]
fn topic_validation_accepts_dotted_names() {
    assert!(is_valid_topic("room.1"));
    assert!(is_valid_topic("chat:lobby/main"));
    assert!(is_valid_topic("a_b-c"));
}

#[test]
fn topic_validation_rejects_malformed_names() {
    assert!(!is_valid_topic(""));
    assert!(!is_valid_topic("room..1"));
    assert!(!is_valid_topic(".room"));
    assert!(!is_valid_topic("room 1"));
    assert!(!is_valid_topic(&"x".repeat(MAX_TOPIC_LEN + 1)));
}
