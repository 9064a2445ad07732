//! Envelope codec tests for go2link core

use go2link_core::{codec, topics, ApiRequest, Envelope, Error};
use serde_json::json;

#[test]
fn test_encode_message_shape() {
    let env = Envelope::message(topics::SPORT_REQUEST, json!({"x": 1}));
    let bytes = codec::encode(&env).expect("encode failed");
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(value["type"], "msg");
    assert_eq!(value["topic"], "rt/api/sport/request");
    assert_eq!(value["data"]["x"], 1);
}

#[test]
fn test_decode_preserves_nested_payload() {
    let payload = json!({
        "imu_state": {"rpy": [0.01, -0.02, 1.57]},
        "motor_state": [{"q": 0.1, "temperature": 31}],
        "bms_state": {"soc": 87}
    });
    let env = Envelope::message(topics::LOW_STATE, payload.clone());

    let decoded = codec::decode(&codec::encode(&env).unwrap()).expect("decode failed");
    assert_eq!(decoded, env);
    assert_eq!(decoded.data, payload);
}

#[test]
fn test_decode_robot_error_frame() {
    let frame = br#"{"type":"errors","data":[[1700000000,100,1]]}"#;
    let env = codec::decode(frame).expect("decode failed");

    assert_eq!(env.kind, topics::kind::ERRORS);
    assert_eq!(env.route(), "errors");
}

#[test]
fn test_decode_empty_frame() {
    assert!(matches!(codec::decode(b""), Err(Error::EmptyFrame)));
}

#[test]
fn test_decode_garbage() {
    assert!(matches!(codec::decode(b"{not json"), Err(Error::DecodeError(_))));
    assert!(matches!(codec::decode(b"[1,2,3]"), Err(Error::DecodeError(_))));
}

#[test]
fn test_subscribe_notice_shape() {
    let bytes = codec::encode(&Envelope::subscribe(topics::LOW_STATE)).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(value["type"], "subscribe");
    assert_eq!(value["topic"], "rt/lf/lowstate");
}

#[test]
fn test_api_request_inside_envelope() {
    let req = ApiRequest::without_parameter(1004);
    let env = Envelope::message(topics::SPORT_REQUEST, serde_json::to_value(&req).unwrap());
    let decoded = codec::decode(&codec::encode(&env).unwrap()).unwrap();

    let back: ApiRequest = serde_json::from_value(decoded.data).unwrap();
    assert_eq!(back, req);
    assert_eq!(back.parameter, "");
}
