use std::net::Ipv4Addr;

use serde_test::{assert_tokens, Token};

use super::Event;
use crate::id::*;
use crate::opcode::Opcode;
use crate::payload::*;
use crate::protocol_data::ProtocolData;
use crate::speaking_state::SpeakingState;

#[test]
fn deserialize_identify_json() {
    let json_data = r#"{
      "d": {
        "server_id": "41771983423143937",
        "user_id": "104694319306248192",
        "session_id": "my_session_id",
        "token": "my_token"
      },
      "op": 0
    }"#;

    let event = serde_json::from_str(json_data);

    let ident = Identify {
        session_id: "my_session_id".into(),
        token: "my_token".into(),
        server_id: GuildId(41771983423143937),
        user_id: UserId(104694319306248192),
    };

    assert!(matches!(event, Ok(Event::Identify(i)) if i == ident));
}

#[test]
fn serialize_identify_uses_string_ids() {
    let event = Event::from(Identify {
        server_id: GuildId(1),
        session_id: "abc".into(),
        token: "tok".into(),
        user_id: UserId(2),
    });

    let value = serde_json::to_value(&event).unwrap();

    assert_eq!(value["op"], 0);
    assert_eq!(value["d"]["server_id"], "1");
    assert_eq!(value["d"]["user_id"], "2");
    assert_eq!(value["d"]["session_id"], "abc");
    assert_eq!(value["d"]["token"], "tok");
}

#[test]
fn deserialize_select_protocol_json() {
    let json_data = r#"{
        "op": 1,
        "d": {
            "protocol": "udp",
            "data": {
                "address": "127.0.0.1",
                "port": 1337,
                "mode": "xsalsa20_poly1305_lite"
            }
        }
    }"#;

    let event = serde_json::from_str(json_data);

    let proto = SelectProtocol {
        protocol: "udp".into(),
        data: ProtocolData {
            address: Ipv4Addr::new(127, 0, 0, 1).into(),
            port: 1337,
            mode: "xsalsa20_poly1305_lite".into(),
        },
    };

    assert!(matches!(event, Ok(Event::SelectProtocol(i)) if i == proto));
}

#[test]
fn deserialize_ready_json_ignores_interval() {
    let json_data = r#"{
        "op": 2,
        "d": {
            "ssrc": 1,
            "ip": "127.0.0.1",
            "port": 1234,
            "modes": ["xsalsa20_poly1305", "xsalsa20_poly1305_suffix", "xsalsa20_poly1305_lite"],
            "heartbeat_interval": 1
        }
    }"#;

    let event = serde_json::from_str(json_data);

    let ready = Ready {
        ssrc: 1,
        ip: Ipv4Addr::new(127, 0, 0, 1).into(),
        port: 1234,
        modes: vec![
            "xsalsa20_poly1305".into(),
            "xsalsa20_poly1305_suffix".into(),
            "xsalsa20_poly1305_lite".into(),
        ],
    };

    assert!(matches!(event, Ok(Event::Ready(i)) if i == ready));
}

#[test]
fn deserialize_body_before_opcode() {
    let json_data = r#"{
        "d": {"heartbeat_interval": 41250.0, "v": 4},
        "op": 8
    }"#;

    let event = serde_json::from_str(json_data);

    assert!(matches!(event, Ok(Event::Hello(h)) if h.heartbeat_interval == 41250.0));
}

#[test]
fn deserialize_session_description_json() {
    let json_data = r#"{
        "op": 4,
        "d": {
            "mode": "xsalsa20_poly1305",
            "secret_key": [1, 2, 3, 4],
            "audio_codec": "opus"
        }
    }"#;

    let event = serde_json::from_str(json_data);

    let desc = SessionDescription {
        mode: "xsalsa20_poly1305".into(),
        secret_key: vec![1, 2, 3, 4],
    };

    assert!(matches!(event, Ok(Event::SessionDescription(i)) if i == desc));
}

#[test]
fn heartbeats_are_bare_nonces() {
    let value = serde_json::to_value(Event::from(Heartbeat { nonce: 1234 })).unwrap();
    assert_eq!(value, serde_json::json!({"op": 3, "d": 1234}));

    let event = serde_json::from_str(r#"{"op": 6, "d": 1234, "seq": 7}"#);
    assert!(matches!(event, Ok(Event::HeartbeatAck(a)) if a.nonce == 1234));
}

#[test]
fn speaking_from_server_carries_user() {
    let json_data = r#"{
        "op": 5,
        "d": {
            "speaking": 5,
            "delay": 0,
            "ssrc": 2,
            "user_id": 99
        }
    }"#;

    let event = serde_json::from_str(json_data);

    let speaking = Speaking {
        delay: Some(0),
        speaking: SpeakingState::MICROPHONE | SpeakingState::PRIORITY,
        ssrc: 2,
        user_id: Some(UserId(99)),
    };

    assert!(matches!(event, Ok(Event::Speaking(s)) if s == speaking));
}

#[test]
fn client_speaking_omits_user() {
    let value = serde_json::to_value(Event::from(Speaking {
        delay: Some(0),
        speaking: SpeakingState::MICROPHONE,
        ssrc: 42,
        user_id: None,
    }))
    .unwrap();

    assert_eq!(value, serde_json::json!({"op": 5, "d": {"delay": 0, "speaking": 1, "ssrc": 42}}));
}

#[test]
fn unknown_opcodes_are_tolerated() {
    let event = serde_json::from_str(r#"{"op": 18, "d": {"any": ["thing"]}}"#);
    assert!(matches!(event, Ok(Event::Unknown(18))));

    let event = serde_json::from_str(r#"{"d": null, "op": 20}"#);
    assert!(matches!(event, Ok(Event::Unknown(20))));
}

#[test]
fn missing_opcode_is_an_error() {
    assert!(serde_json::from_str::<Event>(r#"{"d": {"heartbeat_interval": 1.0}}"#).is_err());
}

#[test]
fn opcode_tokens() {
    assert_tokens(&Opcode::SessionDescription, &[Token::U8(4)]);
    assert_tokens(&Opcode::Hello, &[Token::U8(8)]);
}
