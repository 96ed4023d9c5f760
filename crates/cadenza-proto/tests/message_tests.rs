//! Control-channel message tests
//!
//! Covers decoding of every inbound payload type, encoding shapes of the
//! outbound commands, and rejection of out-of-contract tags.

use cadenza_proto::{
    codec, Band, EndReason, EventKind, FilterPayload, Inbound, LoadType, Outbound, Timescale,
    VoiceServerUpdate,
};
use serde_json::{json, Value};

fn encoded(msg: &Outbound) -> Value {
    serde_json::from_str(&codec::encode(msg).expect("encode failed")).unwrap()
}

#[test]
fn play_command_shape() {
    let value = encoded(&Outbound::Play {
        guild_id: "190".to_string(),
        track: "QAAAjQIA".to_string(),
        start_time: 0,
        volume: 100,
        no_replace: false,
        pause: false,
    });

    assert_eq!(value["op"], "play");
    assert_eq!(value["guildId"], "190");
    assert_eq!(value["track"], "QAAAjQIA");
    assert_eq!(value["startTime"], 0);
    assert_eq!(value["volume"], 100);
    assert_eq!(value["noReplace"], false);
    assert_eq!(value["pause"], false);
}

#[test]
fn voice_update_carries_both_halves() {
    let value = encoded(&Outbound::VoiceUpdate {
        guild_id: "190".to_string(),
        session_id: "abc".to_string(),
        event: VoiceServerUpdate {
            token: "tok".to_string(),
            guild_id: "190".to_string(),
            endpoint: Some("eu.node.example".to_string()),
        },
    });

    assert_eq!(value["op"], "voiceUpdate");
    assert_eq!(value["sessionId"], "abc");
    assert_eq!(value["event"]["token"], "tok");
    assert_eq!(value["event"]["endpoint"], "eu.node.example");
}

#[test]
fn configure_resuming_shape() {
    let value = encoded(&Outbound::ConfigureResuming {
        key: "resume-me".to_string(),
        timeout: 60,
    });

    assert_eq!(value["op"], "configureResuming");
    assert_eq!(value["key"], "resume-me");
    assert_eq!(value["timeout"], 60);
}

#[test]
fn filters_payload_omits_unset_filters() {
    let value = encoded(&Outbound::Filters {
        guild_id: "190".to_string(),
        payload: FilterPayload {
            timescale: Some(Timescale {
                speed: 1.25,
                ..Timescale::default()
            }),
            ..FilterPayload::default()
        },
    });

    assert_eq!(value["op"], "filters");
    assert_eq!(value["timescale"]["speed"], 1.25);
    assert!(value.get("karaoke").is_none());
    assert!(value.get("lowPass").is_none());
}

#[test]
fn equalizer_command_shape() {
    let value = encoded(&Outbound::Equalizer {
        guild_id: "190".to_string(),
        bands: vec![Band { band: 0, gain: 0.2 }, Band { band: 1, gain: -0.1 }],
    });

    assert_eq!(value["op"], "equalizer");
    assert_eq!(value["bands"][0]["band"], 0);
    assert_eq!(value["bands"][1]["gain"], -0.1);
}

#[test]
fn decode_stats() {
    let text = json!({
        "op": "stats",
        "players": 3,
        "playingPlayers": 2,
        "uptime": 123456,
        "memory": {"free": 1, "used": 2, "allocated": 3, "reservable": 4},
        "cpu": {"cores": 4, "systemLoad": 0.25, "lavalinkLoad": 0.1},
        "frameStats": {"sent": 3000, "nulled": 0, "deficit": 0}
    })
    .to_string();

    match codec::decode(&text).unwrap() {
        Inbound::Stats(stats) => {
            assert_eq!(stats.players, 3);
            assert_eq!(stats.playing_players, 2);
            assert_eq!(stats.cpu.cores, 4);
            assert_eq!(stats.frame_stats.unwrap().sent, 3000);
        }
        other => panic!("expected stats, got {other:?}"),
    }
}

#[test]
fn decode_stats_without_frame_stats() {
    let text = json!({
        "op": "stats",
        "players": 0,
        "playingPlayers": 0,
        "uptime": 1,
        "memory": {"free": 1, "used": 2, "allocated": 3, "reservable": 4},
        "cpu": {"cores": 2, "systemLoad": 0.0, "lavalinkLoad": 0.0}
    })
    .to_string();

    match codec::decode(&text).unwrap() {
        Inbound::Stats(stats) => assert!(stats.frame_stats.is_none()),
        other => panic!("expected stats, got {other:?}"),
    }
}

#[test]
fn decode_player_update() {
    let text = json!({
        "op": "playerUpdate",
        "guildId": "190",
        "state": {"time": 1_500_000_000, "position": 42_000, "connected": true}
    })
    .to_string();

    match codec::decode(&text).unwrap() {
        Inbound::PlayerUpdate { guild_id, state } => {
            assert_eq!(guild_id, "190");
            assert_eq!(state.position, Some(42_000));
            assert_eq!(state.connected, Some(true));
        }
        other => panic!("expected playerUpdate, got {other:?}"),
    }
}

#[test]
fn decode_track_end_event() {
    let text = json!({
        "op": "event",
        "type": "TrackEndEvent",
        "guildId": "190",
        "track": "QAAAjQIA",
        "reason": "FINISHED"
    })
    .to_string();

    match codec::decode(&text).unwrap() {
        Inbound::Event(event) => {
            assert_eq!(event.guild_id, "190");
            match event.kind {
                EventKind::TrackEnd { reason, .. } => assert_eq!(reason, EndReason::Finished),
                other => panic!("expected TrackEnd, got {other:?}"),
            }
        }
        other => panic!("expected event, got {other:?}"),
    }
}

#[test]
fn decode_websocket_closed_event() {
    let text = json!({
        "op": "event",
        "type": "WebSocketClosedEvent",
        "guildId": "190",
        "code": 4015,
        "reason": "voice server crashed",
        "byRemote": true
    })
    .to_string();

    match codec::decode(&text).unwrap() {
        Inbound::Event(event) => match event.kind {
            EventKind::WebSocketClosed { code, by_remote, .. } => {
                assert_eq!(code, 4015);
                assert!(by_remote);
            }
            other => panic!("expected WebSocketClosed, got {other:?}"),
        },
        other => panic!("expected event, got {other:?}"),
    }
}

#[test]
fn unknown_event_type_is_a_decode_error() {
    let text = json!({
        "op": "event",
        "type": "TrackTeleportEvent",
        "guildId": "190"
    })
    .to_string();

    assert!(codec::decode(&text).is_err());
}

#[test]
fn end_reason_wire_names() {
    for (name, reason) in [
        ("FINISHED", EndReason::Finished),
        ("LOAD_FAILED", EndReason::LoadFailed),
        ("STOPPED", EndReason::Stopped),
        ("REPLACED", EndReason::Replaced),
        ("CLEANUP", EndReason::Cleanup),
    ] {
        let parsed: EndReason = serde_json::from_value(json!(name)).unwrap();
        assert_eq!(parsed, reason);
    }
}

#[test]
fn load_response_decodes_search_result() {
    let text = json!({
        "loadType": "SEARCH_RESULT",
        "playlistInfo": {},
        "tracks": [{
            "track": "QAAAjQIA",
            "info": {
                "identifier": "dQw4w9WgXcQ",
                "isSeekable": true,
                "author": "RickAstleyVEVO",
                "length": 212_000,
                "isStream": false,
                "position": 0,
                "title": "Never Gonna Give You Up",
                "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                "sourceName": "youtube"
            }
        }]
    })
    .to_string();

    let response: cadenza_proto::LoadResponse = serde_json::from_str(&text).unwrap();
    assert_eq!(response.load_type, LoadType::SearchResult);
    assert_eq!(response.tracks.len(), 1);
    assert_eq!(response.tracks[0].info.length, 212_000);
}
