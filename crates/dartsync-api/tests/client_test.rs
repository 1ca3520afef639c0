// Integration tests for `Session` and the REST endpoints using wiremock.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dartsync_api::{
    Credentials, DartsApi, Error, MatchControl, RemoteEntity, Segment, Session, SessionConfig,
    TransportConfig,
};

const TOKEN_PATH: &str = "/realms/autodarts/protocol/openid-connect/token";

// ── Helpers ─────────────────────────────────────────────────────────

fn config(server: &MockServer) -> SessionConfig {
    let base = Url::parse(&server.uri()).unwrap();
    SessionConfig {
        api_url: base.clone(),
        auth_url: base,
        ws_url: Url::parse("ws://127.0.0.1:9/ms/v0/subscribe").unwrap(),
        realm: "autodarts".into(),
        client_id: "dartsync".into(),
        client_secret: None,
        credentials: Credentials {
            email: "player@example.com".into(),
            password: SecretString::from("hunter2"),
        },
        transport: TransportConfig {
            timeout: Duration::from_secs(5),
            ..TransportConfig::default()
        },
    }
}

async fn mount_login(server: &MockServer, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "expires_in": expires_in,
            "refresh_token": "refresh-1",
            "refresh_expires_in": 1800,
        })))
        .mount(server)
        .await;
}

async fn setup() -> (MockServer, Session) {
    let server = MockServer::start().await;
    mount_login(&server, 300).await;
    let session = Session::connect(config(&server)).await.unwrap();
    (server, session)
}

fn match_body(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "variant": "X01",
        "players": [{ "name": "Ada", "userId": "u1" }, { "name": "Bob" }],
        "scores": [{ "sets": 0, "legs": 1 }, { "sets": 0, "legs": 0 }],
        "gameScores": [301, 280],
        "turns": [],
        "player": 1,
        "round": 3,
        "leg": 2,
        "finished": false,
        "winner": -1
    })
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid user credentials"
        })))
        .mount(&server)
        .await;

    let err = Session::connect(config(&server)).await.unwrap_err();
    assert!(
        matches!(err, Error::InvalidCredentials { ref email } if email == "player@example.com"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed() {
    let server = MockServer::start().await;
    // Expires inside the renewal margin, so the first API call refreshes.
    mount_login(&server, 10).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "expires_in": 300,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::connect(config(&server)).await.unwrap();
    assert_eq!(session.bearer().await.unwrap(), "access-2");
    // Now valid; no second refresh.
    assert_eq!(session.bearer().await.unwrap(), "access-2");
}

// ── Snapshots ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_board_with_bearer() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/bs/v0/boards/B1"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "B1",
            "name": "Garage",
            "version": "1.2.0",
            "matchId": "M42",
            "state": { "connected": true, "status": "Throw", "numThrows": 1 }
        })))
        .mount(&server)
        .await;

    let board = session.board("B1").await.unwrap();
    let state = board.state();
    assert_eq!(state.name, "Garage");
    assert_eq!(state.current_match(), Some("M42"));
    assert_eq!(state.state.status.as_deref(), Some("Throw"));
    assert!(!board.is_connected());
}

#[tokio::test]
async fn test_fetch_match_and_reload() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/gs/v0/matches/M42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(match_body("M42")))
        .expect(2)
        .mount(&server)
        .await;

    let mut game = session.match_by_id("M42").await.unwrap();
    assert_eq!(game.state().players.len(), 2);
    assert_eq!(game.state().players[0].user_id.as_deref(), Some("u1"));
    assert_eq!(game.state().winner_index(), None);

    let reloaded = game.reload().await.unwrap();
    assert_eq!(reloaded.round, 3);
    assert_eq!(game.id(), "M42");
}

#[tokio::test]
async fn test_missing_match_is_not_found() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/gs/v0/matches/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = session.match_by_id("gone").await.err().unwrap();
    assert!(err.is_not_found(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_malformed_snapshot_keeps_body() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/bs/v0/boards/B1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"name\": 7}"))
        .mount(&server)
        .await;

    let err = session.fetch_board("B1").await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "{\"name\": 7}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_call_drops_tokens() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/bs/v0/boards/B1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = session.fetch_board("B1").await.unwrap_err();
    assert!(matches!(err, Error::SessionExpired));
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_throw_submits_and_revises() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/gs/v0/matches/M42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(match_body("M42")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/gs/v0/matches/M42/throws"))
        .and(body_json(json!({
            "segment": { "name": "T20", "number": 20, "bed": "Triple", "multiplier": 3 }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/gs/v0/matches/M42/throws"))
        .and(body_json(json!({
            "segment": { "name": "Miss", "number": 0, "bed": "Outside", "multiplier": 0 },
            "index": 1
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let game = session.match_by_id("M42").await.unwrap();
    let t20: Segment = "T20".parse().unwrap();
    game.throw(&t20, None).await.unwrap();
    game.throw(&Segment::miss(), Some(1)).await.unwrap();
}

#[tokio::test]
async fn test_command_failure_propagates() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/gs/v0/matches/M42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(match_body("M42")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/gs/v0/matches/M42/undo"))
        .respond_with(ResponseTemplate::new(409).set_body_string("nothing to undo"))
        .mount(&server)
        .await;

    let game = session.match_by_id("M42").await.unwrap();
    let err = game.undo().await.unwrap_err();
    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "nothing to undo");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_abort_deletes_match() {
    let (server, session) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/gs/v0/matches/M42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    session.abort("M42").await.unwrap();
}
