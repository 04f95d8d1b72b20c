//! Integration tests for roach-server API

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use roach_core::{FaultReason, NotationRules, Outcome, ParticipantId, Side};
use roach_relay::{
    Arena, ArenaConfig, ConnectError, Connector, Dialect, InMemoryRepository, LineChannel, Roster, Transport,
};
use roach_server::{create_router, ServerState};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{split, AsyncBufReadExt, BufReader};
use tower::ServiceExt;

/// Line-dialect engine that listens but never answers
struct Idle;

#[async_trait]
impl Connector for Idle {
    async fn connect(&self) -> Result<Box<dyn Transport>, ConnectError> {
        let (relay_end, engine_end) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut lines = BufReader::new(engine_end).lines();
            while let Ok(Some(_)) = lines.next_line().await {}
        });
        let (read, write) = split(relay_end);
        Ok(Box::new(LineChannel::from_stream("idle", read, write)))
    }

    fn describe(&self) -> String {
        "idle engine".to_string()
    }
}

fn test_arena() -> Arc<Arena> {
    let mut roster = Roster::new();
    roster.register("alpha", Dialect::Line, 1500, Arc::new(Idle));
    roster.register("beta", Dialect::Line, 1620, Arc::new(Idle));
    let repository = Arc::new(InMemoryRepository::seeded(&roster));
    Arc::new(Arena::new(
        ArenaConfig::default(),
        roster,
        Arc::new(NotationRules),
        repository,
    ))
}

fn test_app(arena: &Arc<Arena>) -> Router {
    create_router(Arc::new(ServerState::new(arena.clone())))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_status_endpoint() {
    let arena = test_arena();
    let app = test_app(&arena);

    let (status, json) = call(&app, Method::GET, "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["participants"], 2);
    assert_eq!(json["live_sessions"], 0);
    assert_eq!(json["waiting_tickets"], 0);
}

#[tokio::test]
async fn test_participants_endpoint() {
    let arena = test_arena();
    let app = test_app(&arena);

    let (status, json) = call(&app, Method::GET, "/api/participants", None).await;
    assert_eq!(status, StatusCode::OK);
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], 1);
    assert_eq!(list[0]["name"], "alpha");
    assert_eq!(list[0]["dialect"], "line");
    assert_eq!(list[1]["rating"], 1620);
}

#[tokio::test]
async fn test_ticket_lifecycle() {
    let arena = test_arena();
    let app = test_app(&arena);

    let (status, ticket) = call(&app, Method::POST, "/api/tickets", Some(json!({ "participant": 1 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ticket["status"], "waiting");
    assert_eq!(ticket["rating"], 1500);
    let uri = format!("/api/tickets/{}", ticket["id"]);

    let (status, polled) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["status"], "waiting");

    let (status, json) = call(&app, Method::POST, "/api/tickets", Some(json!({ "participant": 1 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("already has a waiting ticket"));

    let (status, cancelled) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (_, polled) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(polled["status"], "cancelled");
}

#[tokio::test]
async fn test_ticket_errors() {
    let arena = test_arena();
    let app = test_app(&arena);

    let (status, json) = call(&app, Method::POST, "/api/tickets", Some(json!({ "participant": 77 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());

    let (status, json) = call(&app, Method::POST, "/api/tickets", Some(json!({ "who": "alpha" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, _) = call(&app, Method::GET, "/api/tickets/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::DELETE, "/api/tickets/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forfeit_ends_live_session() {
    let arena = test_arena();
    let app = test_app(&arena);
    let handle = arena.start_session(ParticipantId(1), ParticipantId(2)).unwrap();

    let (status, list) = call(&app, Method::GET, "/api/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["white"], 1);
    assert_eq!(list[0]["black"], 2);

    let uri = format!("/api/sessions/{}", handle.id.0);
    let (status, snapshot) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["id"], handle.id.0);
    assert_eq!(snapshot["to_move"], "white");

    let forfeit = format!("{}/forfeit", uri);
    let (status, json) = call(&app, Method::POST, &forfeit, Some(json!({ "side": "purple" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = call(&app, Method::POST, &forfeit, Some(json!({ "side": "white" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["side"], "white");

    let done = handle.finished().await;
    assert_eq!(
        done.record.outcome(),
        Some(Outcome::Fault {
            side: Side::White,
            reason: FaultReason::VoluntaryForfeit,
        })
    );
    arena.registry.drain().await;

    let (status, _) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, Method::POST, &forfeit, Some(json!({ "side": "black" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, games) = call(&app, Method::GET, "/api/games", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(games.as_array().unwrap().len(), 1);
    assert_eq!(games[0]["id"], handle.id.0);

    let (status, game) = call(&app, Method::GET, &format!("/api/games/{}", handle.id.0), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(game["white"], 1);
    assert_eq!(game["outcome"]["kind"], "fault");

    let (_, participants) = call(&app, Method::GET, "/api/participants", None).await;
    let alpha = participants[0]["rating"].as_i64().unwrap();
    let beta = participants[1]["rating"].as_i64().unwrap();
    assert!(alpha < 1500);
    assert_eq!(alpha + beta, 1500 + 1620);

    // A forfeit is a fault result, not an ordinary loss
    let (status, detail) = call(&app, Method::GET, "/api/participants/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["name"], "alpha");
    assert_eq!(detail["rating"], alpha);
    assert_eq!(detail["games"], json!([handle.id.0]));
    assert_eq!(
        detail["stats"],
        json!({ "games": 1, "wins": 0, "losses": 0, "draws": 0, "fault_wins": 0, "fault_losses": 1 })
    );

    let (_, detail) = call(&app, Method::GET, "/api/participants/2", None).await;
    assert_eq!(detail["stats"]["fault_wins"], 1);
    assert_eq!(detail["stats"]["losses"], 0);
}

#[tokio::test]
async fn test_unknown_route_and_session() {
    let arena = test_arena();
    let app = test_app(&arena);

    let (status, json) = call(&app, Method::GET, "/api/sessions/12", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("session-12"));

    let (status, games) = call(&app, Method::GET, "/api/games", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(games, json!([]));

    let (status, json) = call(&app, Method::GET, "/api/games/3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("session-3"));

    let (status, _) = call(&app, Method::GET, "/api/participants/9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A registered participant with no games yet
    let (status, detail) = call(&app, Method::GET, "/api/participants/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["rating"], 1620);
    assert_eq!(detail["stats"]["games"], 0);
    assert_eq!(detail["games"], json!([]));
}
