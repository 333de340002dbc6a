//! End-to-end tests: real listeners, WebSocket clients and the HTTP router.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use fleet_registry::{AvailabilityPolicy, DeploymentTier, GameInfo, ServerReport};
use futures::{SinkExt, StreamExt};
use matchmaker::messaging::{events, Envelope};
use matchmaker::{http, Matchmaker, MatchmakerConfig, RoutingServer};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn production_config() -> MatchmakerConfig {
    MatchmakerConfig {
        tier: DeploymentTier::Production,
        policy: AvailabilityPolicy::default(),
        restart_delay: Duration::from_millis(50),
        ..MatchmakerConfig::local()
    }
}

type Running = (Arc<Matchmaker>, SocketAddr, SocketAddr, broadcast::Sender<()>);

async fn start(config: MatchmakerConfig) -> Running {
    let server = RoutingServer::bind(config).await.unwrap();
    let matchmaker = server.matchmaker();
    let player_addr = server.player_addr().unwrap();
    let game_addr = server.game_addr().unwrap();
    let shutdown = server.shutdown_handle();
    tokio::spawn(server.run());
    (matchmaker, player_addr, game_addr, shutdown)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    client
}

async fn send(client: &mut Client, event: &str, data: Value) {
    let text = serde_json::to_string(&json!({ "event": event, "data": data })).unwrap();
    client.send(Message::text(text)).await.unwrap();
}

async fn next_envelope(client: &mut Client) -> Envelope {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_for_server(matchmaker: &Matchmaker, region: &str, host: &str, present: bool) {
    for _ in 0..200 {
        if matchmaker.environment().await.server(region, host).is_some() == present {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server {region}/{host} presence never became {present}");
}

fn report(host: &str, region: &str) -> Value {
    serde_json::to_value(ServerReport {
        player_count: 3,
        games: [("g1".to_string(), GameInfo::public())].into_iter().collect(),
        ..ServerReport::new(host, region)
    })
    .unwrap()
}

#[tokio::test]
async fn test_player_is_routed_to_reporting_server() {
    let (matchmaker, player_addr, game_addr, shutdown) = start(production_config()).await;

    let mut game = connect(game_addr).await;
    send(&mut game, events::HEARTBEAT, report("10.0.0.1:8001", "nyc1")).await;
    wait_for_server(&matchmaker, "nyc1", "10.0.0.1:8001", true).await;

    let mut player = connect(player_addr).await;
    send(&mut player, events::REQUEST_GAME, json!({ "region": "nyc1", "mode": "ffa" })).await;
    let reply = next_envelope(&mut player).await;
    assert_eq!(reply.event, events::REQUEST_GAME_STATUS);
    assert_eq!(reply.data, json!({ "server": "10.0.0.1:8001", "mode": "ffa" }));

    send(&mut player, events::REQUEST_GAME, json!({ "region": "lon1" })).await;
    let reply = next_envelope(&mut player).await;
    assert_eq!(reply.data, json!({ "error": "servers full" }));

    send(&mut player, events::REQUEST_GAME, json!({ "region": "mars" })).await;
    let reply = next_envelope(&mut player).await;
    assert_eq!(reply.data, json!({ "error": "invalid region" }));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_ping_and_garbage_frames() {
    let (_matchmaker, player_addr, _game_addr, shutdown) = start(MatchmakerConfig::local()).await;
    let mut player = connect(player_addr).await;

    player.send(Message::text("not json")).await.unwrap();
    send(&mut player, "SomethingElse", json!({})).await;
    send(&mut player, events::PING, json!({})).await;

    // Only the ping gets an answer, and the connection survives the rest.
    let reply = next_envelope(&mut player).await;
    assert_eq!(reply.event, events::PING);
    assert_eq!(reply.data, json!({}));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_restart_reaches_game_server_once() {
    let (matchmaker, _player_addr, game_addr, shutdown) = start(production_config()).await;

    let mut game = connect(game_addr).await;
    send(&mut game, events::SERVER_UPDATED, report("10.0.0.2:8001", "ams3")).await;
    wait_for_server(&matchmaker, "ams3", "10.0.0.2:8001", true).await;

    let app = http::router(Arc::clone(&matchmaker));
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(
                Request::post("/restart")
                    .body(Body::from(r#"{"region":"ams3","host":"10.0.0.2:8001"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let instruction = next_envelope(&mut game).await;
    assert_eq!(instruction.event, events::RESTART);
    assert_eq!(instruction.data, json!({}));

    // The three triggers coalesce into one instruction.
    let extra = timeout(Duration::from_millis(200), game.next()).await;
    assert!(extra.is_err(), "unexpected second frame: {extra:?}");

    let env = matchmaker.environment().await;
    assert!(env.server("ams3", "10.0.0.2:8001").unwrap().is_restarting());
    drop(env);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_disconnect_archives_populated_server() {
    let (matchmaker, _player_addr, game_addr, shutdown) = start(production_config()).await;

    let mut game = connect(game_addr).await;
    send(&mut game, events::HEARTBEAT, report("10.0.0.3:8001", "sfo2")).await;
    wait_for_server(&matchmaker, "sfo2", "10.0.0.3:8001", true).await;

    game.close(None).await.unwrap();
    wait_for_server(&matchmaker, "sfo2", "10.0.0.3:8001", false).await;

    let response = http::router(Arc::clone(&matchmaker))
        .oneshot(Request::get("/disconnected_servers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["total"], json!(1));
    assert_eq!(value["sfo2"]["10.0.0.3:8001"]["server"]["playerCount"], json!(3));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_chat_fans_out_to_region_subscribers() {
    let (_matchmaker, player_addr, _game_addr, shutdown) = start(MatchmakerConfig::local()).await;

    let mut alice = connect(player_addr).await;
    let mut bob = connect(player_addr).await;

    send(&mut alice, events::JOIN_CHAT, json!({ "region": "tor1" })).await;
    assert_eq!(next_envelope(&mut alice).await.data, json!([]));
    send(&mut bob, events::JOIN_CHAT, json!({ "region": "tor1" })).await;
    assert_eq!(next_envelope(&mut bob).await.data, json!([]));

    send(
        &mut alice,
        events::GLOBAL_CHAT,
        json!({ "region": "tor1", "username": "alice", "message": "gg", "uid": "u-1" }),
    )
    .await;

    for client in [&mut alice, &mut bob] {
        let chat = next_envelope(client).await;
        assert_eq!(chat.event, events::SERVER_CHAT);
        assert_eq!(chat.data["message"], json!("gg"));
        assert_eq!(chat.data["uid"], json!("u-1"));
    }

    let _ = shutdown.send(());
}

mod http_surface {
    use super::*;

    async fn seeded() -> Arc<Matchmaker> {
        let matchmaker = Arc::new(Matchmaker::new(
            production_config().build_environment(),
            Duration::from_secs(30),
        ));
        let conn = matchmaker.connections().register().0;
        matchmaker
            .handle_report(conn, ServerReport::new("10.0.0.9:8001", "nyc1"), true)
            .await
            .unwrap();
        matchmaker
    }

    async fn get_json(matchmaker: &Arc<Matchmaker>, uri: &str) -> (StatusCode, Value) {
        let response = http::router(Arc::clone(matchmaker))
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn post(matchmaker: &Arc<Matchmaker>, uri: &str, body: &'static str) -> (StatusCode, Value) {
        let response = http::router(Arc::clone(matchmaker))
            .oneshot(Request::post(uri).body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_ping() {
        let matchmaker = seeded().await;
        let response = http::router(matchmaker)
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"pong");
    }

    #[tokio::test]
    async fn test_servers_overview() {
        let matchmaker = seeded().await;
        let (status, value) = get_json(&matchmaker, "/servers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            value,
            json!({
                "totalOnlineCount": 0,
                "serversByRegion": { "nyc1": { "10.0.0.9:8001": true } },
                "onlineCountByRegion": { "nyc1": 0 },
            })
        );
    }

    #[tokio::test]
    async fn test_find_server() {
        let matchmaker = seeded().await;
        let conn = matchmaker.connections().register().0;
        let mut report = ServerReport::new("10.0.0.10:8001", "lon1");
        report.games.insert("match-42".to_string(), GameInfo::private());
        matchmaker.handle_report(conn, report, false).await.unwrap();

        let (status, value) = get_json(&matchmaker, "/find_server?uid=match-42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({ "server": "10.0.0.10:8001" }));

        let (_, value) = get_json(&matchmaker, "/find_server?uid=nope").await;
        assert_eq!(value, json!({ "server": null }));

        let (status, value) = get_json(&matchmaker, "/find_server").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value, json!({ "error": "missing uid" }));
    }

    #[tokio::test]
    async fn test_restart_errors() {
        let matchmaker = seeded().await;

        let (status, value) = post(&matchmaker, "/restart", r#"{"region":"nyc1""#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value, json!({ "error": "malformed payload" }));

        let (status, value) =
            post(&matchmaker, "/restart", r#"{"region":"nyc1","host":"10.9.9.9:1"}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value, json!({ "error": "server not found" }));

        let (status, _) =
            post(&matchmaker, "/restart", r#"{"region":"nyc1","host":"10.0.0.9:8001"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert!(matchmaker.restart_pending("nyc1", "10.0.0.9:8001"));
    }

    #[tokio::test]
    async fn test_target_revision_gates_routing() {
        let matchmaker = seeded().await;

        let (status, value) = post(&matchmaker, "/target_revision", r#"{"revision":"r2"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({ "success": true }));

        let request = matchmaker::messaging::RequestGame {
            region: "nyc1".to_string(),
            mode: None,
            uid: None,
        };
        assert_eq!(
            matchmaker.request_game(&request).await,
            matchmaker::messaging::RequestGameStatus::Failed {
                error: "servers full".to_string()
            }
        );

        post(&matchmaker, "/target_revision", r#"{"revision":null}"#).await;
        assert!(matches!(
            matchmaker.request_game(&request).await,
            matchmaker::messaging::RequestGameStatus::Matched { .. }
        ));
    }

    async fn seeded_with_details() -> Arc<Matchmaker> {
        let matchmaker = seeded().await;
        let conn = matchmaker.connections().register().0;
        let mut report = ServerReport::new("10.0.0.11:8001", "ams3");
        report.memory = 512.5;
        report.player_count = 7;
        report.revision = Some("r9".to_string());
        report.systemd_index = Some(2);
        report.debug_port = Some(9229);
        let mut public = GameInfo::public();
        public.payload.insert("mode".to_string(), json!("ffa"));
        report.games.insert("g-open".to_string(), public);
        report.games.insert("g-closed".to_string(), GameInfo::private());
        matchmaker.handle_report(conn, report, true).await.unwrap();
        matchmaker
    }

    #[tokio::test]
    async fn test_server_status_shape() {
        let matchmaker = seeded_with_details().await;
        let (status, value) = get_json(&matchmaker, "/server_status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            value["ams3"]["10.0.0.11:8001"],
            json!({
                "host": "10.0.0.11:8001",
                "memory": 512.5,
                "playerCount": 7,
                "revision": "r9",
                "systemdIndex": 2,
                "gameCount": 2,
                "debugPort": 9229,
            })
        );
        assert_eq!(value["nyc1"]["10.0.0.9:8001"]["revision"], Value::Null);
    }

    #[tokio::test]
    async fn test_game_list_hides_private_games() {
        let matchmaker = seeded_with_details().await;
        let (status, value) = get_json(&matchmaker, "/game_list").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            value,
            json!({ "g-open": { "isPrivate": false, "mode": "ffa" } })
        );
    }

    #[tokio::test]
    async fn test_all_servers_by_region() {
        let matchmaker = seeded_with_details().await;
        let (status, value) = get_json(&matchmaker, "/servers/all").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            value,
            json!({
                "ams3": { "10.0.0.11:8001": { "playerCount": 7 } },
                "nyc1": { "10.0.0.9:8001": { "playerCount": 0 } },
            })
        );
    }
}
