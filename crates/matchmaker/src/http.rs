//! Operator query surface over HTTP.
//!
//! Request bodies are taken as raw bytes, which axum only yields once the whole
//! body has arrived, and parsed here. An aborted or malformed upload is
//! rejected before any handler side effect runs.

use crate::collaborators::guarded;
use crate::error::ServiceError;
use crate::service::Matchmaker;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fleet_registry::{DisconnectedServer, GameInfo, ServerStatus, ServerSummary};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

type SharedMatchmaker = Arc<Matchmaker>;

pub fn router(matchmaker: SharedMatchmaker) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/servers", get(servers))
        .route("/servers/all", get(all_servers))
        .route("/server_status", get(server_status))
        .route("/game_list", get(game_list))
        .route("/find_server", get(find_server))
        .route("/disconnected_servers", get(disconnected_servers))
        .route("/restart", post(restart))
        .route("/target_revision", post(target_revision))
        .with_state(matchmaker)
}

/// `{ "error": reason }` with a status code chosen by category.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Validation(_) | ServiceError::Transport(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.reason() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn respond<T, F>(matchmaker: &Matchmaker, context: &str, fut: F) -> ApiResult<T>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    guarded(matchmaker.crash_reporter(), context, fut)
        .await
        .map(Json)
        .map_err(ApiError)
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ServiceError> {
    Ok(serde_json::from_slice(body)?)
}

async fn ping() -> &'static str {
    "pong"
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServersOverview {
    pub total_online_count: u32,
    pub servers_by_region: BTreeMap<String, BTreeMap<String, bool>>,
    pub online_count_by_region: BTreeMap<String, u32>,
}

async fn servers(State(mm): State<SharedMatchmaker>) -> ApiResult<ServersOverview> {
    respond(&mm, "GET /servers", async {
        let env = mm.environment().await;
        Ok(ServersOverview {
            total_online_count: env.total_online_count(),
            servers_by_region: env.one_server_by_region(),
            online_count_by_region: env.online_count_by_region(),
        })
    })
    .await
}

async fn all_servers(
    State(mm): State<SharedMatchmaker>,
) -> ApiResult<BTreeMap<String, BTreeMap<String, ServerSummary>>> {
    respond(&mm, "GET /servers/all", async {
        Ok(mm.environment().await.servers_by_region())
    })
    .await
}

async fn server_status(
    State(mm): State<SharedMatchmaker>,
) -> ApiResult<BTreeMap<String, BTreeMap<String, ServerStatus>>> {
    respond(&mm, "GET /server_status", async {
        Ok(mm.environment().await.server_status())
    })
    .await
}

async fn game_list(State(mm): State<SharedMatchmaker>) -> ApiResult<BTreeMap<String, GameInfo>> {
    respond(&mm, "GET /game_list", async {
        Ok(mm.environment().await.public_games())
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct FindServerQuery {
    pub uid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindServerResponse {
    pub server: Option<String>,
}

async fn find_server(
    State(mm): State<SharedMatchmaker>,
    Query(query): Query<FindServerQuery>,
) -> ApiResult<FindServerResponse> {
    respond(&mm, "GET /find_server", async {
        let uid = query
            .uid
            .ok_or_else(|| ServiceError::Validation("missing uid".to_string()))?;
        Ok(FindServerResponse {
            server: mm.environment().await.find_game_host(&uid),
        })
    })
    .await
}

#[derive(Debug, Serialize)]
pub struct DisconnectedOverview {
    #[serde(flatten)]
    pub regions: BTreeMap<String, BTreeMap<String, DisconnectedServer>>,
    pub total: usize,
}

async fn disconnected_servers(State(mm): State<SharedMatchmaker>) -> ApiResult<DisconnectedOverview> {
    respond(&mm, "GET /disconnected_servers", async {
        let env = mm.environment().await;
        Ok(DisconnectedOverview {
            regions: env.disconnected_servers(),
            total: env.disconnected_server_count(),
        })
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct RestartRequest {
    pub region: String,
    pub host: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Success {
    pub success: bool,
}

async fn restart(State(mm): State<SharedMatchmaker>, body: Bytes) -> ApiResult<Success> {
    respond(&mm, "POST /restart", async {
        let request: RestartRequest = parse_body(&body)?;
        mm.trigger_restart(&request.region, &request.host).await?;
        Ok(Success { success: true })
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct TargetRevisionRequest {
    pub revision: Option<String>,
}

async fn target_revision(State(mm): State<SharedMatchmaker>, body: Bytes) -> ApiResult<Success> {
    respond(&mm, "POST /target_revision", async {
        let request: TargetRevisionRequest = parse_body(&body)?;
        mm.set_target_revision(request.revision).await;
        Ok(Success { success: true })
    })
    .await
}
