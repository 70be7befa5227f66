//! HTTP and WebSocket surface for collaborative studies.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRequestParts, Path, State,
    },
    http::{request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_hub_core::chapter::{ChapterData, ChapterMode, Orientation};
use study_hub_core::error::ActionError;
use study_hub_core::hub::StudyHub;
use study_hub_core::protocol::{Action, ReloadData, ServerEvent};
use study_hub_core::study::{Member, MemberRole, Visibility};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

/// Caller identity extracted from request headers. Real token verification
/// is a separate concern handled upstream of this service.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: String,
    pub display_name: String,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let user_id = headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(StatusCode::UNAUTHORIZED)?;
        let display_name = headers
            .get("X-User-Name")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| user_id.clone());
        Ok(Self {
            user_id,
            display_name,
        })
    }
}

/// Shared application state: the study registry.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<StudyHub>,
}

#[derive(Deserialize)]
struct CreateStudyRequest {
    name: String,
    #[serde(default = "default_visibility")]
    visibility: Visibility,
    #[serde(default)]
    chapter_name: Option<String>,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

#[derive(Serialize)]
struct CreateStudyResponse {
    id: Uuid,
}

pub fn router(hub: Arc<StudyHub>) -> Router {
    let state = AppState { hub };
    Router::new()
        .route("/studies", post(create_study))
        .route("/studies/{id}", get(get_study))
        .route("/studies/{id}/ws", get(study_ws))
        .with_state(state)
}

async fn create_study(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateStudyRequest>,
) -> Result<Json<CreateStudyResponse>, StatusCode> {
    if req.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let owner = Member::new(auth.user_id, auth.display_name, MemberRole::Owner);
    let room = state
        .hub
        .create(
            req.name,
            owner,
            req.visibility,
            ChapterData {
                name: req.chapter_name.unwrap_or_else(|| "Chapter 1".into()),
                variant: None,
                from_fen: None,
                orientation: Orientation::White,
                mode: ChapterMode::Normal,
                set_active: true,
            },
        )
        .await;
    Ok(Json(CreateStudyResponse { id: room.id() }))
}

async fn get_study(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ReloadData>, StatusCode> {
    let room = state.hub.get(id).await.ok_or(StatusCode::NOT_FOUND)?;
    match room.snapshot(&auth.user_id).await {
        Ok(data) => Ok(Json(data)),
        Err(ActionError::PermissionDenied(_)) => Err(StatusCode::FORBIDDEN),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn study_ws(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    auth: AuthContext,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| async move {
        handle_study_ws(socket, id, state, auth).await;
    })
}

async fn handle_study_ws(mut socket: WebSocket, id: Uuid, state: AppState, auth: AuthContext) {
    let Some(room) = state.hub.get(id).await else {
        let _ = socket.close().await;
        return;
    };
    let socket_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    let data = match room.connect(socket_id, &auth.user_id, tx.clone()).await {
        Ok(data) => data,
        Err(err) => {
            let denied = ServerEvent::Denied {
                reason: err.to_string(),
            };
            let _ = socket
                .send(Message::Text(serde_json::to_string(&denied).unwrap().into()))
                .await;
            let _ = socket.close().await;
            return;
        }
    };
    tracing::debug!(study = %id, user = %auth.user_id, socket = %socket_id, "connected");

    let (mut sender, mut receiver) = socket.split();
    let hello = ServerEvent::Reload { data };
    if sender
        .send(Message::Text(serde_json::to_string(&hello).unwrap().into()))
        .await
        .is_err()
    {
        room.disconnect(socket_id, &auth.user_id).await;
        return;
    }

    let send_task = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            let json = serde_json::to_string(&event).unwrap();
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<Action>(&text) {
                Ok(action) => room.apply(&auth.user_id, action).await,
                Err(err) => {
                    // unreadable frame: reported to this member only
                    let _ = tx.send(ServerEvent::Denied {
                        reason: format!("malformed action: {err}"),
                    });
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    room.disconnect(socket_id, &auth.user_id).await;
    tracing::debug!(study = %id, user = %auth.user_id, "disconnected");
}
