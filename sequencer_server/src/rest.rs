//! REST surface layered alongside the WebSocket collaboration channel:
//! session lifecycle (create/read/replace/patch/remix/publish) for
//! clients and tooling that do not need a live connection.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sequencer_core::document::SessionDocument;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::actor::ActorCommand;
use crate::error::AppError;
use crate::persistence::SessionRecord;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PutSessionRequest {
    pub document: SessionDocument,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<SessionDocument>,
}

#[derive(Debug, Serialize)]
pub struct RemixResponse {
    pub id: String,
    #[serde(rename = "remixedFrom")]
    pub remixed_from: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub name: String,
    pub document: SessionDocument,
    pub immutable: bool,
    #[serde(rename = "serverSeq")]
    pub server_seq: u64,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
}

impl From<SessionRecord> for SessionResponse {
    fn from(r: SessionRecord) -> Self {
        SessionResponse {
            id: r.id,
            name: r.name,
            document: r.document,
            immutable: r.immutable,
            server_seq: r.server_seq,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

async fn replace_document(
    state: &AppState,
    id: &str,
    document: Option<SessionDocument>,
    name: Option<String>,
) -> Result<SessionRecord, AppError> {
    replace_document_with_origin(state, id, document, name, None).await
}

async fn replace_document_with_origin(
    state: &AppState,
    id: &str,
    document: Option<SessionDocument>,
    name: Option<String>,
    remix_origin: Option<(String, String)>,
) -> Result<SessionRecord, AppError> {
    let existing = state.registry.record(id).await?;
    if existing.immutable && document.is_some() {
        return Err(AppError::SessionPublished);
    }
    let handle = state.registry.get_or_spawn(id).await?;
    let (tx, rx) = oneshot::channel();
    handle
        .tx
        .send(ActorCommand::ReplaceDocument { document, name, remix_origin, reply: tx })
        .await
        .map_err(|_| AppError::Internal("actor channel closed".to_string()))?;
    rx.await.map_err(|_| AppError::Internal("actor dropped reply".to_string()))
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let id = Uuid::new_v4().to_string();
    let record = state.registry.create(&id).await?;
    let record = if req.name.is_some() {
        replace_document(&state, &id, None, req.name).await?
    } else {
        record
    };
    Ok((StatusCode::CREATED, Json(record.into())))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let record = state.registry.record(&id).await?;
    Ok(Json(record.into()))
}

pub async fn put_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PutSessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let record = replace_document(&state, &id, Some(req.document), req.name).await?;
    Ok(Json(record.into()))
}

pub async fn patch_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PatchSessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let record = replace_document(&state, &id, req.state, req.name).await?;
    Ok(Json(record.into()))
}

pub async fn remix_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RemixResponse>), AppError> {
    let source = state.registry.record(&id).await?;
    let new_id = Uuid::new_v4().to_string();
    state.registry.create(&new_id).await?;
    replace_document_with_origin(
        &state,
        &new_id,
        Some(source.document),
        Some(source.name.clone()),
        Some((id.clone(), source.name.clone())),
    )
    .await?;

    let source_handle = state.registry.get_or_spawn(&id).await?;
    let (tx, rx) = oneshot::channel();
    source_handle
        .tx
        .send(ActorCommand::IncrementRemixCount { reply: tx })
        .await
        .map_err(|_| AppError::Internal("actor channel closed".to_string()))?;
    rx.await.map_err(|_| AppError::Internal("actor dropped reply".to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(RemixResponse {
            id: new_id.clone(),
            remixed_from: id,
            url: format!("/s/{new_id}"),
        }),
    ))
}

pub async fn publish_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<PublishResponse>), AppError> {
    let handle = state.registry.get_or_spawn(&id).await?;
    let (tx, rx) = oneshot::channel();
    handle
        .tx
        .send(ActorCommand::Publish { reply: tx })
        .await
        .map_err(|_| AppError::Internal("actor channel closed".to_string()))?;
    let new_record = rx
        .await
        .map_err(|_| AppError::Internal("actor dropped reply".to_string()))??;

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            id: new_record.id.clone(),
            url: format!("/s/{}", new_record.id),
        }),
    ))
}
