//! Admin endpoints: QR login, credential inspection, manual cleanup.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use super::server::ApiError;
use super::state::{GuardedCleanup, GuardedCredentialStore, GuardedQrSessions, ServerState};
use crate::catalog::{QrLoginEvent, QrLoginKind};

/// How many times a login session is polled before giving up.
const QR_POLL_ATTEMPTS: u32 = 30;
const QR_POLL_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrSessionStatus {
    Waiting,
    Scanned,
    Done,
    Timeout,
    Refused,
    Failed,
}

impl QrSessionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            QrSessionStatus::Waiting => "waiting",
            QrSessionStatus::Scanned => "scanned",
            QrSessionStatus::Done => "done",
            QrSessionStatus::Timeout => "timeout",
            QrSessionStatus::Refused => "refused",
            QrSessionStatus::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct QrSession {
    pub kind: QrLoginKind,
    pub status: QrSessionStatus,
}

async fn get_qrcode(
    State(state): State<ServerState>,
    Path(kind): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = QrLoginKind::parse(&kind)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown login kind {:?}", kind)))?;

    let qr = state.catalog.request_qrcode(kind).await.map_err(|e| {
        warn!("QR code request failed: {:#}", e);
        ApiError::Internal("failed to obtain login QR code".into())
    })?;

    let session_id = uuid::Uuid::new_v4().to_string();
    state.qr_sessions.lock().unwrap().insert(
        session_id.clone(),
        QrSession {
            kind,
            status: QrSessionStatus::Waiting,
        },
    );

    let encoded = base64::engine::general_purpose::STANDARD.encode(&qr.data);

    let sessions = state.qr_sessions.clone();
    let catalog = state.catalog.clone();
    let credentials = state.credentials.clone();
    let poll_session_id = session_id.clone();
    tokio::spawn(async move {
        let set_status = |status: QrSessionStatus| {
            if let Some(session) = sessions.lock().unwrap().get_mut(&poll_session_id) {
                session.status = status;
            }
        };

        for _ in 0..QR_POLL_ATTEMPTS {
            tokio::time::sleep(QR_POLL_DELAY).await;
            match catalog.poll_qrcode(&qr).await {
                Ok(QrLoginEvent::Waiting) => set_status(QrSessionStatus::Waiting),
                Ok(QrLoginEvent::Scanned) => set_status(QrSessionStatus::Scanned),
                Ok(QrLoginEvent::Done(credential)) => {
                    info!("QR login completed, installing credential");
                    credentials.install(credential);
                    set_status(QrSessionStatus::Done);
                    return;
                }
                Ok(QrLoginEvent::Timeout) => {
                    set_status(QrSessionStatus::Timeout);
                    return;
                }
                Ok(QrLoginEvent::Refused) => {
                    set_status(QrSessionStatus::Refused);
                    return;
                }
                Err(e) => {
                    warn!("QR poll failed: {:#}", e);
                }
            }
        }
        set_status(QrSessionStatus::Timeout);
    });

    Ok(Json(json!({
        "session_id": session_id,
        "qrcode": encoded,
    })))
}

async fn qr_status(
    State(sessions): State<GuardedQrSessions>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sessions = sessions.lock().unwrap();
    let session = sessions
        .get(&session_id)
        .ok_or_else(|| ApiError::NotFound(format!("no login session {}", session_id)))?;
    Ok(Json(json!({ "status": session.status.as_str() })))
}

/// Secrets are shown truncated; enough to recognize, not enough to reuse.
fn truncate_secret(value: &str) -> String {
    if value.chars().count() <= 10 {
        value.to_string()
    } else {
        let head: String = value.chars().take(10).collect();
        format!("{}...", head)
    }
}

async fn credential_info(State(credentials): State<GuardedCredentialStore>) -> Response {
    match credentials.current() {
        Some(credential) => Json(json!({
            "musicid": credential.musicid,
            "musickey": truncate_secret(&credential.musickey),
            "refresh_key": credential.refresh_key.as_deref().map(truncate_secret),
            "encrypt_uin": credential.encrypt_uin,
            "login_type": credential.login_type,
        }))
        .into_response(),
        None => Json(json!({ "credential": null })).into_response(),
    }
}

async fn credential_refresh(State(credentials): State<GuardedCredentialStore>) -> Response {
    credentials.check_and_refresh().await;
    Json(credentials.status()).into_response()
}

async fn credential_clear(State(credentials): State<GuardedCredentialStore>) -> Response {
    credentials.clear();
    Json(credentials.status()).into_response()
}

async fn clear_music(
    State(cleanup): State<GuardedCleanup>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = cleanup
        .clear_all()
        .map_err(|e| ApiError::Internal(format!("failed to clear music dir: {}", e)))?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub fn make_admin_routes(state: ServerState) -> Router {
    Router::new()
        .route("/get_qrcode/{kind}", get(get_qrcode))
        .route("/qr_status/{session_id}", get(qr_status))
        .route("/credential/info", get(credential_info))
        .route("/credential/refresh", post(credential_refresh))
        .route("/credential/clear", post(credential_clear))
        .route("/clear_music", post(clear_music))
        .with_state(state)
}
