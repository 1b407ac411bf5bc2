//! Resource handlers behind the admission filter. Write-style operations
//! enqueue work onto the broker and return `202 Accepted`; read-style
//! operations answer from the in-memory stores.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::state::GatewayState;
use crate::domain::{
    BrandQuery, ConsentChannel, ConsentQuery, ConsentStatus, SyncBatch, SyncEntry,
};

type HandlerResult<T> = std::result::Result<T, (StatusCode, String)>;

#[derive(Debug, Deserialize)]
pub struct ConsentSearchRequest {
    pub recipient: String,
    pub channel: ConsentChannel,
}

#[derive(Debug, Deserialize)]
pub struct ConsentSubmission {
    pub recipient: String,
    pub channel: ConsentChannel,
    pub status: ConsentStatus,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BrandSearchRequest {
    pub service_provider: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueuedResponse {
    pub request_id: Uuid,
}

async fn enqueue(state: &GatewayState, topic: &str, payload: Vec<u8>) -> HandlerResult<()> {
    state
        .context
        .broker()
        .publish(topic, payload)
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, format!("enqueue failed: {e}")))
}

fn encode<T: Serialize>(value: &T) -> HandlerResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// POST /consent/search
pub async fn search_consent(
    State(state): State<GatewayState>,
    Json(req): Json<ConsentSearchRequest>,
) -> HandlerResult<(StatusCode, Json<EnqueuedResponse>)> {
    let query = ConsentQuery {
        request_id: Uuid::new_v4(),
        recipient: req.recipient,
        channel: req.channel,
    };
    let topic = state.context.topic_set().consent_search.name.clone();
    enqueue(&state, &topic, encode(&query)?).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            request_id: query.request_id,
        }),
    ))
}

/// POST /consent -- single consent submission, carried by the sync topic
pub async fn add_consent(
    State(state): State<GatewayState>,
    Json(req): Json<ConsentSubmission>,
) -> HandlerResult<(StatusCode, Json<EnqueuedResponse>)> {
    let batch = SyncBatch {
        request_id: Uuid::new_v4(),
        entries: vec![SyncEntry {
            recipient: req.recipient,
            channel: req.channel,
            status: req.status,
            source: req.source,
        }],
    };
    let topic = state.context.topic_set().sync.name.clone();
    enqueue(&state, &topic, encode(&batch)?).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            request_id: batch.request_id,
        }),
    ))
}

/// POST /consent/batch
pub async fn add_consent_batch(
    State(state): State<GatewayState>,
    Json(entries): Json<Vec<SyncEntry>>,
) -> HandlerResult<(StatusCode, Json<EnqueuedResponse>)> {
    let batch = SyncBatch {
        request_id: Uuid::new_v4(),
        entries,
    };
    let topic = state.context.topic_set().sync.name.clone();
    enqueue(&state, &topic, encode(&batch)?).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            request_id: batch.request_id,
        }),
    ))
}

/// POST /brands/search
pub async fn search_brands(
    State(state): State<GatewayState>,
    Json(req): Json<BrandSearchRequest>,
) -> HandlerResult<(StatusCode, Json<EnqueuedResponse>)> {
    let query = BrandQuery {
        request_id: Uuid::new_v4(),
        service_provider: req.service_provider,
    };
    let topic = state.context.topic_set().brand_search.name.clone();
    enqueue(&state, &topic, encode(&query)?).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            request_id: query.request_id,
        }),
    ))
}

/// GET /kv/:key
pub async fn kv_get(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> HandlerResult<Json<serde_json::Value>> {
    match state.stores.kv.get(&key) {
        Some(value) => Ok(Json(json!({ "key": key, "value": value.value() }))),
        None => Err((StatusCode::NOT_FOUND, format!("key {key} not found"))),
    }
}

/// PUT /kv/:key
pub async fn kv_put(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
    value: String,
) -> StatusCode {
    state.stores.kv.insert(key, value);
    StatusCode::NO_CONTENT
}

/// POST /oauth/token
pub async fn oauth_token() -> Json<serde_json::Value> {
    Json(json!({
        "access_token": Uuid::new_v4().to_string(),
        "token_type": "Bearer",
        "expires_in": 3600,
    }))
}

/// GET /report/status
pub async fn report_status(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let stats = state.stores.consents.stats();
    Json(json!({
        "lifecycle": state.lifecycle.borrow().to_string(),
        "uptime_seconds": state.uptime_seconds(),
        "consents": stats,
    }))
}

/// GET /sp
pub async fn sp_list(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({ "service_providers": state.stores.brands.service_providers() }))
}

/// GET /sps
pub async fn sps_list(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let providers: Vec<_> = state
        .stores
        .brands
        .service_providers()
        .into_iter()
        .map(|sp| {
            let brand_count = state.stores.brands.search(&sp).len();
            json!({ "code": sp, "brand_count": brand_count })
        })
        .collect();
    Json(json!({ "service_providers": providers }))
}

/// GET /retailers
pub async fn retailers_list(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let titles: Vec<_> = state
        .stores
        .brands
        .all()
        .into_iter()
        .map(|b| b.title)
        .collect();
    Json(json!({ "retailers": titles }))
}

/// GET /recipients/:recipient/consents
pub async fn recipient_consents(
    State(state): State<GatewayState>,
    Path(recipient): Path<String>,
) -> Json<serde_json::Value> {
    let consents = state.stores.consents.consents_for(&recipient);
    Json(json!({ "recipient": recipient, "consents": consents }))
}

/// GET /integrator/status
pub async fn integrator_status(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let topics: Vec<_> = state
        .context
        .topics()
        .into_iter()
        .map(|t| t.name)
        .collect();
    Json(json!({
        "lifecycle": state.lifecycle.borrow().to_string(),
        "topics": topics,
    }))
}

/// GET /public/brands
pub async fn public_brands(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let brands = state.stores.brands.all();
    Json(json!({ "brands": brands }))
}

/// GET /government/audit
pub async fn government_audit(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let stats = state.stores.consents.stats();
    Json(json!({
        "total_consents": stats.total,
        "approved": stats.approved,
        "rejected": stats.rejected,
    }))
}

/// GET /healthz -- liveness: the process is up
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /readyz -- readiness: only a Running daemon takes traffic
pub async fn readiness(State(state): State<GatewayState>) -> (StatusCode, Json<serde_json::Value>) {
    let current = *state.lifecycle.borrow();
    let status = if current.accepts_requests() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "lifecycle": current.to_string() })))
}
