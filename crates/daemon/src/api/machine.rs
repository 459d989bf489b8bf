// SPDX-License-Identifier: MIT

//! `/machine` handlers (spec.md §6).

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use zd_core::{MachineId, MachineOptions, MachineSpec, PropertyMap, RuntimeKind};

use super::{ApiError, AppState};

/// Forceful-stop timeout used by `restart` (spec.md §4.5 default).
const RESTART_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body for `PUT /machine/<id>`: a [`MachineSpec`] without the id,
/// which comes from the path instead.
#[derive(Debug, Deserialize)]
pub struct MachineSpecBody {
    #[serde(rename = "type")]
    pub kind: RuntimeKind,
    #[serde(default)]
    pub options: MachineOptions,
    #[serde(default)]
    pub properties: PropertyMap,
}

fn with_status(spec: MachineSpec, status: &str) -> Value {
    let mut v = serde_json::to_value(spec).unwrap_or(Value::Null);
    if let Some(obj) = v.as_object_mut() {
        obj.insert("_status".to_string(), json!(status));
    }
    v
}

fn status_label(state: zd_supervisor::SupervisorState) -> &'static str {
    use zd_supervisor::SupervisorState::*;
    match state {
        Running => "running",
        Stopped | Killed => "stopped",
        Starting => "starting",
        Stopping => "stopping",
    }
}

pub async fn list(State(st): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let summary = matches!(params.get("summary").map(String::as_str), Some("true" | "1" | "yes"));
    let entries: Vec<Value> = st
        .registry
        .list_machines()
        .into_iter()
        .map(|(spec, state)| {
            if summary {
                json!({ "machine_id": spec.machine_id, "_status": status_label(state) })
            } else {
                with_status(spec, status_label(state))
            }
        })
        .collect();
    Json(Value::Array(entries))
}

pub async fn get(State(st): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = MachineId::parse(id).map_err(ApiError)?;
    let (spec, state) = st.registry.get_machine(&id).map_err(ApiError)?;
    Ok(Json(with_status(spec, status_label(state))))
}

pub async fn upsert(
    State(st): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MachineSpecBody>,
) -> Result<Json<Value>, ApiError> {
    let id = MachineId::parse(id).map_err(ApiError)?;
    let spec = MachineSpec { machine_id: id.clone(), kind: body.kind, options: body.options, properties: body.properties };
    st.registry.add_machine(spec, true).map_err(ApiError)?;
    Ok(Json(json!(id.as_str())))
}

pub async fn remove(State(st): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = MachineId::parse(id).map_err(ApiError)?;
    st.registry.remove_machine(&id).map_err(ApiError)?;
    Ok(Json(json!(null)))
}

pub async fn start(State(st): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = MachineId::parse(id).map_err(ApiError)?;
    st.registry.start_machine(&id).await.map_err(ApiError)?;
    Ok(Json(json!(null)))
}

/// Fire-and-forget, matching the original's background-thread `stop`: the
/// caller gets 200 immediately, the graceful stop runs on its own.
pub async fn stop(State(st): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = MachineId::parse(id).map_err(ApiError)?;
    // Confirm the machine exists before detaching the stop.
    st.registry.get_machine(&id).map_err(ApiError)?;
    tokio::spawn(async move {
        if let Err(e) = st.registry.stop_machine(&id).await {
            tracing::warn!(machine_id = %id, error = %e, "async stop failed");
        }
    });
    Ok(Json(json!(null)))
}

/// Forceful stop then start, synchronously (matches the original's `restart`).
pub async fn restart(State(st): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = MachineId::parse(id).map_err(ApiError)?;
    st.registry.forceful_stop(&id, RESTART_TIMEOUT).await.map_err(ApiError)?;
    st.registry.start_machine(&id).await.map_err(ApiError)?;
    Ok(Json(json!(null)))
}

pub async fn get_property(
    State(st): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let id = MachineId::parse(id).map_err(ApiError)?;
    let value = st.registry.get_property(&id, &key).map_err(ApiError)?;
    Ok(Json(value))
}

pub async fn set_property(
    State(st): State<AppState>,
    Path((id, key)): Path<(String, String)>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let id = MachineId::parse(id).map_err(ApiError)?;
    st.registry.set_property(&id, &key, value).map_err(ApiError)?;
    Ok(Json(json!(null)))
}

pub async fn del_property(
    State(st): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let id = MachineId::parse(id).map_err(ApiError)?;
    st.registry.del_property(&id, &key).map_err(ApiError)?;
    Ok(Json(json!(null)))
}
