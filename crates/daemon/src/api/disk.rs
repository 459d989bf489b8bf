// SPDX-License-Identifier: MIT

//! `/disk` handlers (spec.md §6): analogous CRUD to `/machine`, minus
//! lifecycle control (disks have no running state of their own).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use zd_core::{DiskId, DiskOptions, DiskSpec, PropertyMap};

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct DiskSpecBody {
    pub options: DiskOptions,
    #[serde(default)]
    pub properties: PropertyMap,
}

pub async fn list(State(st): State<AppState>) -> Json<Value> {
    let entries: Vec<Value> = st.registry.list_disks().into_iter().map(|d| serde_json::to_value(d).unwrap_or(Value::Null)).collect();
    Json(Value::Array(entries))
}

pub async fn get(State(st): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = DiskId::parse(id).map_err(ApiError)?;
    let spec = st.registry.get_disk(&id).map_err(ApiError)?;
    Ok(Json(serde_json::to_value(spec).unwrap_or(Value::Null)))
}

pub async fn upsert(
    State(st): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DiskSpecBody>,
) -> Result<Json<Value>, ApiError> {
    let id = DiskId::parse(id).map_err(ApiError)?;
    let spec = DiskSpec { disk_id: id.clone(), options: body.options, properties: body.properties };
    st.registry.add_disk(spec, true).await.map_err(ApiError)?;
    Ok(Json(json!(id.as_str())))
}

pub async fn remove(State(st): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = DiskId::parse(id).map_err(ApiError)?;
    st.registry.remove_disk(&id).map_err(ApiError)?;
    Ok(Json(json!(null)))
}
