// SPDX-License-Identifier: MIT

//! HTTP/JSON API (G): a thin dispatcher over `zd-registry`, translating
//! requests and responses and containing no lifecycle logic of its own
//! (spec.md §1, §6).

mod disk;
mod error;
mod machine;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use zd_registry::Registry;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Build the `/api/v1` router (spec.md §6's HTTP API table).
pub fn router(registry: Arc<Registry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/api/v1/machine", get(machine::list))
        .route("/api/v1/machine/:id", get(machine::get).put(machine::upsert).delete(machine::remove))
        .route("/api/v1/machine/:id/start", get(machine::start))
        .route("/api/v1/machine/:id/stop", get(machine::stop))
        .route("/api/v1/machine/:id/restart", get(machine::restart))
        .route(
            "/api/v1/machine/:id/property/:key",
            get(machine::get_property).put(machine::set_property).delete(machine::del_property),
        )
        .route("/api/v1/disk", get(disk::list))
        .route("/api/v1/disk/:id", get(disk::get).put(disk::upsert).delete(disk::remove))
        .with_state(state)
}
