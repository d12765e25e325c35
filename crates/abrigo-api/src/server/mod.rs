use std::fmt;
use std::net::SocketAddr;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use chrono::Utc;
use contracts::{
    ApiError, BeneficiaryUpdate, EntryAnnotation, EntryRequest, ErrorCode, ExitRequest,
    MovementFilter, NewBeneficiary, NewInstitution, NewStockItem, SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::{PersistenceError, ReliefApi, RequestError};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;
const DEFAULT_EQUITY_WINDOW_DAYS: u32 = 30;
const DEFAULT_TOP_N: usize = 10;

include!("error.rs");
include!("state.rs");
include!("util.rs");
include!("routes/stock.rs");
include!("routes/beneficiaries.rs");
include!("routes/institutions.rs");
include!("routes/reports.rs");

pub async fn serve(addr: SocketAddr, api: ReliefApi) -> Result<(), ServerError> {
    let state = AppState::new(api);
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/stock/items", get(list_items).post(create_item))
        .route("/api/v1/stock/items/{item_id}/on_hand", get(get_on_hand))
        .route("/api/v1/stock/categories", get(list_categories))
        .route("/api/v1/stock/entries", post(register_entry))
        .route("/api/v1/stock/exits", post(request_exit))
        .route("/api/v1/stock/movements", get(list_movements))
        .route(
            "/api/v1/stock/movements/{entry_id}",
            patch(annotate_movement),
        )
        .route("/api/v1/stock/overview", get(stock_overview))
        .route(
            "/api/v1/beneficiaries",
            get(search_beneficiaries).post(register_beneficiary),
        )
        .route(
            "/api/v1/beneficiaries/{national_id}",
            put(update_beneficiary),
        )
        .route(
            "/api/v1/beneficiaries/{national_id}/lookup",
            get(lookup_beneficiary),
        )
        .route(
            "/api/v1/institutions",
            get(list_institutions).post(register_institution),
        )
        .route("/api/v1/institutions/pending", get(pending_institutions))
        .route(
            "/api/v1/institutions/{institution_id}/approve",
            post(approve_institution),
        )
        .route(
            "/api/v1/institutions/{institution_id}/deactivate",
            post(deactivate_institution),
        )
        .route(
            "/api/v1/institutions/{institution_id}",
            delete(remove_institution),
        )
        .route("/api/v1/alerts/evaluate", post(evaluate_distribution))
        .route("/api/v1/alerts/least_served", get(least_served))
        .route(
            "/api/v1/alerts/policy",
            get(get_policy).post(override_policy),
        )
        .route("/api/v1/reports/equity", get(equity_report))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests;
