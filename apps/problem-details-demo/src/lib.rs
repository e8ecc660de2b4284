#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Demo server for the `problem-details` crate.
//!
//! Routes:
//! - `GET /?status=N[&raise_error]&...` renders an error from query parameters
//! - `POST /accounts/{account}?price=N` fails with the RFC 7807 "out of credit" problem
//! - `GET /invalid-params?age=N&color=C` fails with the RFC 7807 validation problem
//! - `POST /customers`, `GET /customers/{id}` a small customer service
//! - `GET /panic` panics inside the handler

pub mod accounts;
pub mod config;
pub mod customers;
pub mod logging;
pub mod playground;
pub mod shutdown;
pub mod validation;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Router, middleware};
use problem_details::ErrorWriter;
use problem_details::axum::{panic_response, write_errors};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::customers::CustomerStore;

/// Build the application router from the effective configuration.
///
/// # Errors
/// Returns an error if the `problem` section is invalid.
pub fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let writer = customers::register_encoders(ErrorWriter::from_config(&config.problem)?);
    build_router(writer, CustomerStore::default())
}

/// Assemble the routes with the error-writing middleware around them.
///
/// Layer order matters: panics are caught first, then every failure is
/// rendered by `writer`, then the request span is closed.
///
/// # Errors
/// Returns an error if the customer schema does not compile.
pub fn build_router(writer: ErrorWriter, store: CustomerStore) -> anyhow::Result<Router> {
    Ok(Router::new()
        .route("/", get(playground::handler))
        .route("/panic", get(playground::panics))
        .route("/accounts/{account}", post(accounts::purchase))
        .route("/invalid-params", get(validation::check_params))
        .merge(customers::router(store)?)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(Arc::new(writer), write_errors))
        .layer(TraceLayer::new_for_http()))
}
