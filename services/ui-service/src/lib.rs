//! HomeLens CA front-end: an HTML form whose submissions are relayed to the prediction
//! service.

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Form, Json, Router};
use homelens_core::EXAMPLE_ROWS;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub mod client;
pub mod config;
pub mod form;

use crate::client::{FormValues, PredictionClient};
use crate::config::UiConfig;
use crate::form::PageResult;

#[derive(Clone)]
pub struct UiState {
    pub client: Arc<PredictionClient>,
}

#[derive(Debug, Deserialize)]
struct IndexQuery {
    example: Option<usize>,
}

async fn index(Query(q): Query<IndexQuery>) -> Html<String> {
    let values = q.example.and_then(|i| EXAMPLE_ROWS.get(i)).map(FormValues::from);
    Html(form::render(values.as_ref(), &PageResult::None))
}

async fn submit(State(state): State<UiState>, Form(values): Form<FormValues>) -> (StatusCode, Html<String>) {
    match state.client.predict(&values).await {
        Ok(prediction) => {
            info!(?prediction, "prediction relayed");
            (StatusCode::OK, Html(form::render(Some(&values), &PageResult::Prediction(prediction))))
        }
        Err(e) => {
            error!(error = %e, url = state.client.url(), "prediction relay failed");
            let result = PageResult::Failure { message: e.user_message(), detail: e.detail().map(str::to_string) };
            (StatusCode::BAD_GATEWAY, Html(form::render(Some(&values), &result)))
        }
    }
}

async fn live() -> Json<Value> { Json(json!({ "live": true })) }

pub fn router(state: UiState) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/live", get(live))
        .with_state(state)
}

pub async fn run(cfg: UiConfig) -> Result<()> {
    let client = PredictionClient::new(cfg.model_serving_url.clone(), cfg.request_timeout)?;
    let state = UiState { client: Arc::new(client) };
    let listener = TcpListener::bind(cfg.bind_addr).await.with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, model_serving_url = %cfg.model_serving_url, "ui service listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(async { let _ = tokio::signal::ctrl_c().await; }).await?;
    info!("shutting down the ui service");
    Ok(())
}
