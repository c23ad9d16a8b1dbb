//! The HTTP front door. Thin JSON adapters over [`LiquidityPoolEngine`] — every
//! validation, margin calculation and lock lives in the engine; this module only
//! (de)serialises and maps engine errors to the documented status codes, which differ per
//! route exactly as they do in the reference Flask app (each handler maps its own errors).

use crate::currency::{Currency, Pair};
use crate::engine::LiquidityPoolEngine;
use crate::error::EngineError;
use crate::exchange::{ExchangeOutcome, ExchangeRequest};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

pub type SharedEngine = Arc<LiquidityPoolEngine>;

pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/fx-rate", post(post_fx_rate))
        .route("/transfer", post(post_transfer))
        .route("/internal/fx-rate/{pair}", get(get_fx_rate_history))
        .route("/internal/status", get(get_status))
        .route("/internal/rebalance", post(post_rebalance))
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
struct FxRateRequest {
    pair: String,
    rate: f64,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct FxRateResponse {
    pair: String,
    rate: f64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_body(message: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody { error: message.into() })
}

async fn post_fx_rate(
    State(engine): State<SharedEngine>,
    Json(body): Json<FxRateRequest>,
) -> Response {
    let timestamp = match chrono::DateTime::parse_from_rfc3339(&body.timestamp) {
        Ok(ts) => ts.with_timezone(&chrono::Utc),
        Err(err) => {
            return (StatusCode::BAD_REQUEST, error_body(format!("invalid timestamp: {err}"))).into_response()
        }
    };

    match engine.update_rate(&body.pair, body.rate, timestamp) {
        Ok((pair, rate)) => {
            (StatusCode::CREATED, Json(FxRateResponse { pair: pair.to_string(), rate })).into_response()
        }
        Err(err @ (EngineError::UnsupportedPair(_) | EngineError::ParseError(_))) => {
            (StatusCode::BAD_REQUEST, error_body(err.to_string())).into_response()
        }
        Err(err) => {
            error!(error = %err, "unexpected error updating rate");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("something went wrong, please try again later"))
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    from: String,
    to: String,
    amount: f64,
}

#[derive(Debug, Serialize)]
struct TransferResponse {
    fx_rate: FxRateResponse,
    from: LegResponse,
    to: LegResponse,
    fees: FeesResponse,
}

#[derive(Debug, Serialize)]
struct LegResponse {
    currency: String,
    amount: f64,
}

#[derive(Debug, Serialize)]
struct FeesResponse {
    currency: String,
    amount: f64,
}

impl From<ExchangeOutcome> for TransferResponse {
    fn from(outcome: ExchangeOutcome) -> Self {
        TransferResponse {
            fx_rate: FxRateResponse {
                pair: format!("{}/{}", outcome.from, outcome.to),
                rate: outcome.rate,
            },
            from: LegResponse { currency: outcome.from.to_string(), amount: outcome.actual_from },
            to: LegResponse { currency: outcome.to.to_string(), amount: outcome.to_amount },
            fees: FeesResponse { currency: outcome.from.to_string(), amount: outcome.margin_profit },
        }
    }
}

async fn post_transfer(State(engine): State<SharedEngine>, Json(body): Json<TransferRequest>) -> Response {
    let request = ExchangeRequest {
        from: Currency::new(body.from),
        to: Currency::new(body.to),
        amount: body.amount,
    };

    match engine.exchange(request).await {
        Ok(outcome) => (StatusCode::OK, Json(TransferResponse::from(outcome))).into_response(),
        Err(err @ (EngineError::UnsupportedCurrency(_)
        | EngineError::UnsupportedPair(_)
        | EngineError::InvalidAmount(_))) => (StatusCode::BAD_REQUEST, error_body(err.to_string())).into_response(),
        Err(err) => {
            error!(error = %err, "transfer rejected");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("something went wrong, please try again later"))
                .into_response()
        }
    }
}

async fn get_fx_rate_history(State(engine): State<SharedEngine>, Path(pair): Path<String>) -> Response {
    let pair = match Pair::from_dash_separated(&pair) {
        Some(pair) => pair,
        None => {
            return (StatusCode::NOT_FOUND, error_body(format!("malformed pair: {pair}"))).into_response()
        }
    };

    match engine.rate_history(&pair) {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(err) => (StatusCode::NOT_FOUND, error_body(err.to_string())).into_response(),
    }
}

async fn get_status(State(engine): State<SharedEngine>) -> Response {
    (StatusCode::OK, Json(engine.status())).into_response()
}

async fn post_rebalance(State(engine): State<SharedEngine>) -> impl IntoResponse {
    engine.manual_rebalance().await;
    StatusCode::CREATED
}
