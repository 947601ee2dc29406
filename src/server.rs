//! HTTP front end for the calculator.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::calculator::{CalculatorError, MortgageCalculator};
use crate::config::ServerConfig;
use crate::rates::format_rate;
use crate::validation::{MortgageAmountParams, PaymentAmountParams, ValidationError, ValidationErrors};

const PAYMENT_AMOUNT: &str = "Payment Amount";
const MORTGAGE_AMOUNT: &str = "Mortgage Amount";
const INTEREST_RATE: &str = "Interest Rate";

/// Response body for every calculator endpoint
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Envelope {
    Success {
        request: String,
        request_params: Value,
        response: Value,
    },
    Error {
        request: String,
        request_params: Value,
        errors: Vec<String>,
    },
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    calculator: Arc<MortgageCalculator>,
}

fn success(operation: &str, request_params: Value, response: Value) -> Response {
    let body = Envelope::Success {
        request: operation.to_string(),
        request_params,
        response,
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn failure(operation: &str, err: CalculatorError) -> Response {
    let (status, errors) = match &err {
        CalculatorError::Invalid(errors) => (StatusCode::BAD_REQUEST, errors.messages()),
        err if err.is_client_error() => (StatusCode::BAD_REQUEST, vec![err.to_string()]),
        _ => {
            error!(request = operation, error = %err, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, vec![err.to_string()])
        }
    };
    let body = Envelope::Error {
        request: operation.to_string(),
        request_params: json!({}),
        errors,
    };
    (status, Json(body)).into_response()
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "version": crate::VERSION }))
}

type QueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

// Repeated keys keep their last value, the way form-encoded queries are usually read.
fn params_from_query<P: FromIterator<(String, String)>>(query: QueryPairs) -> Result<P, CalculatorError> {
    match query {
        Ok(Query(pairs)) => Ok(pairs.into_iter().collect()),
        Err(rejection) => {
            warn!(error = %rejection, "query string rejected");
            Err(ValidationErrors::from(ValidationError::MalformedQuery).into())
        }
    }
}

/// GET /payment-amount
async fn payment_amount(State(state): State<AppState>, query: QueryPairs) -> Response {
    let params: PaymentAmountParams = match params_from_query(query) {
        Ok(params) => params,
        Err(err) => return failure(PAYMENT_AMOUNT, err),
    };

    match state.calculator.payment_amount(&params) {
        Ok(calculation) => success(PAYMENT_AMOUNT, json!(calculation.query), json!(calculation.value)),
        Err(err) => failure(PAYMENT_AMOUNT, err),
    }
}

/// GET /mortgage-amount
async fn mortgage_amount(State(state): State<AppState>, query: QueryPairs) -> Response {
    let params: MortgageAmountParams = match params_from_query(query) {
        Ok(params) => params,
        Err(err) => return failure(MORTGAGE_AMOUNT, err),
    };

    match state.calculator.mortgage_amount(&params) {
        Ok(calculation) => success(MORTGAGE_AMOUNT, json!(calculation.query), json!(calculation.value)),
        Err(err) => failure(MORTGAGE_AMOUNT, err),
    }
}

/// GET /interest-rate - rate in effect now
async fn current_rate(State(state): State<AppState>) -> Response {
    match state.calculator.current_rate() {
        Ok(record) => success(
            INTEREST_RATE,
            json!({}),
            json!({
                "rate": format_rate(record.rate),
                "effective_from": record.effective_from.to_rfc3339(),
            }),
        ),
        Err(err) => failure(INTEREST_RATE, err),
    }
}

// The rate may arrive as a JSON string or number.
fn rate_from_body(body: &[u8]) -> Result<Option<String>, ValidationErrors> {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) else {
        return Err(ValidationError::MalformedBody.into());
    };

    match fields.get("interestrate") {
        None => Ok(None),
        Some(Value::String(rate)) => Ok(Some(rate.clone())),
        Some(Value::Number(rate)) => Ok(Some(rate.to_string())),
        Some(_) => Err(ValidationError::NotANumber("interestrate").into()),
    }
}

/// PATCH /interest-rate - body `{"interestrate": "0.03"}`
async fn update_rate(State(state): State<AppState>, body: Bytes) -> Response {
    let raw = match rate_from_body(&body) {
        Ok(raw) => raw,
        Err(errors) => return failure(INTEREST_RATE, errors.into()),
    };

    match state.calculator.update_rate(raw.as_deref()) {
        Ok(change) => {
            let new_rate = format_rate(change.current.rate);
            success(
                INTEREST_RATE,
                json!({ "interestrate": new_rate }),
                json!({
                    "old_rate": change.previous.map(|record| format_rate(record.rate)),
                    "new_rate": new_rate,
                }),
            )
        }
        Err(err) => failure(INTEREST_RATE, err),
    }
}

/// Build the application router
pub fn build_router(calculator: Arc<MortgageCalculator>) -> Router {
    let state = AppState { calculator };

    Router::new()
        .route("/health", get(health))
        .route("/payment-amount", get(payment_amount))
        .route("/mortgage-amount", get(mortgage_amount))
        .route("/interest-rate", get(current_rate).patch(update_rate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("Received shutdown signal");
}

/// Bind to the configured address and serve until Ctrl+C
pub async fn serve(config: &ServerConfig, calculator: Arc<MortgageCalculator>) -> anyhow::Result<()> {
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "mortgage server listening");

    axum::serve(listener, build_router(calculator))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("mortgage server stopped");
    Ok(())
}
