//! Sidewalk HTTP API
//!
//! Exposes the donation endpoints used by the donation web page and wallets:
//! token prices, transaction labels, donation transactions, and the pending
//! message queue.

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::{
    http::{Method, StatusCode},
    Filter, Rejection, Reply,
};

use crate::config::ServiceConfig;
use crate::error::DonationError;
use crate::service::{DonationService, MessageQueue};

// ============================================================================
// REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Body of `POST /donate/:message`.
#[derive(Debug, Deserialize)]
pub struct DonateRequest {
    /// Donor wallet address (base58)
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriceResponse {
    pub price: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LabelResponse {
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DonateResponse {
    /// Wallet label
    pub message: String,
    /// Base64 partially signed transaction
    pub transaction: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueResponse {
    pub queue: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// CUSTOM REJECTION TYPES
// ============================================================================

/// Donation pipeline failure surfaced to the caller.
#[derive(Debug)]
pub struct DonationRejection(pub DonationError);

impl warp::reject::Reject for DonationRejection {}

fn reject(error: DonationError) -> Rejection {
    warp::reject::custom(DonationRejection(error))
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Decodes a percent-encoded path segment.
fn decode_path_message(raw: &str) -> Result<String, DonationError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|message| message.into_owned())
        .map_err(|_| DonationError::InvalidMessage(raw.to_string()))
}

fn required_token(query: TokenQuery) -> Result<String, DonationError> {
    query
        .token
        .ok_or_else(|| DonationError::UnsupportedToken(String::new()))
}

async fn get_price_handler(
    query: TokenQuery,
    service: Arc<DonationService>,
) -> Result<impl Reply, Rejection> {
    let token = required_token(query).map_err(reject)?;
    let price = service.get_price(&token).await.map_err(reject)?;
    Ok(warp::reply::json(&PriceResponse { price }))
}

async fn donate_info_handler(
    raw_message: String,
    service: Arc<DonationService>,
) -> Result<impl Reply, Rejection> {
    let message = decode_path_message(&raw_message).map_err(reject)?;
    let label = service.label(&message).map_err(reject)?;
    Ok(warp::reply::json(&LabelResponse { label }))
}

async fn donate_handler(
    raw_message: String,
    query: TokenQuery,
    request: DonateRequest,
    service: Arc<DonationService>,
) -> Result<impl Reply, Rejection> {
    let message = decode_path_message(&raw_message).map_err(reject)?;
    let token = required_token(query).map_err(reject)?;

    let donation = service
        .build_donation_transaction(request.account.as_deref(), &token, &message)
        .await
        .map_err(reject)?;

    Ok(warp::reply::json(&DonateResponse {
        message: donation.label,
        transaction: donation.transaction,
    }))
}

async fn get_queue_handler(queue: MessageQueue) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&QueueResponse {
        queue: queue.snapshot().await,
    }))
}

// ============================================================================
// CORS CONFIGURATION
// ============================================================================

/// Creates a CORS filter based on the configured allowed origins.
fn create_cors_filter(allowed_origins: &[String]) -> warp::cors::Builder {
    let methods = vec![Method::GET, Method::POST, Method::OPTIONS];

    if allowed_origins.iter().any(|origin| origin == "*") {
        warp::cors()
            .allow_any_origin()
            .allow_methods(methods)
            .allow_headers(vec!["content-type"])
    } else {
        let origins: Vec<&str> = allowed_origins.iter().map(|s| s.as_str()).collect();
        warp::cors()
            .allow_origins(origins)
            .allow_methods(methods)
            .allow_headers(vec!["content-type"])
    }
}

// ============================================================================
// REJECTION HANDLER
// ============================================================================

/// Global rejection handler for all API routes.
///
/// Request errors map to 400, oracle and chain RPC failures to 502.
///
/// # Arguments
///
/// * `rej` - The warp rejection to handle
///
/// # Returns
///
/// A warp reply with an error response
pub async fn handle_rejection(rej: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (status, message) = if let Some(DonationRejection(err)) = rej.find::<DonationRejection>() {
        if err.is_client_error() {
            (StatusCode::BAD_REQUEST, err.to_string())
        } else {
            warn!("Upstream failure: {}", err);
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
    } else if let Some(err) = rej.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", err))
    } else if let Some(err) = rej.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if rej.is_not_found() {
        (StatusCode::NOT_FOUND, "Endpoint not found".to_string())
    } else if rej.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", rej);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorResponse { error: message }),
        status,
    ))
}

// ============================================================================
// API SERVER IMPLEMENTATION
// ============================================================================

/// REST API server for the sidewalk service.
pub struct ApiServer {
    config: ServiceConfig,
    service: Arc<DonationService>,
    queue: MessageQueue,
}

impl ApiServer {
    pub fn new(config: ServiceConfig, service: Arc<DonationService>, queue: MessageQueue) -> Self {
        Self {
            config,
            service,
            queue,
        }
    }

    /// Starts the API server and serves requests until the process stops.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Server stopped
    /// * `Err(anyhow::Error)` - Invalid bind address
    pub async fn run(&self) -> Result<()> {
        let addr: std::net::SocketAddr = format!("{}:{}", self.config.api_host, self.config.api_port)
            .parse()
            .context("Failed to parse API server address")?;

        info!("Starting API server on {}", addr);
        warp::serve(self.create_routes()).run(addr).await;
        Ok(())
    }

    /// Creates all API routes for the server.
    pub(crate) fn create_routes(
        &self,
    ) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
        let service = self.service.clone();
        let with_service = warp::any().map(move || service.clone());
        let queue = self.queue.clone();
        let with_queue = warp::any().map(move || queue.clone());

        let health = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

        // GET /price?token=<t>
        let price = warp::path("price")
            .and(warp::path::end())
            .and(warp::get())
            .and(warp::query::<TokenQuery>())
            .and(with_service.clone())
            .and_then(get_price_handler);

        // GET /donate-info/:message
        let donate_info = warp::path("donate-info")
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::get())
            .and(with_service.clone())
            .and_then(donate_info_handler);

        // POST /donate/:message?token=<t>
        let donate = warp::path("donate")
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::query::<TokenQuery>())
            .and(warp::body::json::<DonateRequest>())
            .and(with_service)
            .and_then(donate_handler);

        let queue = warp::path("queue")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_queue)
            .and_then(get_queue_handler);

        health
            .or(price)
            .or(donate_info)
            .or(donate)
            .or(queue)
            .with(create_cors_filter(&self.config.cors_origins))
            .recover(handle_rejection)
    }

    /// Public method for testing - exposes routes for integration tests
    pub fn test_routes(&self) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
        self.create_routes()
    }
}
