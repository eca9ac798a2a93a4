//! services/api/src/web/webhook.rs
//!
//! The payment platform's callback endpoint. This is the only path that
//! writes a collected email onto a customer record.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::adapters::webhook::{parse_event, SIGNATURE_HEADER};
use crate::error::ApiError;
use crate::web::rest::ErrorResponse;
use crate::web::state::AppState;
use terminal_pos_core::PlatformEvent;

/// Receive a signed event from the payment platform.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body(content = String, description = "The raw event payload", content_type = "application/json"),
    params(("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Missing or invalid signature, or unreadable payload", body = ErrorResponse),
        (status = 500, description = "No endpoint secret is configured", body = ErrorResponse)
    )
)]
pub async fn webhook_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Verify the delivery
    let verifier = app_state.webhook.as_ref().ok_or_else(|| {
        ApiError::Internal("STRIPE_ENDPOINT_SECRET is not configured".to_string())
    })?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe-Signature header".to_string()))?;
    verifier.verify(&body, signature)?;

    // 2. Decode and route the event
    match parse_event(&body)? {
        PlatformEvent::ReaderActionSucceeded(reader) => {
            info!("Terminal reader action succeeded: {}", reader.id);
            match app_state.collector.record_collected_email(&reader).await {
                Ok(Some(capture)) => info!(
                    "Successfully updated customer {} with collected email",
                    capture.customer_id
                ),
                Ok(None) => {}
                Err(e) => error!("Failed to update customer with collected email: {:?}", e),
            }
        }
        PlatformEvent::PaymentMethodAttached { id } => {
            info!("PaymentMethod was attached to a Customer: {}", id);
        }
        PlatformEvent::Other { event_type } => {
            info!("Unhandled event type {}", event_type);
        }
    }

    Ok(Json(json!({ "received": true })))
}
