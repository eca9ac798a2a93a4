//! services/api/src/web/terminal.rs
//!
//! Terminal reader endpoints: session-scoped reader selection, email
//! collection on a reader, and the reader pass-throughs.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::web::rest::{optional_json, ApiJson, ErrorResponse, ListResponse};
use crate::web::state::AppState;
use terminal_pos_core::domain::{NewPaymentIntent, ReaderFilter};
use terminal_pos_core::SessionId;

//=========================================================================================
// API Request Structs
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReaderListQuery {
    pub limit: Option<u32>,
    pub device_type: Option<String>,
    pub location: Option<String>,
    pub serial_number: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SelectTerminalRequest {
    pub reader_id: Option<String>,
}

#[derive(Default, Deserialize, ToSchema)]
pub struct CollectEmailRequest {
    pub customer_id: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct TerminalPaymentIntentRequest {
    pub customer: Option<String>,
    pub amount: i64,
}

//=========================================================================================
// Reader Listing and Selection
//=========================================================================================

/// List the account's terminal readers.
#[utoipa::path(
    get,
    path = "/api/terminal/readers",
    params(ReaderListQuery),
    responses(
        (status = 200, description = "Readers known to the payment platform"),
        (status = 402, description = "The payment platform rejected the request")
    )
)]
pub async fn list_readers_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ReaderListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = ReaderFilter {
        limit: query.limit,
        device_type: query.device_type,
        location: query.location,
        serial_number: query.serial_number,
        status: query.status,
    };
    let readers = app_state.platform.list_readers(&filter).await?;
    info!("Retrieved {} terminal readers", readers.len());
    Ok(Json(ListResponse::from(readers)))
}

/// Select the reader this browser session operates.
#[utoipa::path(
    post,
    path = "/api/terminal/select",
    request_body = SelectTerminalRequest,
    responses(
        (status = 200, description = "Reader selected"),
        (status = 400, description = "reader_id is missing", body = ErrorResponse),
        (status = 402, description = "The reader could not be confirmed", body = ErrorResponse)
    )
)]
pub async fn select_terminal_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    ApiJson(req): ApiJson<SelectTerminalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reader_id = req.reader_id.unwrap_or_default();
    let selection = app_state.selector.select(&session, &reader_id).await?;
    Ok(Json(selection))
}

/// The session's selected reader, re-validated with the payment platform.
#[utoipa::path(
    get,
    path = "/api/terminal/selected",
    responses(
        (status = 200, description = "The selection, or none_selected"),
        (status = 404, description = "The selected reader no longer exists", body = ErrorResponse)
    )
)]
pub async fn selected_terminal_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    let selection = app_state.selector.selected(&session).await?;
    Ok(Json(selection))
}

/// Forget the session's selected reader. Idempotent.
#[utoipa::path(
    post,
    path = "/api/terminal/clear",
    responses((status = 200, description = "Selection cleared"))
)]
pub async fn clear_terminal_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    let selection = app_state.selector.clear(&session).await?;
    Ok(Json(selection))
}

//=========================================================================================
// Reader Pass-Throughs
//=========================================================================================

#[utoipa::path(
    get,
    path = "/api/terminal/{id}",
    params(("id" = String, Path, description = "Reader id")),
    responses((status = 200, description = "The reader"))
)]
pub async fn retrieve_reader_handler(
    State(app_state): State<Arc<AppState>>,
    Path(reader_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let reader = app_state.platform.retrieve_reader(&reader_id).await?;
    Ok(Json(reader))
}

/// Cancel whatever the reader is doing. Also served at `/api/terminal/{id}/cannel`.
#[utoipa::path(
    post,
    path = "/api/terminal/{id}/cancel",
    params(("id" = String, Path, description = "Reader id")),
    responses((status = 200, description = "The reader after cancelling"))
)]
pub async fn cancel_action_handler(
    State(app_state): State<Arc<AppState>>,
    Path(reader_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let reader = app_state.platform.cancel_reader_action(&reader_id).await?;
    info!("Reader action canceled on reader: {}", reader_id);
    Ok(Json(reader))
}

/// Create a card-present payment intent and hand it to the reader.
#[utoipa::path(
    post,
    path = "/api/terminal/{id}/payment_intent",
    params(("id" = String, Path, description = "Reader id")),
    request_body = TerminalPaymentIntentRequest,
    responses((status = 200, description = "The reader processing the payment"))
)]
pub async fn terminal_payment_intent_handler(
    State(app_state): State<Arc<AppState>>,
    Path(reader_id): Path<String>,
    ApiJson(req): ApiJson<TerminalPaymentIntentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut request = NewPaymentIntent::new(req.amount, app_state.config.currency.clone());
    request.customer = req.customer.filter(|c| !c.is_empty());
    request.payment_method_types = vec!["card_present".to_string()];
    request.setup_future_usage = Some("off_session".to_string());

    let intent = app_state.platform.create_payment_intent(&request).await?;
    let reader = app_state
        .platform
        .process_payment_intent(&reader_id, &intent.id)
        .await?;
    info!("PaymentIntent {} sent to reader {}", intent.id, reader_id);
    Ok(Json(reader))
}

//=========================================================================================
// Email Collection (explicit reader)
//=========================================================================================

/// Prompt for an email address on the reader.
#[utoipa::path(
    post,
    path = "/api/terminal/{id}/collect_email",
    params(("id" = String, Path, description = "Reader id")),
    request_body(content = CollectEmailRequest, description = "Optional customer to attach the email to"),
    responses(
        (status = 200, description = "The reader, now prompting"),
        (status = 402, description = "The reader refused the action", body = ErrorResponse)
    )
)]
pub async fn collect_email_handler(
    State(app_state): State<Arc<AppState>>,
    Path(reader_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: CollectEmailRequest = optional_json(&body)?;
    let reader = app_state
        .collector
        .start(&reader_id, req.customer_id.as_deref())
        .await?;
    Ok(Json(reader))
}

/// Poll for what the customer entered. 404 until there is a result.
#[utoipa::path(
    get,
    path = "/api/terminal/{id}/collected_data",
    params(("id" = String, Path, description = "Reader id")),
    responses(
        (status = 200, description = "The collected inputs"),
        (status = 404, description = "Nothing collected yet", body = ErrorResponse)
    )
)]
pub async fn collected_data_handler(
    State(app_state): State<Arc<AppState>>,
    Path(reader_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let collected = app_state.collector.poll(&reader_id).await?;
    info!("Retrieved collected data from reader: {}", reader_id);
    Ok(Json(collected))
}

#[utoipa::path(
    post,
    path = "/api/terminal/{id}/cancel_collect_inputs",
    params(("id" = String, Path, description = "Reader id")),
    responses((status = 200, description = "The reader after cancelling"))
)]
pub async fn cancel_collect_inputs_handler(
    State(app_state): State<Arc<AppState>>,
    Path(reader_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let reader = app_state.collector.cancel(&reader_id).await?;
    Ok(Json(reader))
}

//=========================================================================================
// Email Collection (session-selected reader)
//=========================================================================================

#[utoipa::path(
    post,
    path = "/api/terminal/collect_email",
    request_body(content = CollectEmailRequest, description = "Optional customer to attach the email to"),
    responses(
        (status = 200, description = "The selected reader, now prompting"),
        (status = 400, description = "No reader selected", body = ErrorResponse)
    )
)]
pub async fn collect_email_selected_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: CollectEmailRequest = optional_json(&body)?;
    let reader = app_state
        .collector
        .start_selected(&session, req.customer_id.as_deref())
        .await?;
    Ok(Json(reader))
}

#[utoipa::path(
    get,
    path = "/api/terminal/collected_data",
    responses(
        (status = 200, description = "The collected inputs"),
        (status = 400, description = "No reader selected", body = ErrorResponse),
        (status = 404, description = "Nothing collected yet", body = ErrorResponse)
    )
)]
pub async fn collected_data_selected_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    let collected = app_state.collector.poll_selected(&session).await?;
    Ok(Json(collected))
}

#[utoipa::path(
    post,
    path = "/api/terminal/cancel_collect_inputs",
    responses(
        (status = 200, description = "The selected reader after cancelling"),
        (status = 400, description = "No reader selected", body = ErrorResponse)
    )
)]
pub async fn cancel_collect_inputs_selected_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    let reader = app_state.collector.cancel_selected(&session).await?;
    Ok(Json(reader))
}
