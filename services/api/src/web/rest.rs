//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification, plus the request
//! extractors and response envelopes shared by the REST handlers.

use axum::extract::{
    rejection::{FormRejection, JsonRejection},
    FromRequest,
};
use serde::{de::DeserializeOwned, Serialize};
use utoipa::OpenApi;

use crate::error::ApiError;
use crate::web::{customers, payments, terminal, webhook};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        terminal::list_readers_handler,
        terminal::select_terminal_handler,
        terminal::selected_terminal_handler,
        terminal::clear_terminal_handler,
        terminal::retrieve_reader_handler,
        terminal::cancel_action_handler,
        terminal::terminal_payment_intent_handler,
        terminal::collect_email_handler,
        terminal::collected_data_handler,
        terminal::cancel_collect_inputs_handler,
        terminal::collect_email_selected_handler,
        terminal::collected_data_selected_handler,
        terminal::cancel_collect_inputs_selected_handler,
        customers::list_customers_handler,
        customers::customer_detail_handler,
        customers::customer_payment_intent_handler,
        customers::customer_payment_intent_with_method_handler,
        customers::customer_payment_intents_handler,
        customers::attach_default_handler,
        customers::confirm_with_default_handler,
        customers::candidates_handler,
        payments::token_handler,
        payments::connection_token_handler,
        payments::register_reader_handler,
        payments::list_locations_handler,
        payments::create_location_handler,
        payments::create_payment_intent_handler,
        payments::update_payment_intent_handler,
        payments::create_setup_intent_handler,
        payments::attach_payment_method_handler,
        payments::capture_payment_intent_handler,
        payments::cancel_payment_intent_handler,
        payments::payment_intent_handler,
        payments::assign_customer_handler,
        payments::refund_handler,
        payments::custom_checkout_handler,
        payments::payment_link_handler,
        webhook::webhook_handler,
    ),
    components(
        schemas(
            terminal::SelectTerminalRequest,
            terminal::CollectEmailRequest,
            terminal::TerminalPaymentIntentRequest,
            customers::CustomerPaymentIntentRequest,
            customers::CustomerPaymentIntentResponse,
            customers::CandidatesRequest,
            payments::PublicKeyResponse,
            payments::RegisterReaderForm,
            payments::CreateLocationForm,
            payments::CreatePaymentIntentForm,
            payments::UpdatePaymentIntentForm,
            payments::CreateSetupIntentForm,
            payments::AttachPaymentMethodForm,
            payments::PaymentIntentForm,
            payments::IntentSecretResponse,
            payments::AssignCustomerRequest,
            payments::RefundRequest,
            payments::ClientSecretResponse,
            payments::PaymentLinkRequest,
            payments::PaymentLinkResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Terminal POS API", description = "Point-of-sale endpoints backed by the payment platform.")
    )
)]
pub struct ApiDoc;

/// The served and published document, stamped with this crate's version.
pub fn api_document() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = "Terminal POS API".to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}

/// Renders the document exactly as the `openapi` binary writes it.
pub fn render_document() -> Result<String, ApiError> {
    let mut json = api_document()
        .to_pretty_json()
        .map_err(|e| ApiError::Internal(format!("Could not render the OpenAPI document: {e}")))?;
    json.push('\n');
    Ok(json)
}

/// Whether a previously written document still matches the routes.
pub fn document_is_current(existing: &str) -> Result<bool, ApiError> {
    Ok(existing.trim_end() == render_document()?.trim_end())
}

//=========================================================================================
// Shared Request Extractors and Response Envelopes
//=========================================================================================

/// `axum::Json`, but malformed bodies answer `400 {"error": ...}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::Form`, but malformed bodies answer `400 {"error": ...}`.
#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct ApiForm<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Parses an optional JSON body; an empty body yields `T::default()`.
pub fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON in request body: {e}")))
}

/// The list envelope used by every collection endpoint.
#[derive(Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// The body of every error response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
