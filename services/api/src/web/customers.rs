//! services/api/src/web/customers.rs
//!
//! Customer endpoints: listing and detail views, customer-bound payment
//! intents, and the card-fingerprint candidate search.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::rest::{ApiJson, ErrorResponse, ListResponse};
use crate::web::state::AppState;
use terminal_pos_core::domain::{CustomerDetail, NewPaymentIntent};
use terminal_pos_core::CandidateQuery;

const RECENT_CUSTOMERS: u32 = 5;
const RECENT_PAYMENT_INTENTS: u32 = 10;
const SAVED_CARD_AMOUNT: i64 = 1000;

//=========================================================================================
// API Request and Response Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CustomerPaymentIntentRequest {
    pub amount: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Serialize, ToSchema)]
pub struct CustomerPaymentIntentResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "clientSecret")]
    pub client_secret: Option<String>,
    pub status: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CandidatesRequest {
    pub payment_method: Option<String>,
    pub fingerprint: Option<String>,
    pub exclude_customer_id: Option<String>,
}

//=========================================================================================
// Customer Views
//=========================================================================================

/// The five most recent customers.
#[utoipa::path(
    get,
    path = "/api/customers",
    responses((status = 200, description = "Recent customers"))
)]
pub async fn list_customers_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let customers = app_state.platform.list_customers(RECENT_CUSTOMERS).await?;
    Ok(Json(ListResponse::from(customers)))
}

/// A customer with their stored cards, one per physical card.
#[utoipa::path(
    get,
    path = "/api/customers/{id}",
    params(("id" = String, Path, description = "Customer id")),
    responses((status = 200, description = "The customer and their cards"))
)]
pub async fn customer_detail_handler(
    State(app_state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = customer_detail(&app_state, &customer_id).await?;
    Ok(Json(detail))
}

async fn customer_detail(
    app_state: &AppState,
    customer_id: &str,
) -> Result<CustomerDetail, ApiError> {
    let cards = app_state.platform.list_customer_cards(customer_id).await?;
    let customer = app_state.platform.retrieve_customer(customer_id).await?;
    Ok(CustomerDetail::new(customer, cards))
}

#[utoipa::path(
    get,
    path = "/api/customers/{id}/payment_intents",
    params(("id" = String, Path, description = "Customer id")),
    responses((status = 200, description = "The customer's ten most recent payment intents"))
)]
pub async fn customer_payment_intents_handler(
    State(app_state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let intents = app_state
        .platform
        .list_payment_intents(&customer_id, RECENT_PAYMENT_INTENTS)
        .await?;
    Ok(Json(ListResponse::from(intents)))
}

//=========================================================================================
// Customer-Bound Payment Intents
//=========================================================================================

#[utoipa::path(
    post,
    path = "/api/customers/{id}/payment_intent",
    params(("id" = String, Path, description = "Customer id")),
    request_body = CustomerPaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = CustomerPaymentIntentResponse),
        (status = 402, description = "The payment platform rejected the request", body = ErrorResponse)
    )
)]
pub async fn customer_payment_intent_handler(
    State(app_state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    ApiJson(req): ApiJson<CustomerPaymentIntentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut request = NewPaymentIntent::new(req.amount, app_state.config.currency.clone());
    request.customer = Some(customer_id);
    request.metadata = req.metadata;

    let intent = app_state.platform.create_payment_intent(&request).await?;
    info!("PaymentIntent successfully created: {}", intent.id);
    Ok(Json(CustomerPaymentIntentResponse {
        id: Some(intent.id),
        client_secret: intent.client_secret,
        status: intent.status,
    }))
}

/// A fixed-amount payment intent against one of the customer's saved cards.
#[utoipa::path(
    post,
    path = "/api/customers/{id}/payment_intent/{pm}",
    params(
        ("id" = String, Path, description = "Customer id"),
        ("pm" = String, Path, description = "Payment method id")
    ),
    responses((status = 200, description = "Payment intent created", body = CustomerPaymentIntentResponse))
)]
pub async fn customer_payment_intent_with_method_handler(
    State(app_state): State<Arc<AppState>>,
    Path((customer_id, payment_method_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let mut request = NewPaymentIntent::new(SAVED_CARD_AMOUNT, app_state.config.currency.clone());
    request.customer = Some(customer_id);
    request.payment_method = Some(payment_method_id);

    let intent = app_state.platform.create_payment_intent(&request).await?;
    Ok(Json(CustomerPaymentIntentResponse {
        id: None,
        client_secret: intent.client_secret,
        status: intent.status,
    }))
}

/// Make a stored card the customer's default payment method.
#[utoipa::path(
    post,
    path = "/api/customers/{id}/attach_default/{pm_id}",
    params(
        ("id" = String, Path, description = "Customer id"),
        ("pm_id" = String, Path, description = "Payment method id")
    ),
    responses((status = 200, description = "The updated customer and their cards"))
)]
pub async fn attach_default_handler(
    State(app_state): State<Arc<AppState>>,
    Path((customer_id, payment_method_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .platform
        .set_default_payment_method(&customer_id, &payment_method_id)
        .await?;
    info!(
        "Default payment method of {} set to {}",
        customer_id, payment_method_id
    );
    let detail = customer_detail(&app_state, &customer_id).await?;
    Ok(Json(detail))
}

/// Confirm a payment intent with the customer's default payment method.
#[utoipa::path(
    post,
    path = "/api/customers/{id}/payment_intents/{pi_id}/confirm",
    params(
        ("id" = String, Path, description = "Customer id"),
        ("pi_id" = String, Path, description = "Payment intent id")
    ),
    responses(
        (status = 200, description = "The confirmed payment intent"),
        (status = 400, description = "The customer has no default payment method", body = ErrorResponse)
    )
)]
pub async fn confirm_with_default_handler(
    State(app_state): State<Arc<AppState>>,
    Path((customer_id, payment_intent_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let customer = app_state.platform.retrieve_customer(&customer_id).await?;
    let payment_method = customer.default_payment_method.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Customer {} has no default payment method",
            customer_id
        ))
    })?;

    let intent = app_state
        .platform
        .confirm_payment_intent(
            &payment_intent_id,
            &payment_method,
            &app_state.config.checkout_return_url,
        )
        .await?;
    info!("PaymentIntent {} confirmed with {}", intent.id, payment_method);
    Ok(Json(intent))
}

//=========================================================================================
// Candidate Search
//=========================================================================================

/// Customers who have used the same physical card.
///
/// Give either a card `fingerprint` or a `payment_method` id to read it from;
/// the fingerprint wins when both are present.
#[utoipa::path(
    post,
    path = "/api/customers/candidates_by_payment_method",
    request_body = CandidatesRequest,
    responses(
        (status = 200, description = "The fingerprint and the matching customers"),
        (status = 400, description = "Neither a fingerprint nor a usable payment method", body = ErrorResponse)
    )
)]
pub async fn candidates_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CandidatesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let query = CandidateQuery {
        fingerprint: req.fingerprint,
        payment_method: req.payment_method,
        exclude_customer_id: req.exclude_customer_id,
    };
    let report = app_state.candidates.search(&query).await?;
    Ok(Json(report))
}
