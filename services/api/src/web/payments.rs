//! services/api/src/web/payments.rs
//!
//! Payment pass-throughs: the form-encoded Terminal SDK backend endpoints
//! (`/token`, `/connection_token`, reader registration, locations, setup and
//! payment intents) and the JSON payment intent, refund, checkout and payment
//! link endpoints.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::rest::{ApiForm, ApiJson, ErrorResponse};
use crate::web::state::AppState;
use terminal_pos_core::domain::{
    Address, CaptureMethod, NewLocation, NewPaymentIntent, NewPaymentLink, NewReader,
    NewSetupIntent, PaymentIntent, PaymentIntentUpdate, SetupIntent,
};

const DEFAULT_DESCRIPTION: &str = "Example PaymentIntent";
const DEFAULT_PAYMENT_METHOD_TYPE: &str = "card_present";
const LOCATION_LIST_LIMIT: u32 = 100;

//=========================================================================================
// API Request and Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct PublicKeyResponse {
    pub public_key: Option<String>,
}

/// Array and nested fields use bracketed keys, as the Terminal SDKs send them:
/// `payment_method_types[]=interac_present` or
/// `payment_method_options[card_present][request_extended_authorization]=true`.
#[derive(Debug, Default, ToSchema)]
pub struct CreatePaymentIntentForm {
    pub amount: i64,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub receipt_email: Option<String>,
    /// `automatic`, `automatic_async` or `manual` (the default).
    pub capture_method: Option<String>,
    /// Defaults to `card_present`.
    pub payment_method_types: Vec<String>,
    pub payment_method_options: BTreeMap<String, String>,
}

impl CreatePaymentIntentForm {
    fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, ApiError> {
        let mut form = Self::default();
        let mut amount = None;
        for (key, value) in pairs {
            match key.as_str() {
                "amount" => amount = Some(value),
                "currency" => form.currency = Some(value),
                "description" => form.description = Some(value),
                "receipt_email" => form.receipt_email = Some(value),
                "capture_method" => form.capture_method = Some(value),
                _ if is_array_key(&key, "payment_method_types") => {
                    form.payment_method_types.push(value)
                }
                _ => {
                    if let Some(path) = key.strip_prefix("payment_method_options") {
                        if path.starts_with('[') && path.ends_with(']') {
                            form.payment_method_options.insert(path.to_string(), value);
                        }
                    }
                }
            }
        }
        let amount = amount
            .ok_or_else(|| ApiError::BadRequest("'amount' is a required parameter".to_string()))?;
        form.amount = amount.trim().parse().map_err(|_| {
            ApiError::BadRequest(format!("'amount' must be an integer, got '{amount}'"))
        })?;
        Ok(form)
    }

    fn capture_method(&self) -> Result<CaptureMethod, ApiError> {
        match self.capture_method.as_deref().filter(|m| !m.is_empty()) {
            Some(method) => method.parse().map_err(ApiError::BadRequest),
            None => Ok(CaptureMethod::Manual),
        }
    }
}

/// Matches `name`, `name[]` and `name[N]`.
fn is_array_key(key: &str, name: &str) -> bool {
    match key.strip_prefix(name) {
        Some("") | Some("[]") => true,
        Some(index) => index
            .strip_prefix('[')
            .and_then(|i| i.strip_suffix(']'))
            .is_some_and(|i| i.parse::<usize>().is_ok()),
        None => false,
    }
}

/// The listed payment method types, or `card_present` when none were sent.
fn payment_method_types(types: Vec<String>) -> Vec<String> {
    let types: Vec<String> = types.into_iter().filter(|t| !t.is_empty()).collect();
    if types.is_empty() {
        vec![DEFAULT_PAYMENT_METHOD_TYPE.to_string()]
    } else {
        types
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterReaderForm {
    pub registration_code: String,
    pub label: Option<String>,
    pub location: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateLocationForm {
    pub display_name: String,
    #[serde(rename = "address[line1]")]
    pub line1: Option<String>,
    #[serde(rename = "address[line2]")]
    pub line2: Option<String>,
    #[serde(rename = "address[city]")]
    pub city: Option<String>,
    #[serde(rename = "address[state]")]
    pub state: Option<String>,
    #[serde(rename = "address[postal_code]")]
    pub postal_code: Option<String>,
    #[serde(rename = "address[country]")]
    pub country: Option<String>,
}

impl From<CreateLocationForm> for NewLocation {
    fn from(form: CreateLocationForm) -> Self {
        NewLocation {
            display_name: form.display_name,
            address: Address {
                line1: non_empty(form.line1),
                line2: non_empty(form.line2),
                city: non_empty(form.city),
                state: non_empty(form.state),
                postal_code: non_empty(form.postal_code),
                country: non_empty(form.country),
            },
        }
    }
}

/// `payment_method_types[]` may repeat; defaults to `card_present`.
#[derive(Debug, Default, ToSchema)]
pub struct CreateSetupIntentForm {
    pub payment_method_types: Vec<String>,
    pub customer: Option<String>,
    pub description: Option<String>,
    pub on_behalf_of: Option<String>,
}

impl CreateSetupIntentForm {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "customer" => form.customer = Some(value),
                "description" => form.description = Some(value),
                "on_behalf_of" => form.on_behalf_of = Some(value),
                _ if is_array_key(&key, "payment_method_types") => {
                    form.payment_method_types.push(value)
                }
                _ => {}
            }
        }
        form
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AttachPaymentMethodForm {
    pub payment_method_id: String,
}

/// Only `receipt_email` may be changed.
#[derive(Deserialize, ToSchema)]
pub struct UpdatePaymentIntentForm {
    pub payment_intent_id: Option<String>,
    pub receipt_email: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct PaymentIntentForm {
    pub payment_intent_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct IntentSecretResponse {
    pub intent: String,
    pub secret: Option<String>,
}

impl From<PaymentIntent> for IntentSecretResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            intent: intent.id,
            secret: intent.client_secret,
        }
    }
}

impl From<SetupIntent> for IntentSecretResponse {
    fn from(intent: SetupIntent) -> Self {
        Self {
            intent: intent.id,
            secret: intent.client_secret,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AssignCustomerRequest {
    pub payment_intent: String,
    pub customer: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefundRequest {
    pub payment_intent: String,
    pub amount: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct ClientSecretResponse {
    #[serde(rename = "clientSecret")]
    pub client_secret: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct PaymentLinkRequest {
    pub amount: i64,
    pub product_name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentLinkResponse {
    pub url: String,
}

//=========================================================================================
// Terminal SDK Backend
//=========================================================================================

/// The publishable key, for initialising client SDKs.
#[utoipa::path(
    get,
    path = "/token",
    responses((status = 200, description = "The publishable key", body = PublicKeyResponse))
)]
pub async fn token_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(PublicKeyResponse {
        public_key: app_state.config.stripe_publishable_key.clone(),
    })
}

#[utoipa::path(
    post,
    path = "/connection_token",
    responses(
        (status = 200, description = "A connection token for the Terminal SDK"),
        (status = 402, description = "The payment platform rejected the request", body = ErrorResponse)
    )
)]
pub async fn connection_token_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let token = app_state.platform.create_connection_token().await?;
    Ok(Json(token))
}

/// Registers a reader with the code shown on its screen.
#[utoipa::path(
    post,
    path = "/register_reader",
    request_body(content = RegisterReaderForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "The registered reader"),
        (status = 402, description = "The payment platform rejected the request", body = ErrorResponse)
    )
)]
pub async fn register_reader_handler(
    State(app_state): State<Arc<AppState>>,
    ApiForm(form): ApiForm<RegisterReaderForm>,
) -> Result<impl IntoResponse, ApiError> {
    let request = NewReader {
        registration_code: form.registration_code,
        label: non_empty(form.label),
        location: non_empty(form.location),
    };
    let reader = app_state.platform.register_reader(&request).await?;
    info!("Reader registered: {}", reader.id);
    Ok(Json(reader))
}

/// The first hundred locations, as a bare array.
#[utoipa::path(
    get,
    path = "/list_locations",
    responses(
        (status = 200, description = "The account's locations"),
        (status = 402, description = "The payment platform rejected the request", body = ErrorResponse)
    )
)]
pub async fn list_locations_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let locations = app_state
        .platform
        .list_locations(LOCATION_LIST_LIMIT)
        .await?;
    info!("{} Locations successfully fetched", locations.len());
    Ok(Json(locations))
}

#[utoipa::path(
    post,
    path = "/create_location",
    request_body(content = CreateLocationForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "The created location"),
        (status = 400, description = "Missing display name", body = ErrorResponse)
    )
)]
pub async fn create_location_handler(
    State(app_state): State<Arc<AppState>>,
    ApiForm(form): ApiForm<CreateLocationForm>,
) -> Result<impl IntoResponse, ApiError> {
    if form.display_name.trim().is_empty() {
        return Err(ApiError::BadRequest("display_name is required".to_string()));
    }
    let location = app_state
        .platform
        .create_location(&NewLocation::from(form))
        .await?;
    info!("Location successfully created: {}", location.id);
    Ok(Json(location))
}

/// A payment intent for the Terminal SDK; card-present and manually captured
/// unless the form says otherwise.
#[utoipa::path(
    post,
    path = "/create_payment_intent",
    request_body(content = CreatePaymentIntentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Payment intent created", body = IntentSecretResponse),
        (status = 400, description = "Missing amount or unknown capture method", body = ErrorResponse),
        (status = 402, description = "The payment platform rejected the request", body = ErrorResponse)
    )
)]
pub async fn create_payment_intent_handler(
    State(app_state): State<Arc<AppState>>,
    ApiForm(pairs): ApiForm<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let form = CreatePaymentIntentForm::from_pairs(pairs)?;
    let capture_method = form.capture_method()?;
    let currency =
        non_empty(form.currency).unwrap_or_else(|| app_state.config.currency.clone());
    let mut request = NewPaymentIntent::new(form.amount, currency);
    request.payment_method_types = payment_method_types(form.payment_method_types);
    request.capture_method = capture_method;
    request.payment_method_options = form.payment_method_options;
    request.description = Some(
        form.description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
    );
    request.receipt_email = non_empty(form.receipt_email);

    let intent = app_state.platform.create_payment_intent(&request).await?;
    info!("PaymentIntent successfully created: {}", intent.id);
    Ok(Json(IntentSecretResponse::from(intent)))
}

#[utoipa::path(
    post,
    path = "/capture_payment_intent",
    request_body(content = PaymentIntentForm, content_type = "application/x-www-form-urlencoded"),
    responses((status = 200, description = "Payment intent captured", body = IntentSecretResponse))
)]
pub async fn capture_payment_intent_handler(
    State(app_state): State<Arc<AppState>>,
    ApiForm(form): ApiForm<PaymentIntentForm>,
) -> Result<impl IntoResponse, ApiError> {
    let intent = app_state
        .platform
        .capture_payment_intent(&form.payment_intent_id)
        .await?;
    info!("PaymentIntent successfully captured: {}", intent.id);
    Ok(Json(IntentSecretResponse::from(intent)))
}

#[utoipa::path(
    post,
    path = "/cancel_payment_intent",
    request_body(content = PaymentIntentForm, content_type = "application/x-www-form-urlencoded"),
    responses((status = 200, description = "Payment intent canceled", body = IntentSecretResponse))
)]
pub async fn cancel_payment_intent_handler(
    State(app_state): State<Arc<AppState>>,
    ApiForm(form): ApiForm<PaymentIntentForm>,
) -> Result<impl IntoResponse, ApiError> {
    let intent = app_state
        .platform
        .cancel_payment_intent(&form.payment_intent_id)
        .await?;
    info!("PaymentIntent successfully canceled: {}", intent.id);
    Ok(Json(IntentSecretResponse::from(intent)))
}

/// Only `receipt_email` is forwarded; other fields are ignored.
#[utoipa::path(
    post,
    path = "/update_payment_intent",
    request_body(content = UpdatePaymentIntentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Payment intent updated", body = IntentSecretResponse),
        (status = 400, description = "Missing payment_intent_id", body = ErrorResponse)
    )
)]
pub async fn update_payment_intent_handler(
    State(app_state): State<Arc<AppState>>,
    ApiForm(form): ApiForm<UpdatePaymentIntentForm>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_intent_id = non_empty(form.payment_intent_id).ok_or_else(|| {
        ApiError::BadRequest("'payment_intent_id' is a required parameter".to_string())
    })?;
    let update = PaymentIntentUpdate {
        receipt_email: form.receipt_email,
    };
    let intent = app_state
        .platform
        .update_payment_intent(&payment_intent_id, &update)
        .await?;
    info!("Updated PaymentIntent {}", intent.id);
    Ok(Json(IntentSecretResponse::from(intent)))
}

/// Saves a card-present payment method for later, without charging it.
#[utoipa::path(
    post,
    path = "/create_setup_intent",
    request_body(content = CreateSetupIntentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Setup intent created", body = IntentSecretResponse),
        (status = 402, description = "The payment platform rejected the request", body = ErrorResponse)
    )
)]
pub async fn create_setup_intent_handler(
    State(app_state): State<Arc<AppState>>,
    ApiForm(pairs): ApiForm<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let form = CreateSetupIntentForm::from_pairs(pairs);
    let request = NewSetupIntent {
        payment_method_types: payment_method_types(form.payment_method_types),
        customer: non_empty(form.customer),
        description: non_empty(form.description),
        on_behalf_of: non_empty(form.on_behalf_of),
    };
    let intent = app_state.platform.create_setup_intent(&request).await?;
    info!("SetupIntent successfully created: {}", intent.id);
    Ok(Json(IntentSecretResponse::from(intent)))
}

/// Attaches a payment method to the shared example customer, creating that
/// customer on first use.
#[utoipa::path(
    post,
    path = "/attach_payment_method_to_customer",
    request_body(content = AttachPaymentMethodForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "The attached payment method"),
        (status = 402, description = "The payment platform rejected the request", body = ErrorResponse)
    )
)]
pub async fn attach_payment_method_handler(
    State(app_state): State<Arc<AppState>>,
    ApiForm(form): ApiForm<AttachPaymentMethodForm>,
) -> Result<impl IntoResponse, ApiError> {
    let email = &app_state.config.sdk_customer_email;
    let customer = match app_state.platform.find_customer_by_email(email).await? {
        Some(customer) => customer,
        None => app_state.platform.create_customer(email).await?,
    };
    let payment_method = app_state
        .platform
        .attach_payment_method(&form.payment_method_id, &customer.id)
        .await?;
    info!("Attached PaymentMethod to Customer: {}", customer.id);
    Ok(Json(payment_method))
}

//=========================================================================================
// Payment Intents and Refunds
//=========================================================================================

/// A payment intent with its payment method and latest charge expanded.
#[utoipa::path(
    get,
    path = "/api/payment_intents/{id}",
    params(("id" = String, Path, description = "Payment intent id")),
    responses((status = 200, description = "The payment intent"))
)]
pub async fn payment_intent_handler(
    State(app_state): State<Arc<AppState>>,
    Path(payment_intent_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let intent = app_state
        .platform
        .retrieve_payment_intent(&payment_intent_id)
        .await?;
    Ok(Json(intent))
}

/// Attach a payment intent to a customer, e.g. one found by the candidate search.
#[utoipa::path(
    post,
    path = "/api/payment_intents/assign_customer",
    request_body = AssignCustomerRequest,
    responses((status = 200, description = "The updated payment intent"))
)]
pub async fn assign_customer_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<AssignCustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.payment_intent.is_empty() || req.customer.is_empty() {
        return Err(ApiError::BadRequest(
            "payment_intent and customer are required".to_string(),
        ));
    }
    let intent = app_state
        .platform
        .assign_payment_intent_customer(&req.payment_intent, &req.customer)
        .await?;
    info!("PaymentIntent {} assigned to {}", intent.id, req.customer);
    Ok(Json(intent))
}

/// Refund a payment intent in full, or partially when `amount` is given.
#[utoipa::path(
    post,
    path = "/api/refunds",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "The refund"),
        (status = 402, description = "The payment platform rejected the refund", body = ErrorResponse)
    )
)]
pub async fn refund_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(amount) = req.amount.filter(|a| *a <= 0) {
        return Err(ApiError::BadRequest(format!(
            "Refund amount must be positive, got {}",
            amount
        )));
    }
    let refund = app_state
        .platform
        .create_refund(&req.payment_intent, req.amount)
        .await?;
    info!(
        "Refund {} created for {} ({} {})",
        refund.id, req.payment_intent, refund.amount, refund.currency
    );
    Ok(Json(refund))
}

//=========================================================================================
// Checkout and Payment Links
//=========================================================================================

#[utoipa::path(
    post,
    path = "/api/custom_checkout",
    responses(
        (status = 200, description = "Checkout session created", body = ClientSecretResponse),
        (status = 500, description = "No checkout price is configured", body = ErrorResponse)
    )
)]
pub async fn custom_checkout_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let price_id = app_state
        .config
        .checkout_price_id
        .as_deref()
        .ok_or_else(|| ApiError::Internal("CHECKOUT_PRICE_ID is not configured".to_string()))?;
    let session = app_state
        .platform
        .create_checkout_session(price_id, &app_state.config.checkout_return_url)
        .await?;
    Ok(Json(ClientSecretResponse {
        client_secret: session.client_secret,
    }))
}

/// A one-item payment link for an ad-hoc product.
#[utoipa::path(
    post,
    path = "/api/payment_link",
    request_body = PaymentLinkRequest,
    responses(
        (status = 200, description = "Payment link created", body = PaymentLinkResponse),
        (status = 400, description = "Missing product name or amount", body = ErrorResponse)
    )
)]
pub async fn payment_link_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<PaymentLinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.product_name.trim().is_empty() {
        return Err(ApiError::BadRequest("product_name is required".to_string()));
    }
    let request = NewPaymentLink {
        amount: req.amount,
        currency: app_state.config.currency.clone(),
        product_name: req.product_name,
        metadata: req.metadata,
    };
    let link = app_state.platform.create_payment_link(&request).await?;
    info!("Payment link {} created", link.id);
    Ok(Json(PaymentLinkResponse { url: link.url }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn array_keys_accept_all_three_spellings() {
        assert!(is_array_key("payment_method_types", "payment_method_types"));
        assert!(is_array_key("payment_method_types[]", "payment_method_types"));
        assert!(is_array_key("payment_method_types[1]", "payment_method_types"));
        assert!(!is_array_key("payment_method_types[x]", "payment_method_types"));
        assert!(!is_array_key("payment_method_typesx", "payment_method_types"));
    }

    #[test]
    fn payment_intent_form_collects_overrides() {
        let form = CreatePaymentIntentForm::from_pairs(pairs(&[
            ("amount", "1500"),
            ("payment_method_types[]", "card_present"),
            ("payment_method_types[]", "interac_present"),
            ("capture_method", "automatic"),
            ("payment_method_options[card_present][request_extended_authorization]", "true"),
            ("payment_method_options", "ignored"),
        ]))
        .unwrap();

        assert_eq!(form.amount, 1500);
        assert_eq!(form.payment_method_types, vec!["card_present", "interac_present"]);
        assert_eq!(form.capture_method().unwrap(), CaptureMethod::Automatic);
        assert_eq!(
            form.payment_method_options,
            BTreeMap::from([(
                "[card_present][request_extended_authorization]".to_string(),
                "true".to_string()
            )])
        );
    }

    #[test]
    fn payment_intent_form_defaults_to_manual_capture() {
        let form = CreatePaymentIntentForm::from_pairs(pairs(&[("amount", "100")])).unwrap();
        assert_eq!(form.capture_method().unwrap(), CaptureMethod::Manual);
        assert_eq!(payment_method_types(form.payment_method_types), vec!["card_present"]);
    }

    #[test]
    fn payment_intent_form_rejects_bad_amounts_and_capture_methods() {
        assert!(CreatePaymentIntentForm::from_pairs(pairs(&[("currency", "usd")])).is_err());
        assert!(CreatePaymentIntentForm::from_pairs(pairs(&[("amount", "ten")])).is_err());

        let form = CreatePaymentIntentForm::from_pairs(pairs(&[
            ("amount", "100"),
            ("capture_method", "later"),
        ]))
        .unwrap();
        assert!(matches!(form.capture_method(), Err(ApiError::BadRequest(_))));
    }
}
