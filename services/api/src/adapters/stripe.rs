//! services/api/src/adapters/stripe.rs
//!
//! The `PaymentPlatform` adapter for Stripe's REST API. Requests are
//! form-encoded (`application/x-www-form-urlencoded`) with bracketed keys for
//! nested parameters, authenticated with the secret key as a bearer token.
//! Every port call is exactly one outbound request except `create_payment_link`,
//! which creates the product first.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

use super::stripe_types::{
    ErrorEnvelope, List, WireCharge, WireCheckoutSession, WireConnectionToken, WireCustomer,
    WireLocation, WirePaymentIntent, WirePaymentLink, WirePaymentMethod, WireProduct, WireReader,
    WireRefund, WireSetupIntent,
};
use terminal_pos_core::domain::{
    Address, Charge, CheckoutSession, CollectInputsRequest, ConnectionToken, Customer, Location,
    NewLocation, NewPaymentIntent, NewPaymentLink, NewReader, NewSetupIntent, PaymentIntent,
    PaymentIntentUpdate, PaymentLink, PaymentMethod, Reader, ReaderFilter, Refund, SetupIntent,
};
use terminal_pos_core::ports::{PaymentPlatform, PortError, PortResult};

/// Ordered form parameters; Stripe reads `a[0][b]`-style keys positionally.
#[derive(Debug, Default)]
struct Params(Vec<(String, String)>);

impl Params {
    fn new() -> Self {
        Self::default()
    }

    fn set(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    fn set_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    fn metadata(self, prefix: &str, metadata: &HashMap<String, String>) -> Self {
        let mut entries: Vec<_> = metadata.iter().collect();
        entries.sort();
        entries.into_iter().fold(self, |params, (k, v)| {
            params.set(format!("{prefix}[{k}]"), v)
        })
    }

    fn address(self, address: &Address) -> Self {
        self.set_opt("address[line1]", address.line1.as_deref())
            .set_opt("address[line2]", address.line2.as_deref())
            .set_opt("address[city]", address.city.as_deref())
            .set_opt("address[state]", address.state.as_deref())
            .set_opt("address[postal_code]", address.postal_code.as_deref())
            .set_opt("address[country]", address.country.as_deref())
    }

    /// Asks Stripe to inline the payment method and latest charge.
    fn expand_intent(self, prefix: &str) -> Self {
        self.set("expand[]", format!("{prefix}latest_charge"))
            .set("expand[]", format!("{prefix}payment_method"))
    }
}

pub struct StripeAdapter {
    client: Client,
    base_url: String,
    secret_key: SecretString,
}

impl StripeAdapter {
    pub fn new(base_url: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: Params) -> PortResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .query(&query.0)
            .send()
            .await
            .map_err(transport_error)?;
        read(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, form: Params) -> PortResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form.0)
            .send()
            .await
            .map_err(transport_error)?;
        read(response).await
    }

    async fn post_intent(&self, path: &str, form: Params) -> PortResult<PaymentIntent> {
        let intent: WirePaymentIntent = self.post(path, form.expand_intent("")).await?;
        Ok(intent.into())
    }

    async fn reader_action(
        &self,
        reader_id: &str,
        action: &str,
        form: Params,
    ) -> PortResult<Reader> {
        let reader: WireReader = self
            .post(&format!("/terminal/readers/{reader_id}/{action}"), form)
            .await?;
        Ok(reader.into_domain())
    }
}

fn transport_error(e: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("Request to the payment platform failed: {e}"))
}

/// Decodes a success body, or turns Stripe's `{"error": {...}}` into a `PortError`.
async fn read<T: DeserializeOwned>(response: Response) -> PortResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Unreadable platform response: {e}")));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| match (envelope.error.message, envelope.error.code) {
            (Some(message), _) => Some(message),
            (None, code) => code,
        })
        .unwrap_or_else(|| format!("Payment platform returned {status}"));

    if status == StatusCode::NOT_FOUND {
        Err(PortError::NotFound(message))
    } else {
        Err(PortError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentPlatform for StripeAdapter {
    async fn list_readers(&self, filter: &ReaderFilter) -> PortResult<Vec<Reader>> {
        let query = Params::new()
            .set("limit", filter.limit.unwrap_or(100))
            .set_opt("device_type", filter.device_type.as_deref())
            .set_opt("location", filter.location.as_deref())
            .set_opt("serial_number", filter.serial_number.as_deref())
            .set_opt("status", filter.status.as_deref());
        let list: List<WireReader> = self.get("/terminal/readers", query).await?;
        Ok(list.data.into_iter().map(WireReader::into_domain).collect())
    }

    async fn retrieve_reader(&self, reader_id: &str) -> PortResult<Reader> {
        let reader: WireReader = self
            .get(&format!("/terminal/readers/{reader_id}"), Params::new())
            .await?;
        Ok(reader.into_domain())
    }

    async fn collect_inputs(
        &self,
        reader_id: &str,
        request: &CollectInputsRequest,
    ) -> PortResult<Reader> {
        let prompt = &request.prompt;
        let form = Params::new()
            .set("inputs[0][type]", &request.input_type)
            .set("inputs[0][required]", request.required)
            .set("inputs[0][custom_text][title]", &prompt.title)
            .set("inputs[0][custom_text][description]", &prompt.description)
            .set("inputs[0][custom_text][submit_button]", &prompt.submit_button)
            .set("inputs[0][custom_text][skip_button]", &prompt.skip_button)
            .metadata("metadata", &request.metadata);
        self.reader_action(reader_id, "collect_inputs", form).await
    }

    async fn cancel_reader_action(&self, reader_id: &str) -> PortResult<Reader> {
        self.reader_action(reader_id, "cancel_action", Params::new())
            .await
    }

    async fn process_payment_intent(
        &self,
        reader_id: &str,
        payment_intent_id: &str,
    ) -> PortResult<Reader> {
        let form = Params::new()
            .set("payment_intent", payment_intent_id)
            .set("process_config[allow_redisplay]", "always");
        self.reader_action(reader_id, "process_payment_intent", form)
            .await
    }

    async fn register_reader(&self, request: &NewReader) -> PortResult<Reader> {
        let form = Params::new()
            .set("registration_code", &request.registration_code)
            .set_opt("label", request.label.as_deref())
            .set_opt("location", request.location.as_deref());
        let reader: WireReader = self.post("/terminal/readers", form).await?;
        Ok(reader.into_domain())
    }

    async fn create_connection_token(&self) -> PortResult<ConnectionToken> {
        let token: WireConnectionToken = self
            .post("/terminal/connection_tokens", Params::new())
            .await?;
        Ok(token.into())
    }

    async fn list_locations(&self, limit: u32) -> PortResult<Vec<Location>> {
        let list: List<WireLocation> = self
            .get("/terminal/locations", Params::new().set("limit", limit))
            .await?;
        Ok(list.data.into_iter().map(Location::from).collect())
    }

    async fn create_location(&self, request: &NewLocation) -> PortResult<Location> {
        let form = Params::new()
            .set("display_name", &request.display_name)
            .address(&request.address);
        let location: WireLocation = self.post("/terminal/locations", form).await?;
        Ok(location.into())
    }

    async fn list_customers(&self, limit: u32) -> PortResult<Vec<Customer>> {
        let list: List<WireCustomer> = self
            .get("/customers", Params::new().set("limit", limit))
            .await?;
        Ok(list.data.into_iter().map(Customer::from).collect())
    }

    async fn retrieve_customer(&self, customer_id: &str) -> PortResult<Customer> {
        let customer: WireCustomer = self
            .get(&format!("/customers/{customer_id}"), Params::new())
            .await?;
        Ok(customer.into())
    }

    async fn find_customer_by_email(&self, email: &str) -> PortResult<Option<Customer>> {
        let query = Params::new().set("email", email).set("limit", 1);
        let list: List<WireCustomer> = self.get("/customers", query).await?;
        Ok(list.data.into_iter().next().map(Customer::from))
    }

    async fn create_customer(&self, email: &str) -> PortResult<Customer> {
        let customer: WireCustomer = self
            .post("/customers", Params::new().set("email", email))
            .await?;
        Ok(customer.into())
    }

    async fn update_customer_email(&self, customer_id: &str, email: &str) -> PortResult<Customer> {
        let customer: WireCustomer = self
            .post(
                &format!("/customers/{customer_id}"),
                Params::new().set("email", email),
            )
            .await?;
        Ok(customer.into())
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> PortResult<Customer> {
        let form =
            Params::new().set("invoice_settings[default_payment_method]", payment_method_id);
        let customer: WireCustomer = self
            .post(&format!("/customers/{customer_id}"), form)
            .await?;
        Ok(customer.into())
    }

    async fn list_customer_cards(&self, customer_id: &str) -> PortResult<Vec<PaymentMethod>> {
        let list: List<WirePaymentMethod> = self
            .get(
                &format!("/customers/{customer_id}/payment_methods"),
                Params::new().set("type", "card").set("limit", 100),
            )
            .await?;
        Ok(list.data.into_iter().map(PaymentMethod::from).collect())
    }

    async fn retrieve_payment_method(&self, payment_method_id: &str) -> PortResult<PaymentMethod> {
        let pm: WirePaymentMethod = self
            .get(&format!("/payment_methods/{payment_method_id}"), Params::new())
            .await?;
        Ok(pm.into())
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> PortResult<PaymentMethod> {
        let form = Params::new()
            .set("customer", customer_id)
            .set("expand[]", "customer");
        let pm: WirePaymentMethod = self
            .post(&format!("/payment_methods/{payment_method_id}/attach"), form)
            .await?;
        Ok(pm.into())
    }

    async fn search_charges_by_fingerprint(&self, fingerprint: &str) -> PortResult<Vec<Charge>> {
        let query = Params::new()
            .set(
                "query",
                format!("payment_method_details.card.fingerprint:'{fingerprint}'"),
            )
            .set("limit", 100);
        let list: List<WireCharge> = self.get("/charges/search", query).await?;
        Ok(list.data.into_iter().map(Charge::from).collect())
    }

    async fn list_recent_charges(&self, limit: u32) -> PortResult<Vec<Charge>> {
        let list: List<WireCharge> = self
            .get("/charges", Params::new().set("limit", limit))
            .await?;
        Ok(list.data.into_iter().map(Charge::from).collect())
    }

    async fn create_payment_intent(&self, request: &NewPaymentIntent) -> PortResult<PaymentIntent> {
        let form = request
            .payment_method_types
            .iter()
            .fold(Params::new(), |params, t| params.set("payment_method_types[]", t))
            .set("amount", request.amount)
            .set("currency", &request.currency)
            .set("capture_method", request.capture_method.as_str())
            .set_opt("customer", request.customer.as_deref())
            .set_opt("payment_method", request.payment_method.as_deref())
            .set_opt("description", request.description.as_deref())
            .set_opt("receipt_email", request.receipt_email.as_deref())
            .set_opt("setup_future_usage", request.setup_future_usage.as_deref())
            .metadata("metadata", &request.metadata);
        let form = request
            .payment_method_options
            .iter()
            .fold(form, |params, (path, value)| {
                params.set(format!("payment_method_options{path}"), value)
            });
        self.post_intent("/payment_intents", form).await
    }

    async fn retrieve_payment_intent(&self, payment_intent_id: &str) -> PortResult<PaymentIntent> {
        let intent: WirePaymentIntent = self
            .get(
                &format!("/payment_intents/{payment_intent_id}"),
                Params::new().expand_intent(""),
            )
            .await?;
        Ok(intent.into())
    }

    async fn list_payment_intents(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> PortResult<Vec<PaymentIntent>> {
        let query = Params::new()
            .set("customer", customer_id)
            .set("limit", limit)
            .expand_intent("data.");
        let list: List<WirePaymentIntent> = self.get("/payment_intents", query).await?;
        Ok(list.data.into_iter().map(PaymentIntent::from).collect())
    }

    async fn confirm_payment_intent(
        &self,
        payment_intent_id: &str,
        payment_method_id: &str,
        return_url: &str,
    ) -> PortResult<PaymentIntent> {
        let form = Params::new()
            .set("payment_method", payment_method_id)
            .set("return_url", return_url);
        self.post_intent(&format!("/payment_intents/{payment_intent_id}/confirm"), form)
            .await
    }

    async fn capture_payment_intent(&self, payment_intent_id: &str) -> PortResult<PaymentIntent> {
        self.post_intent(
            &format!("/payment_intents/{payment_intent_id}/capture"),
            Params::new(),
        )
        .await
    }

    async fn cancel_payment_intent(&self, payment_intent_id: &str) -> PortResult<PaymentIntent> {
        self.post_intent(
            &format!("/payment_intents/{payment_intent_id}/cancel"),
            Params::new(),
        )
        .await
    }

    async fn assign_payment_intent_customer(
        &self,
        payment_intent_id: &str,
        customer_id: &str,
    ) -> PortResult<PaymentIntent> {
        self.post_intent(
            &format!("/payment_intents/{payment_intent_id}"),
            Params::new().set("customer", customer_id),
        )
        .await
    }

    async fn update_payment_intent(
        &self,
        payment_intent_id: &str,
        update: &PaymentIntentUpdate,
    ) -> PortResult<PaymentIntent> {
        self.post_intent(
            &format!("/payment_intents/{payment_intent_id}"),
            Params::new().set_opt("receipt_email", update.receipt_email.as_deref()),
        )
        .await
    }

    async fn create_setup_intent(&self, request: &NewSetupIntent) -> PortResult<SetupIntent> {
        let form = request
            .payment_method_types
            .iter()
            .fold(Params::new(), |params, t| params.set("payment_method_types[]", t))
            .set_opt("customer", request.customer.as_deref())
            .set_opt("description", request.description.as_deref())
            .set_opt("on_behalf_of", request.on_behalf_of.as_deref());
        let intent: WireSetupIntent = self.post("/setup_intents", form).await?;
        Ok(intent.into())
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: Option<i64>,
    ) -> PortResult<Refund> {
        let form = Params::new()
            .set("payment_intent", payment_intent_id)
            .set_opt("amount", amount);
        let refund: WireRefund = self.post("/refunds", form).await?;
        Ok(refund.into())
    }

    async fn create_checkout_session(
        &self,
        price_id: &str,
        return_url: &str,
    ) -> PortResult<CheckoutSession> {
        let form = Params::new()
            .set("line_items[0][price]", price_id)
            .set("line_items[0][quantity]", 1)
            .set("allow_promotion_codes", true)
            .set("mode", "payment")
            .set("ui_mode", "custom")
            .set("return_url", return_url);
        let session: WireCheckoutSession = self.post("/checkout/sessions", form).await?;
        Ok(session.into())
    }

    async fn create_payment_link(&self, request: &NewPaymentLink) -> PortResult<PaymentLink> {
        let product_form = Params::new()
            .set("name", &request.product_name)
            .set("default_price_data[currency]", &request.currency)
            .set("default_price_data[unit_amount]", request.amount);
        let product: WireProduct = self.post("/products", product_form).await?;
        let price = product.default_price.ok_or_else(|| {
            PortError::Unexpected(format!("Product {} was created without a price", product.id))
        })?;

        let link_form = Params::new()
            .set("line_items[0][price]", price)
            .set("line_items[0][quantity]", 1)
            .metadata("metadata", &request.metadata)
            .metadata("payment_intent_data[metadata]", &request.metadata);
        let link: WirePaymentLink = self.post("/payment_links", link_form).await?;
        Ok(link.into())
    }
}
