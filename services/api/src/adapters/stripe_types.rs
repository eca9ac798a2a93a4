//! services/api/src/adapters/stripe_types.rs
//!
//! Wire representations of the Stripe REST resources this service reads, and
//! their conversion into domain types. Only the fields the service uses are
//! declared; everything else in Stripe's responses is ignored.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use terminal_pos_core::domain::{
    ActionStatus, Address, CardDetails, Charge, CheckoutSession, CollectInputsAction,
    CollectedInput, ConnectionToken, Customer, Location, PaymentIntent, PaymentLink,
    PaymentMethod, Reader, ReaderAction, ReaderActionKind, ReaderStatus, Refund, SetupIntent,
};

/// A list envelope (`{"object": "list", "data": [...]}`) or a search result.
#[derive(Debug, Deserialize)]
pub struct List<T> {
    pub data: Vec<T>,
}

/// A field that is either an id or, when requested with `expand[]`, the object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T> Expandable<T> {
    fn into_object(self) -> Option<T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(object) => Some(*object),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub message: Option<String>,
    pub code: Option<String>,
}

//=========================================================================================
// Terminal Readers
//=========================================================================================

#[derive(Debug, Deserialize)]
pub struct WireReader {
    pub id: String,
    pub label: Option<String>,
    pub device_type: String,
    pub status: Option<String>,
    pub location: Option<String>,
    pub serial_number: Option<String>,
    pub action: Option<WireReaderAction>,
}

#[derive(Debug, Deserialize)]
pub struct WireReaderAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub status: String,
    pub failure_message: Option<String>,
    pub collect_inputs: Option<WireCollectInputs>,
    pub process_payment_intent: Option<WireProcessPaymentIntent>,
}

#[derive(Debug, Deserialize)]
pub struct WireCollectInputs {
    #[serde(default)]
    pub inputs: Vec<WireInput>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// The entered value lives under a key named after the input type, e.g.
/// `{"type": "email", "email": {"value": "a@example.com"}}`.
#[derive(Debug, Deserialize)]
pub struct WireInput {
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub skipped: Option<bool>,
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct WireProcessPaymentIntent {
    pub payment_intent: Option<String>,
}

impl WireReader {
    pub fn into_domain(self) -> Reader {
        Reader {
            id: self.id,
            label: self.label,
            device_type: self.device_type,
            status: match self.status.as_deref() {
                Some("online") => ReaderStatus::Online,
                Some("offline") => ReaderStatus::Offline,
                _ => ReaderStatus::Unknown,
            },
            location: self.location,
            serial_number: self.serial_number,
            action: self.action.map(WireReaderAction::into_domain),
        }
    }
}

impl WireReaderAction {
    fn into_domain(self) -> ReaderAction {
        let kind = match (
            self.action_type.as_str(),
            self.collect_inputs,
            self.process_payment_intent,
        ) {
            ("collect_inputs", Some(collect), _) => {
                ReaderActionKind::CollectInputs(collect.into_domain())
            }
            ("collect_inputs", None, _) => {
                ReaderActionKind::CollectInputs(CollectInputsAction::default())
            }
            ("process_payment_intent", _, process) => ReaderActionKind::ProcessPaymentIntent {
                payment_intent: process.and_then(|p| p.payment_intent),
            },
            (other, _, _) => ReaderActionKind::Other {
                name: other.to_string(),
            },
        };
        ReaderAction {
            kind,
            status: match self.status.as_str() {
                "in_progress" => ActionStatus::InProgress,
                "succeeded" => ActionStatus::Succeeded,
                "failed" => ActionStatus::Failed,
                _ => ActionStatus::Unknown,
            },
            failure_message: self.failure_message,
        }
    }
}

impl WireCollectInputs {
    fn into_domain(self) -> CollectInputsAction {
        CollectInputsAction {
            inputs: self.inputs.into_iter().map(WireInput::into_domain).collect(),
            metadata: self.metadata,
        }
    }
}

impl WireInput {
    fn into_domain(self) -> CollectedInput {
        let value = self
            .fields
            .get(&self.input_type)
            .and_then(|v| v.get("value"))
            .and_then(Value::as_str)
            .map(str::to_string);
        CollectedInput {
            input_type: self.input_type,
            required: self.required.unwrap_or(false),
            skipped: self.skipped.unwrap_or(false),
            value,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireConnectionToken {
    pub secret: String,
}

impl From<WireConnectionToken> for ConnectionToken {
    fn from(t: WireConnectionToken) -> Self {
        ConnectionToken { secret: t.secret }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WireAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireLocation {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub address: WireAddress,
}

impl From<WireLocation> for Location {
    fn from(l: WireLocation) -> Self {
        let a = l.address;
        Location {
            id: l.id,
            display_name: l.display_name,
            address: Address {
                line1: a.line1,
                line2: a.line2,
                city: a.city,
                state: a.state,
                postal_code: a.postal_code,
                country: a.country,
            },
        }
    }
}

//=========================================================================================
// Customers and Payment Methods
//=========================================================================================

#[derive(Debug, Deserialize)]
pub struct WireCustomer {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub created: i64,
    pub invoice_settings: Option<WireInvoiceSettings>,
}

#[derive(Debug, Deserialize)]
pub struct WireInvoiceSettings {
    pub default_payment_method: Option<String>,
}

impl From<WireCustomer> for Customer {
    fn from(c: WireCustomer) -> Self {
        Customer {
            id: c.id,
            name: c.name,
            email: c.email,
            phone: c.phone,
            created: c.created,
            default_payment_method: c.invoice_settings.and_then(|s| s.default_payment_method),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireCard {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
    pub fingerprint: Option<String>,
}

impl From<WireCard> for CardDetails {
    fn from(c: WireCard) -> Self {
        CardDetails {
            brand: c.brand,
            last4: c.last4,
            exp_month: c.exp_month,
            exp_year: c.exp_year,
            fingerprint: c.fingerprint,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WirePaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub customer: Option<Expandable<WireCustomer>>,
    pub card: Option<WireCard>,
    pub card_present: Option<WireCard>,
}

impl From<WirePaymentMethod> for PaymentMethod {
    fn from(pm: WirePaymentMethod) -> Self {
        PaymentMethod {
            id: pm.id,
            method_type: pm.method_type,
            customer: pm.customer.map(|customer| match customer {
                Expandable::Id(id) => id,
                Expandable::Object(customer) => customer.id,
            }),
            card: pm.card.or(pm.card_present).map(CardDetails::from),
        }
    }
}

//=========================================================================================
// Charges and Payment Intents
//=========================================================================================

#[derive(Debug, Deserialize)]
pub struct WireChargeDetails {
    pub card: Option<WireCard>,
    pub card_present: Option<WireCard>,
}

#[derive(Debug, Deserialize)]
pub struct WireCharge {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub refunded: bool,
    pub currency: String,
    pub status: String,
    pub customer: Option<String>,
    pub payment_intent: Option<String>,
    pub payment_method_details: Option<WireChargeDetails>,
    #[serde(default)]
    pub created: i64,
}

impl From<WireCharge> for Charge {
    fn from(c: WireCharge) -> Self {
        let fingerprint = c
            .payment_method_details
            .and_then(|d| d.card.or(d.card_present))
            .and_then(|card| card.fingerprint);
        Charge {
            id: c.id,
            amount: c.amount,
            amount_refunded: c.amount_refunded,
            refunded: c.refunded,
            currency: c.currency,
            status: c.status,
            customer: c.customer,
            payment_intent: c.payment_intent,
            fingerprint,
            created: c.created,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WirePaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub customer: Option<String>,
    pub client_secret: Option<String>,
    pub payment_method: Option<Expandable<WirePaymentMethod>>,
    pub latest_charge: Option<Expandable<WireCharge>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub created: i64,
}

impl From<WirePaymentIntent> for PaymentIntent {
    fn from(pi: WirePaymentIntent) -> Self {
        PaymentIntent {
            id: pi.id,
            amount: pi.amount,
            currency: pi.currency,
            status: pi.status,
            customer: pi.customer,
            client_secret: pi.client_secret,
            payment_method: pi
                .payment_method
                .and_then(Expandable::into_object)
                .map(PaymentMethod::from),
            latest_charge: pi
                .latest_charge
                .and_then(Expandable::into_object)
                .map(Charge::from),
            metadata: pi.metadata,
            created: pi.created,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireSetupIntent {
    pub id: String,
    pub status: String,
    pub customer: Option<String>,
    pub client_secret: Option<String>,
}

impl From<WireSetupIntent> for SetupIntent {
    fn from(si: WireSetupIntent) -> Self {
        SetupIntent {
            id: si.id,
            status: si.status,
            customer: si.customer,
            client_secret: si.client_secret,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireRefund {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: Option<String>,
    pub payment_intent: Option<String>,
    pub charge: Option<String>,
}

impl From<WireRefund> for Refund {
    fn from(r: WireRefund) -> Self {
        Refund {
            id: r.id,
            amount: r.amount,
            currency: r.currency,
            status: r.status.unwrap_or_else(|| "pending".to_string()),
            payment_intent: r.payment_intent,
            charge: r.charge,
        }
    }
}

//=========================================================================================
// Checkout, Products and Links
//=========================================================================================

#[derive(Debug, Deserialize)]
pub struct WireCheckoutSession {
    pub id: String,
    pub client_secret: Option<String>,
    pub url: Option<String>,
}

impl From<WireCheckoutSession> for CheckoutSession {
    fn from(s: WireCheckoutSession) -> Self {
        CheckoutSession {
            id: s.id,
            client_secret: s.client_secret,
            url: s.url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireProduct {
    pub id: String,
    pub default_price: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WirePaymentLink {
    pub id: String,
    pub url: String,
}

impl From<WirePaymentLink> for PaymentLink {
    fn from(l: WirePaymentLink) -> Self {
        PaymentLink { id: l.id, url: l.url }
    }
}

//=========================================================================================
// Events
//=========================================================================================

#[derive(Debug, Deserialize)]
pub struct WireEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WireEventData,
}

#[derive(Debug, Deserialize)]
pub struct WireEventData {
    pub object: Value,
}
