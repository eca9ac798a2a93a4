//! crates/terminal_pos_core/src/domain.rs
//!
//! Defines the core data structures for the point-of-sale backend.
//! The payment platform is the source of truth for everything here except
//! `TerminalSession`; these are read-side projections of its resources.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Browser Sessions
//=========================================================================================

/// Opaque identifier carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side state of one browser session. Holds at most one selected reader.
#[derive(Debug, Clone)]
pub struct TerminalSession {
    pub id: SessionId,
    pub selected_reader_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

//=========================================================================================
// Terminal Readers
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderStatus {
    Online,
    Offline,
    Unknown,
}

/// A physical card-reading terminal managed by the payment platform.
#[derive(Debug, Clone, Serialize)]
pub struct Reader {
    pub id: String,
    pub label: Option<String>,
    pub device_type: String,
    pub status: ReaderStatus,
    pub location: Option<String>,
    pub serial_number: Option<String>,
    pub action: Option<ReaderAction>,
}

impl Reader {
    /// The reader's current collect-inputs action, if that is what it is doing.
    pub fn collect_inputs(&self) -> Option<&CollectInputsAction> {
        match self.action.as_ref().map(|a| &a.kind) {
            Some(ReaderActionKind::CollectInputs(collect)) => Some(collect),
            _ => None,
        }
    }
}

/// Optional filters when listing readers.
#[derive(Debug, Clone, Default)]
pub struct ReaderFilter {
    pub limit: Option<u32>,
    pub device_type: Option<String>,
    pub location: Option<String>,
    pub serial_number: Option<String>,
    pub status: Option<String>,
}

/// Pairs a physical reader with the account using the code shown on its screen.
#[derive(Debug, Clone)]
pub struct NewReader {
    pub registration_code: String,
    pub label: Option<String>,
    pub location: Option<String>,
}

/// A place readers are assigned to.
#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub id: String,
    pub display_name: String,
    pub address: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Address {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewLocation {
    pub display_name: String,
    pub address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    InProgress,
    Succeeded,
    Failed,
    Unknown,
}

/// The action a reader is currently performing (or last performed).
#[derive(Debug, Clone, Serialize)]
pub struct ReaderAction {
    #[serde(flatten)]
    pub kind: ReaderActionKind,
    pub status: ActionStatus,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReaderActionKind {
    CollectInputs(CollectInputsAction),
    ProcessPaymentIntent { payment_intent: Option<String> },
    Other { name: String },
}

/// Inputs a reader collected (or is collecting) plus the caller's metadata echo.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectInputsAction {
    pub inputs: Vec<CollectedInput>,
    pub metadata: HashMap<String, String>,
}

impl CollectInputsAction {
    /// True once the customer has answered (or skipped) at least one prompt.
    pub fn has_result(&self) -> bool {
        self.inputs.iter().any(|i| i.value.is_some() || i.skipped)
    }

    /// First non-empty value entered for an input of the given type.
    pub fn value_of(&self, input_type: &str) -> Option<&str> {
        self.inputs
            .iter()
            .filter(|i| i.input_type == input_type)
            .find_map(|i| i.value.as_deref().filter(|v| !v.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectedInput {
    #[serde(rename = "type")]
    pub input_type: String,
    pub required: bool,
    pub skipped: bool,
    pub value: Option<String>,
}

/// Text shown on the reader's screen when prompting for an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectPrompt {
    pub title: String,
    pub description: String,
    pub submit_button: String,
    pub skip_button: String,
}

impl Default for CollectPrompt {
    fn default() -> Self {
        Self {
            title: "メールを登録してください".to_string(),
            description: "会員登録をして、特典をお送りします。".to_string(),
            submit_button: "Submit".to_string(),
            skip_button: "Skip".to_string(),
        }
    }
}

/// A request to prompt the customer on a reader.
#[derive(Debug, Clone)]
pub struct CollectInputsRequest {
    pub input_type: String,
    pub required: bool,
    pub prompt: CollectPrompt,
    pub metadata: HashMap<String, String>,
}

//=========================================================================================
// Customers and Cards
//=========================================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created: i64,
    pub default_payment_method: Option<String>,
}

/// A customer together with their stored cards, one per physical card.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: Customer,
    pub cards: Vec<PaymentMethod>,
}

impl CustomerDetail {
    /// Builds the detail view, keeping only the first card for each fingerprint.
    pub fn new(customer: Customer, cards: Vec<PaymentMethod>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let cards = cards
            .into_iter()
            .filter(|pm| match pm.fingerprint() {
                Some(fp) => seen.insert(fp.to_string()),
                None => true,
            })
            .collect();
        Self { customer, cards }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CardDetails {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub customer: Option<String>,
    pub card: Option<CardDetails>,
}

impl PaymentMethod {
    pub fn fingerprint(&self) -> Option<&str> {
        self.card.as_ref()?.fingerprint.as_deref()
    }
}

/// Lightweight projection returned by the candidate search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateCustomer {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<&Customer> for CandidateCustomer {
    fn from(c: &Customer) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            email: c.email.clone(),
        }
    }
}

//=========================================================================================
// Payments
//=========================================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    pub amount_refunded: i64,
    pub refunded: bool,
    pub currency: String,
    pub status: String,
    pub customer: Option<String>,
    pub payment_intent: Option<String>,
    pub fingerprint: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub customer: Option<String>,
    pub client_secret: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub latest_charge: Option<Charge>,
    pub metadata: HashMap<String, String>,
    pub created: i64,
}

/// How a new payment intent is collected and captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMethod {
    Automatic,
    AutomaticAsync,
    Manual,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::AutomaticAsync => "automatic_async",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for CaptureMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(Self::Automatic),
            "automatic_async" => Ok(Self::AutomaticAsync),
            "manual" => Ok(Self::Manual),
            other => Err(format!("Unknown capture_method '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub amount: i64,
    pub currency: String,
    pub customer: Option<String>,
    pub payment_method: Option<String>,
    pub payment_method_types: Vec<String>,
    pub capture_method: CaptureMethod,
    pub description: Option<String>,
    pub receipt_email: Option<String>,
    pub setup_future_usage: Option<String>,
    /// Bracketed paths below `payment_method_options`, e.g.
    /// `[card_present][request_extended_authorization]`, and their values.
    pub payment_method_options: BTreeMap<String, String>,
    pub metadata: HashMap<String, String>,
}

impl NewPaymentIntent {
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            customer: None,
            payment_method: None,
            payment_method_types: Vec::new(),
            capture_method: CaptureMethod::Automatic,
            description: None,
            receipt_email: None,
            setup_future_usage: None,
            payment_method_options: BTreeMap::new(),
            metadata: HashMap::new(),
        }
    }
}

/// Fields of an existing payment intent a caller may change.
#[derive(Debug, Clone, Default)]
pub struct PaymentIntentUpdate {
    pub receipt_email: Option<String>,
}

/// Saves a card for later use without charging it.
#[derive(Debug, Clone)]
pub struct NewSetupIntent {
    pub payment_method_types: Vec<String>,
    pub customer: Option<String>,
    pub description: Option<String>,
    pub on_behalf_of: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupIntent {
    pub id: String,
    pub status: String,
    pub customer: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_intent: Option<String>,
    pub charge: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub client_secret: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentLink {
    pub amount: i64,
    pub currency: String,
    pub product_name: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentLink {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionToken {
    pub secret: String,
}

//=========================================================================================
// Platform Events
//=========================================================================================

/// A verified callback from the payment platform.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    ReaderActionSucceeded(Reader),
    PaymentMethodAttached { id: String },
    Other { event_type: String },
}
