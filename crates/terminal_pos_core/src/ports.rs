//! crates/terminal_pos_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! workflows independent of the concrete payment platform and session storage.

use async_trait::async_trait;

use crate::domain::{
    Charge, CheckoutSession, CollectInputsRequest, ConnectionToken, Customer, Location,
    NewLocation, NewPaymentIntent, NewPaymentLink, NewReader, NewSetupIntent, PaymentIntent,
    PaymentIntentUpdate, PaymentLink, PaymentMethod, Reader, ReaderFilter, Refund, SessionId,
    SetupIntent, TerminalSession,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., HTTP, storage).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The hosted payment platform. Every call is a single outbound request; no
/// implementation retries.
#[async_trait]
pub trait PaymentPlatform: Send + Sync {
    // --- Terminal Readers ---
    async fn list_readers(&self, filter: &ReaderFilter) -> PortResult<Vec<Reader>>;

    async fn retrieve_reader(&self, reader_id: &str) -> PortResult<Reader>;

    async fn collect_inputs(
        &self,
        reader_id: &str,
        request: &CollectInputsRequest,
    ) -> PortResult<Reader>;

    async fn cancel_reader_action(&self, reader_id: &str) -> PortResult<Reader>;

    async fn process_payment_intent(
        &self,
        reader_id: &str,
        payment_intent_id: &str,
    ) -> PortResult<Reader>;

    async fn register_reader(&self, request: &NewReader) -> PortResult<Reader>;

    async fn create_connection_token(&self) -> PortResult<ConnectionToken>;

    // --- Locations ---
    async fn list_locations(&self, limit: u32) -> PortResult<Vec<Location>>;

    async fn create_location(&self, request: &NewLocation) -> PortResult<Location>;

    // --- Customers ---
    async fn list_customers(&self, limit: u32) -> PortResult<Vec<Customer>>;

    async fn retrieve_customer(&self, customer_id: &str) -> PortResult<Customer>;

    /// The first customer with exactly this email, if any.
    async fn find_customer_by_email(&self, email: &str) -> PortResult<Option<Customer>>;

    async fn create_customer(&self, email: &str) -> PortResult<Customer>;

    async fn update_customer_email(&self, customer_id: &str, email: &str) -> PortResult<Customer>;

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> PortResult<Customer>;

    async fn list_customer_cards(&self, customer_id: &str) -> PortResult<Vec<PaymentMethod>>;

    async fn retrieve_payment_method(&self, payment_method_id: &str) -> PortResult<PaymentMethod>;

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> PortResult<PaymentMethod>;

    // --- Charges ---
    /// Server-side search for charges made with the card. May be unsupported
    /// by the platform, in which case an error or an empty list comes back.
    async fn search_charges_by_fingerprint(&self, fingerprint: &str) -> PortResult<Vec<Charge>>;

    async fn list_recent_charges(&self, limit: u32) -> PortResult<Vec<Charge>>;

    // --- Payment Intents ---
    async fn create_payment_intent(&self, request: &NewPaymentIntent) -> PortResult<PaymentIntent>;

    async fn retrieve_payment_intent(&self, payment_intent_id: &str) -> PortResult<PaymentIntent>;

    async fn list_payment_intents(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> PortResult<Vec<PaymentIntent>>;

    async fn confirm_payment_intent(
        &self,
        payment_intent_id: &str,
        payment_method_id: &str,
        return_url: &str,
    ) -> PortResult<PaymentIntent>;

    async fn capture_payment_intent(&self, payment_intent_id: &str) -> PortResult<PaymentIntent>;

    async fn cancel_payment_intent(&self, payment_intent_id: &str) -> PortResult<PaymentIntent>;

    async fn assign_payment_intent_customer(
        &self,
        payment_intent_id: &str,
        customer_id: &str,
    ) -> PortResult<PaymentIntent>;

    async fn update_payment_intent(
        &self,
        payment_intent_id: &str,
        update: &PaymentIntentUpdate,
    ) -> PortResult<PaymentIntent>;

    // --- Setup Intents ---
    async fn create_setup_intent(&self, request: &NewSetupIntent) -> PortResult<SetupIntent>;

    // --- Refunds, Checkout and Links ---
    async fn create_refund(&self, payment_intent_id: &str, amount: Option<i64>)
        -> PortResult<Refund>;

    async fn create_checkout_session(
        &self,
        price_id: &str,
        return_url: &str,
    ) -> PortResult<CheckoutSession>;

    async fn create_payment_link(&self, request: &NewPaymentLink) -> PortResult<PaymentLink>;
}

/// Server-side storage for browser sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Opens a brand-new, empty session.
    async fn create(&self) -> PortResult<TerminalSession>;

    /// Refreshes a session's idle timer. Returns `false` if it is unknown or expired.
    async fn touch(&self, id: &SessionId) -> PortResult<bool>;

    async fn selected_reader(&self, id: &SessionId) -> PortResult<Option<String>>;

    async fn set_selected_reader(&self, id: &SessionId, reader_id: Option<&str>)
        -> PortResult<()>;
}
