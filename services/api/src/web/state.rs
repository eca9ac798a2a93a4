//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::WebhookVerifier;
use crate::config::Config;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use terminal_pos_core::{
    CandidateSearch, InputCollector, PaymentPlatform, SessionStore, TerminalSelector,
};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
/// Nothing in it is per-browser; per-session data lives in the `SessionStore`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub platform: Arc<dyn PaymentPlatform>,
    pub sessions: Arc<dyn SessionStore>,
    pub selector: TerminalSelector,
    pub collector: InputCollector,
    pub candidates: CandidateSearch,
    /// `None` when no endpoint secret is configured; the webhook then refuses all deliveries.
    pub webhook: Option<Arc<WebhookVerifier>>,
}

impl AppState {
    /// Wires the core workflows onto the given adapters.
    pub fn new(
        config: Arc<Config>,
        platform: Arc<dyn PaymentPlatform>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let selector = TerminalSelector::new(platform.clone(), sessions.clone());
        let collector = InputCollector::new(
            platform.clone(),
            selector.clone(),
            config.collect_prompt.clone(),
        );
        let candidates = CandidateSearch::new(platform.clone())
            .with_windows(config.dedup_charge_window, config.dedup_customer_window);
        let webhook = config.stripe_endpoint_secret.as_ref().map(|secret| {
            Arc::new(WebhookVerifier::new(SecretString::from(
                secret.expose_secret().to_string(),
            )))
        });

        Self {
            config,
            platform,
            sessions,
            selector,
            collector,
            candidates,
            webhook,
        }
    }
}
