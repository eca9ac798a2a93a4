//! services/api/src/bin/collect_email.rs
//!
//! Prompts for an email address on a reader and polls until the customer
//! answers, the ceiling passes, or Ctrl-C cancels the prompt.
//!
//! Usage: `collect_email <reader_id> [customer_id]`

use api_lib::{
    adapters::{InMemorySessionStore, StripeAdapter},
    config::Config,
    error::ApiError,
};
use secrecy::SecretString;
use std::sync::Arc;
use terminal_pos_core::{
    wait_for_inputs, CollectionState, InputCollector, PollPolicy, TerminalSelector,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let mut args = std::env::args().skip(1);
    let reader_id = args.next().ok_or_else(|| {
        ApiError::BadRequest("usage: collect_email <reader_id> [customer_id]".into())
    })?;
    let customer_id = args.next();

    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- 2. Initialize the Collector ---
    let platform = Arc::new(StripeAdapter::new(
        config.stripe_api_base.clone(),
        SecretString::from(config.secret_key().to_string()),
    ));
    let sessions = Arc::new(InMemorySessionStore::new(config.session_ttl));
    let selector = TerminalSelector::new(platform.clone(), sessions);
    let collector = InputCollector::new(platform, selector, config.collect_prompt.clone());

    // --- 3. Cancel the prompt on Ctrl-C ---
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    // --- 4. Collect and Poll ---
    let state = wait_for_inputs(
        &collector,
        &reader_id,
        customer_id.as_deref(),
        PollPolicy::default(),
        cancel,
        |state| info!("Collection on {}: {:?}", reader_id, state),
    )
    .await;

    match state {
        CollectionState::Collected { result } => {
            match result.value_of("email") {
                Some(email) => println!("{}", email),
                None => warn!("The customer skipped the prompt"),
            }
            Ok(())
        }
        CollectionState::Cancelled | CollectionState::TimedOut => {
            warn!("No email was collected");
            Ok(())
        }
        CollectionState::Failed { message } => Err(ApiError::Internal(message)),
        other => Err(ApiError::Internal(format!(
            "Collection stopped in state {:?}",
            other
        ))),
    }
}
