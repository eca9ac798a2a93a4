//! crates/terminal_pos_core/src/collect.rs
//!
//! Collecting customer input (an email address) on a terminal reader.
//!
//! Collection is cooperative: `start` returns as soon as the reader is
//! prompting, and callers poll until a result shows up. The server keeps no
//! timer of its own. Persisting the email onto the customer record happens
//! only through the platform's "reader action succeeded" callback
//! (`record_collected_email`); polling is observational and never writes.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{
    ActionStatus, CollectInputsAction, CollectInputsRequest, CollectPrompt, Customer, Reader,
    SessionId,
};
use crate::error::{PosError, PosResult};
use crate::ports::{PaymentPlatform, PortError};
use crate::terminal::TerminalSelector;

pub const EMAIL_INPUT: &str = "email";
pub const CUSTOMER_ID_KEY: &str = "customer_id";

/// Where a collection stands, as seen by whoever is driving the polling.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CollectionState {
    Idle,
    Collecting,
    Waiting,
    Collected { result: CollectInputsAction },
    Cancelled,
    TimedOut,
    Failed { message: String },
}

impl CollectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Collected { .. } | Self::Cancelled | Self::TimedOut | Self::Failed { .. }
        )
    }
}

/// What the webhook path wrote onto a customer record.
#[derive(Debug, Clone)]
pub struct EmailCapture {
    pub customer_id: String,
    pub email: String,
    pub customer: Customer,
}

#[derive(Clone)]
pub struct InputCollector {
    platform: Arc<dyn PaymentPlatform>,
    selector: TerminalSelector,
    prompt: CollectPrompt,
}

impl InputCollector {
    pub fn new(
        platform: Arc<dyn PaymentPlatform>,
        selector: TerminalSelector,
        prompt: CollectPrompt,
    ) -> Self {
        Self {
            platform,
            selector,
            prompt,
        }
    }

    /// Prompts the customer for an email on the reader. The optional customer
    /// id travels as action metadata so the result can be correlated later.
    pub async fn start(&self, reader_id: &str, customer_id: Option<&str>) -> PosResult<Reader> {
        let mut metadata = HashMap::new();
        if let Some(customer_id) = customer_id.filter(|id| !id.is_empty()) {
            metadata.insert(CUSTOMER_ID_KEY.to_string(), customer_id.to_string());
        }
        let request = CollectInputsRequest {
            input_type: EMAIL_INPUT.to_string(),
            required: false,
            prompt: self.prompt.clone(),
            metadata,
        };

        let reader = self.platform.collect_inputs(reader_id, &request).await?;
        info!(
            "Email collection initiated on reader: {} for customer: {}",
            reader_id,
            customer_id.unwrap_or("-")
        );
        Ok(reader)
    }

    /// One poll. `NotFound` means "nothing yet, keep polling".
    pub async fn poll(&self, reader_id: &str) -> PosResult<CollectInputsAction> {
        let reader = self.platform.retrieve_reader(reader_id).await?;
        let Some(action) = reader.action.as_ref() else {
            return Err(no_data(reader_id));
        };
        let Some(collect) = reader.collect_inputs() else {
            return Err(no_data(reader_id));
        };

        match action.status {
            ActionStatus::Failed => Err(PosError::Platform(PortError::Rejected {
                status: 402,
                message: action
                    .failure_message
                    .clone()
                    .unwrap_or_else(|| "Collect inputs action failed".to_string()),
            })),
            ActionStatus::Succeeded => Ok(collect.clone()),
            _ if collect.has_result() => Ok(collect.clone()),
            _ => Err(no_data(reader_id)),
        }
    }

    pub async fn cancel(&self, reader_id: &str) -> PosResult<Reader> {
        let reader = self.platform.cancel_reader_action(reader_id).await?;
        info!("Collect inputs canceled on reader: {}", reader_id);
        Ok(reader)
    }

    pub async fn start_selected(
        &self,
        session: &SessionId,
        customer_id: Option<&str>,
    ) -> PosResult<Reader> {
        let reader_id = self.selector.require_selected(session).await?;
        self.start(&reader_id, customer_id).await
    }

    pub async fn poll_selected(&self, session: &SessionId) -> PosResult<CollectInputsAction> {
        let reader_id = self.selector.require_selected(session).await?;
        self.poll(&reader_id).await
    }

    pub async fn cancel_selected(&self, session: &SessionId) -> PosResult<Reader> {
        let reader_id = self.selector.require_selected(session).await?;
        self.cancel(&reader_id).await
    }

    /// Persists an email collected on a reader onto the customer named in the
    /// action metadata. `Ok(None)` when the event carries nothing to persist.
    pub async fn record_collected_email(&self, reader: &Reader) -> PosResult<Option<EmailCapture>> {
        let Some(collect) = reader.collect_inputs() else {
            info!("Reader {} action is not collect_inputs", reader.id);
            return Ok(None);
        };
        let Some(customer_id) = collect.metadata.get(CUSTOMER_ID_KEY) else {
            info!("No customer_id found in metadata for reader {}", reader.id);
            return Ok(None);
        };
        let Some(email) = collect.value_of(EMAIL_INPUT) else {
            info!("No email value found in collected inputs for reader {}", reader.id);
            return Ok(None);
        };

        let customer = self
            .platform
            .update_customer_email(customer_id, email)
            .await?;
        info!("Updated customer {} with email: {}", customer_id, email);
        Ok(Some(EmailCapture {
            customer_id: customer_id.clone(),
            email: email.to_string(),
            customer,
        }))
    }
}

fn no_data(reader_id: &str) -> PosError {
    PosError::NotFound(format!("No collected data found for reader: {reader_id}"))
}

//=========================================================================================
// Client-side polling loop
//=========================================================================================

/// Interval and wall-clock ceiling of the client-driven polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            ceiling: Duration::from_secs(60),
        }
    }
}

/// Starts a collection and polls until it resolves.
///
/// Drives `Idle → Collecting → Waiting → {Collected | Cancelled | TimedOut | Failed}`.
/// `on_state` sees every transition. Cancelling the token cancels the reader's
/// action before returning `Cancelled`. Timing out does not touch the reader.
pub async fn wait_for_inputs(
    collector: &InputCollector,
    reader_id: &str,
    customer_id: Option<&str>,
    policy: PollPolicy,
    cancel: CancellationToken,
    mut on_state: impl FnMut(&CollectionState),
) -> CollectionState {
    on_state(&CollectionState::Idle);

    let mut state = CollectionState::Collecting;
    on_state(&state);
    if let Err(e) = collector.start(reader_id, customer_id).await {
        state = CollectionState::Failed {
            message: e.to_string(),
        };
        on_state(&state);
        return state;
    }

    state = CollectionState::Waiting;
    on_state(&state);
    let deadline = Instant::now() + policy.ceiling;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = collector.cancel(reader_id).await {
                    warn!("Cancelling collection on {} failed: {}", reader_id, e);
                }
                state = CollectionState::Cancelled;
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                state = CollectionState::TimedOut;
                break;
            }
            _ = tokio::time::sleep(policy.interval) => {
                match collector.poll(reader_id).await {
                    Ok(result) => {
                        state = CollectionState::Collected { result };
                        break;
                    }
                    Err(PosError::NotFound(_)) => continue,
                    Err(e) => {
                        state = CollectionState::Failed { message: e.to_string() };
                        break;
                    }
                }
            }
        }
    }

    on_state(&state);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{customer, reader, FakePlatform, MemorySessions};

    struct Fixture {
        platform: Arc<FakePlatform>,
        collector: InputCollector,
        selector: TerminalSelector,
        session: SessionId,
    }

    fn fixture() -> Fixture {
        let platform = Arc::new(FakePlatform::new());
        platform.add_reader(reader("tmr_123"));
        platform.add_customer(customer("cus_1", "Hanako", None));
        let sessions = Arc::new(MemorySessions::new());
        let session = SessionId::new("sess");
        sessions.open(&session);
        let selector = TerminalSelector::new(platform.clone(), sessions);
        let collector =
            InputCollector::new(platform.clone(), selector.clone(), CollectPrompt::default());
        Fixture {
            platform,
            collector,
            selector,
            session,
        }
    }

    #[tokio::test]
    async fn start_without_selection_fails_without_platform_call() {
        let f = fixture();

        let err = f.collector.start_selected(&f.session, Some("cus_1")).await.unwrap_err();
        assert!(matches!(err, PosError::NoReaderSelected));
        let err = f.collector.cancel_selected(&f.session).await.unwrap_err();
        assert!(matches!(err, PosError::NoReaderSelected));
        assert!(f.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn start_attaches_customer_metadata() {
        let f = fixture();

        f.collector.start("tmr_123", Some("cus_1")).await.unwrap();

        let state = f.platform.reader_state("tmr_123").unwrap();
        let collect = state.collect_inputs().unwrap();
        assert_eq!(collect.metadata.get(CUSTOMER_ID_KEY).map(String::as_str), Some("cus_1"));
        assert_eq!(collect.inputs[0].input_type, EMAIL_INPUT);
        assert!(!collect.inputs[0].required);
    }

    #[tokio::test]
    async fn start_without_customer_sends_no_metadata() {
        let f = fixture();

        f.collector.start("tmr_123", None).await.unwrap();

        let state = f.platform.reader_state("tmr_123").unwrap();
        assert!(state.collect_inputs().unwrap().metadata.is_empty());
    }

    #[tokio::test]
    async fn poll_before_input_is_not_found_every_time() {
        let f = fixture();
        f.collector.start("tmr_123", None).await.unwrap();

        for _ in 0..3 {
            let err = f.collector.poll("tmr_123").await.unwrap_err();
            assert!(matches!(err, PosError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn poll_on_idle_reader_is_not_found() {
        let f = fixture();

        let err = f.collector.poll("tmr_123").await.unwrap_err();
        assert!(matches!(err, PosError::NotFound(_)));
    }

    #[tokio::test]
    async fn selected_reader_flow_collects_email() {
        let f = fixture();
        f.selector.select(&f.session, "tmr_123").await.unwrap();
        f.collector.start_selected(&f.session, Some("cus_1")).await.unwrap();

        let err = f.collector.poll_selected(&f.session).await.unwrap_err();
        assert!(matches!(err, PosError::NotFound(_)));

        f.platform.enter_input("tmr_123", "a@example.com");
        let result = f.collector.poll_selected(&f.session).await.unwrap();
        assert_eq!(result.value_of(EMAIL_INPUT), Some("a@example.com"));

        // Polling never writes to the customer.
        assert_eq!(f.platform.customer("cus_1").unwrap().email, None);
    }

    #[tokio::test]
    async fn failed_action_ends_polling_with_platform_error() {
        let f = fixture();
        f.collector.start("tmr_123", None).await.unwrap();
        f.platform.fail_action("tmr_123", "Customer walked away");

        let err = f.collector.poll("tmr_123").await.unwrap_err();
        assert!(matches!(err, PosError::Platform(_)));
        assert!(err.to_string().contains("Customer walked away"));
    }

    #[tokio::test]
    async fn cancel_clears_reader_action() {
        let f = fixture();
        f.collector.start("tmr_123", None).await.unwrap();

        f.collector.cancel("tmr_123").await.unwrap();

        assert!(f.platform.reader_state("tmr_123").unwrap().action.is_none());
        let err = f.collector.poll("tmr_123").await.unwrap_err();
        assert!(matches!(err, PosError::NotFound(_)));
    }

    #[tokio::test]
    async fn second_start_on_busy_reader_is_rejected_by_platform() {
        let f = fixture();
        f.collector.start("tmr_123", None).await.unwrap();

        let err = f.collector.start("tmr_123", None).await.unwrap_err();
        assert!(matches!(err, PosError::Platform(PortError::Rejected { status: 409, .. })));

        f.collector.cancel("tmr_123").await.unwrap();
        f.collector.start("tmr_123", None).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_records_email_on_correlated_customer() {
        let f = fixture();
        f.collector.start("tmr_123", Some("cus_1")).await.unwrap();
        f.platform.enter_input("tmr_123", "a@example.com");
        let reader = f.platform.reader_state("tmr_123").unwrap();

        let capture = f.collector.record_collected_email(&reader).await.unwrap().unwrap();
        assert_eq!(capture.customer_id, "cus_1");
        assert_eq!(capture.email, "a@example.com");
        assert_eq!(
            f.platform.customer("cus_1").unwrap().email.as_deref(),
            Some("a@example.com")
        );
    }

    #[tokio::test]
    async fn webhook_without_correlation_writes_nothing() {
        let f = fixture();
        f.collector.start("tmr_123", None).await.unwrap();
        f.platform.enter_input("tmr_123", "a@example.com");
        let reader = f.platform.reader_state("tmr_123").unwrap();

        let capture = f.collector.record_collected_email(&reader).await.unwrap();
        assert!(capture.is_none());
        assert_eq!(f.platform.call_count("update_customer"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_collects_after_customer_answers() {
        let f = fixture();
        let platform = f.platform.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            platform.enter_input("tmr_123", "a@example.com");
        });

        let mut seen = Vec::new();
        let state = wait_for_inputs(
            &f.collector,
            "tmr_123",
            Some("cus_1"),
            PollPolicy::default(),
            CancellationToken::new(),
            |s| seen.push(format!("{s:?}")),
        )
        .await;

        match state {
            CollectionState::Collected { result } => {
                assert_eq!(result.value_of(EMAIL_INPUT), Some("a@example.com"))
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(seen[0].starts_with("Idle"));
        assert!(seen[1].starts_with("Collecting"));
        assert!(seen[2].starts_with("Waiting"));
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_times_out_at_ceiling() {
        let f = fixture();

        let state = wait_for_inputs(
            &f.collector,
            "tmr_123",
            None,
            PollPolicy::default(),
            CancellationToken::new(),
            |_| {},
        )
        .await;

        assert!(matches!(state, CollectionState::TimedOut));
        // 2 s interval over a 60 s ceiling.
        let polls = f.platform.call_count("retrieve_reader");
        assert!((28..=30).contains(&polls), "polled {polls} times");
        assert_eq!(f.platform.call_count("cancel_action"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_cancels_reader_action() {
        let f = fixture();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let state = wait_for_inputs(
            &f.collector,
            "tmr_123",
            None,
            PollPolicy::default(),
            token,
            |_| {},
        )
        .await;

        assert!(matches!(state, CollectionState::Cancelled));
        assert_eq!(f.platform.call_count("cancel_action"), 1);
        assert!(f.platform.reader_state("tmr_123").unwrap().action.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_fails_when_reader_is_unknown() {
        let f = fixture();

        let state = wait_for_inputs(
            &f.collector,
            "tmr_missing",
            None,
            PollPolicy::default(),
            CancellationToken::new(),
            |_| {},
        )
        .await;

        assert!(matches!(state, CollectionState::Failed { .. }));
        assert!(state.is_terminal());
    }
}
