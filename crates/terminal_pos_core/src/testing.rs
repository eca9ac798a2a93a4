//! crates/terminal_pos_core/src/testing.rs
//!
//! In-memory stand-ins for the ports, for unit and router tests.
//! Every platform call is appended to a call log so tests can assert on
//! which outbound requests a workflow made.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::domain::{
    ActionStatus, CardDetails, Charge, CheckoutSession, CollectInputsAction, CollectInputsRequest,
    CollectedInput, ConnectionToken, Customer, Location, NewLocation, NewPaymentIntent,
    NewPaymentLink, NewReader, NewSetupIntent, PaymentIntent, PaymentIntentUpdate, PaymentLink,
    PaymentMethod, Reader, ReaderAction, ReaderActionKind, ReaderFilter, ReaderStatus, Refund,
    SessionId, SetupIntent, TerminalSession,
};
use crate::ports::{PaymentPlatform, PortError, PortResult, SessionStore};

//=========================================================================================
// Builders
//=========================================================================================

pub fn reader(id: &str) -> Reader {
    Reader {
        id: id.to_string(),
        label: Some(format!("Reader {id}")),
        device_type: "bbpos_wisepos_e".to_string(),
        status: ReaderStatus::Online,
        location: Some("tml_1".to_string()),
        serial_number: None,
        action: None,
    }
}

pub fn customer(id: &str, name: &str, email: Option<&str>) -> Customer {
    Customer {
        id: id.to_string(),
        name: Some(name.to_string()),
        email: email.map(str::to_string),
        phone: None,
        created: 0,
        default_payment_method: None,
    }
}

pub fn card(id: &str, customer_id: Option<&str>, fingerprint: &str) -> PaymentMethod {
    PaymentMethod {
        id: id.to_string(),
        method_type: "card".to_string(),
        customer: customer_id.map(str::to_string),
        card: Some(CardDetails {
            brand: Some("visa".to_string()),
            last4: Some("4242".to_string()),
            exp_month: Some(12),
            exp_year: Some(2030),
            fingerprint: Some(fingerprint.to_string()),
        }),
    }
}

pub fn charge(id: &str, customer_id: Option<&str>, fingerprint: &str) -> Charge {
    Charge {
        id: id.to_string(),
        amount: 1000,
        amount_refunded: 0,
        refunded: false,
        currency: "jpy".to_string(),
        status: "succeeded".to_string(),
        customer: customer_id.map(str::to_string),
        payment_intent: None,
        fingerprint: Some(fingerprint.to_string()),
        created: 0,
    }
}

//=========================================================================================
// FakePlatform
//=========================================================================================

#[derive(Default)]
struct FakeState {
    readers: HashMap<String, Reader>,
    customers: Vec<Customer>,
    cards: HashMap<String, Vec<PaymentMethod>>,
    payment_methods: HashMap<String, PaymentMethod>,
    charges: Vec<Charge>,
    payment_intents: HashMap<String, PaymentIntent>,
    intent_requests: Vec<NewPaymentIntent>,
    receipt_emails: HashMap<String, String>,
    setup_intents: Vec<NewSetupIntent>,
    locations: Vec<Location>,
    charge_search_supported: bool,
    broken_customers: HashSet<String>,
    calls: Vec<String>,
}

/// A payment platform held entirely in memory.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn record(&self, call: impl Into<String>) {
        let call = call.into();
        self.with(|s| s.calls.push(call));
    }

    pub fn add_reader(&self, reader: Reader) {
        self.with(|s| s.readers.insert(reader.id.clone(), reader));
    }

    pub fn remove_reader(&self, reader_id: &str) {
        self.with(|s| s.readers.remove(reader_id));
    }

    /// Customers are listed in insertion order, newest first being the caller's job.
    pub fn add_customer(&self, customer: Customer) {
        self.with(|s| s.customers.push(customer));
    }

    pub fn add_card(&self, customer_id: &str, card: PaymentMethod) {
        self.with(|s| {
            s.payment_methods.insert(card.id.clone(), card.clone());
            s.cards.entry(customer_id.to_string()).or_default().push(card);
        });
    }

    pub fn add_payment_method(&self, pm: PaymentMethod) {
        self.with(|s| s.payment_methods.insert(pm.id.clone(), pm));
    }

    pub fn add_charge(&self, charge: Charge) {
        self.with(|s| s.charges.push(charge));
    }

    pub fn add_location(&self, location: Location) {
        self.with(|s| s.locations.push(location));
    }

    pub fn enable_charge_search(&self) {
        self.with(|s| s.charge_search_supported = true);
    }

    /// Makes every lookup of this customer (retrieve and card listing) fail.
    pub fn break_customer(&self, customer_id: &str) {
        self.with(|s| s.broken_customers.insert(customer_id.to_string()));
    }

    /// Simulates the customer typing a value for the reader's current prompt.
    pub fn enter_input(&self, reader_id: &str, value: &str) {
        self.with(|s| {
            if let Some(action) = s.readers.get_mut(reader_id).and_then(|r| r.action.as_mut()) {
                if let ReaderActionKind::CollectInputs(collect) = &mut action.kind {
                    for input in &mut collect.inputs {
                        input.value = Some(value.to_string());
                    }
                    action.status = ActionStatus::Succeeded;
                }
            }
        });
    }

    pub fn fail_action(&self, reader_id: &str, message: &str) {
        self.with(|s| {
            if let Some(action) = s.readers.get_mut(reader_id).and_then(|r| r.action.as_mut()) {
                action.status = ActionStatus::Failed;
                action.failure_message = Some(message.to_string());
            }
        });
    }

    pub fn customer(&self, customer_id: &str) -> Option<Customer> {
        self.with(|s| s.customers.iter().find(|c| c.id == customer_id).cloned())
    }

    /// The request behind the most recent `create_payment_intent`.
    pub fn last_intent_request(&self) -> Option<NewPaymentIntent> {
        self.with(|s| s.intent_requests.last().cloned())
    }

    pub fn last_setup_intent_request(&self) -> Option<NewSetupIntent> {
        self.with(|s| s.setup_intents.last().cloned())
    }

    pub fn receipt_email(&self, payment_intent_id: &str) -> Option<String> {
        self.with(|s| s.receipt_emails.get(payment_intent_id).cloned())
    }

    pub fn payment_method(&self, payment_method_id: &str) -> Option<PaymentMethod> {
        self.with(|s| s.payment_methods.get(payment_method_id).cloned())
    }

    pub fn reader_state(&self, reader_id: &str) -> Option<Reader> {
        self.with(|s| s.readers.get(reader_id).cloned())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
    }

    fn missing(kind: &str, id: &str) -> PortError {
        PortError::NotFound(format!("No such {kind}: '{id}'"))
    }

    fn find_reader(&self, reader_id: &str) -> PortResult<Reader> {
        self.with(|s| s.readers.get(reader_id).cloned())
            .ok_or_else(|| Self::missing("terminal.reader", reader_id))
    }

    fn check_customer(&self, customer_id: &str) -> PortResult<()> {
        if self.with(|s| s.broken_customers.contains(customer_id)) {
            return Err(PortError::Unexpected(format!("lookup of {customer_id} failed")));
        }
        Ok(())
    }

    fn intent(&self, request: &NewPaymentIntent) -> PaymentIntent {
        let id = format!("pi_{}", self.with(|s| s.payment_intents.len() + 1));
        PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id,
            amount: request.amount,
            currency: request.currency.clone(),
            status: "requires_payment_method".to_string(),
            customer: request.customer.clone(),
            payment_method: None,
            latest_charge: None,
            metadata: request.metadata.clone(),
            created: Utc::now().timestamp(),
        }
    }

    fn update_intent(
        &self,
        payment_intent_id: &str,
        f: impl FnOnce(&mut PaymentIntent),
    ) -> PortResult<PaymentIntent> {
        self.with(|s| {
            s.payment_intents.get_mut(payment_intent_id).map(|pi| {
                f(pi);
                pi.clone()
            })
        })
        .ok_or_else(|| Self::missing("payment_intent", payment_intent_id))
    }
}

#[async_trait]
impl PaymentPlatform for FakePlatform {
    async fn list_readers(&self, filter: &ReaderFilter) -> PortResult<Vec<Reader>> {
        self.record("list_readers");
        let mut readers: Vec<Reader> = self.with(|s| s.readers.values().cloned().collect());
        readers.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(device_type) = &filter.device_type {
            readers.retain(|r| &r.device_type == device_type);
        }
        readers.truncate(filter.limit.unwrap_or(100) as usize);
        Ok(readers)
    }

    async fn retrieve_reader(&self, reader_id: &str) -> PortResult<Reader> {
        self.record(format!("retrieve_reader:{reader_id}"));
        self.find_reader(reader_id)
    }

    async fn collect_inputs(
        &self,
        reader_id: &str,
        request: &CollectInputsRequest,
    ) -> PortResult<Reader> {
        self.record(format!("collect_inputs:{reader_id}"));
        self.with(|s| {
            let reader = s
                .readers
                .get_mut(reader_id)
                .ok_or_else(|| Self::missing("terminal.reader", reader_id))?;
            if matches!(&reader.action, Some(a) if a.status == ActionStatus::InProgress) {
                return Err(PortError::Rejected {
                    status: 409,
                    message: "Reader is currently busy".to_string(),
                });
            }
            reader.action = Some(ReaderAction {
                kind: ReaderActionKind::CollectInputs(CollectInputsAction {
                    inputs: vec![CollectedInput {
                        input_type: request.input_type.clone(),
                        required: request.required,
                        skipped: false,
                        value: None,
                    }],
                    metadata: request.metadata.clone(),
                }),
                status: ActionStatus::InProgress,
                failure_message: None,
            });
            Ok(reader.clone())
        })
    }

    async fn cancel_reader_action(&self, reader_id: &str) -> PortResult<Reader> {
        self.record(format!("cancel_action:{reader_id}"));
        self.with(|s| {
            let reader = s
                .readers
                .get_mut(reader_id)
                .ok_or_else(|| Self::missing("terminal.reader", reader_id))?;
            reader.action = None;
            Ok(reader.clone())
        })
    }

    async fn process_payment_intent(
        &self,
        reader_id: &str,
        payment_intent_id: &str,
    ) -> PortResult<Reader> {
        self.record(format!("process_payment_intent:{reader_id}"));
        self.with(|s| {
            let reader = s
                .readers
                .get_mut(reader_id)
                .ok_or_else(|| Self::missing("terminal.reader", reader_id))?;
            reader.action = Some(ReaderAction {
                kind: ReaderActionKind::ProcessPaymentIntent {
                    payment_intent: Some(payment_intent_id.to_string()),
                },
                status: ActionStatus::InProgress,
                failure_message: None,
            });
            Ok(reader.clone())
        })
    }

    async fn register_reader(&self, request: &NewReader) -> PortResult<Reader> {
        self.record(format!("register_reader:{}", request.registration_code));
        if request.registration_code.is_empty() {
            return Err(PortError::Rejected {
                status: 400,
                message: "Invalid registration code".to_string(),
            });
        }
        self.with(|s| {
            let mut new_reader = reader(&format!("tmr_{}", s.readers.len() + 1));
            new_reader.label = request.label.clone();
            new_reader.location = request.location.clone();
            s.readers.insert(new_reader.id.clone(), new_reader.clone());
            Ok(new_reader)
        })
    }

    async fn create_connection_token(&self) -> PortResult<ConnectionToken> {
        self.record("create_connection_token");
        Ok(ConnectionToken {
            secret: "pst_test_secret".to_string(),
        })
    }

    async fn list_locations(&self, limit: u32) -> PortResult<Vec<Location>> {
        self.record("list_locations");
        Ok(self.with(|s| s.locations.iter().take(limit as usize).cloned().collect()))
    }

    async fn create_location(&self, request: &NewLocation) -> PortResult<Location> {
        self.record("create_location");
        Ok(self.with(|s| {
            let location = Location {
                id: format!("tml_{}", s.locations.len() + 1),
                display_name: request.display_name.clone(),
                address: request.address.clone(),
            };
            s.locations.push(location.clone());
            location
        }))
    }

    async fn list_customers(&self, limit: u32) -> PortResult<Vec<Customer>> {
        self.record("list_customers");
        Ok(self.with(|s| s.customers.iter().take(limit as usize).cloned().collect()))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> PortResult<Customer> {
        self.record(format!("retrieve_customer:{customer_id}"));
        self.check_customer(customer_id)?;
        self.customer(customer_id)
            .ok_or_else(|| Self::missing("customer", customer_id))
    }

    async fn find_customer_by_email(&self, email: &str) -> PortResult<Option<Customer>> {
        self.record("find_customer_by_email");
        Ok(self.with(|s| {
            s.customers
                .iter()
                .find(|c| c.email.as_deref() == Some(email))
                .cloned()
        }))
    }

    async fn create_customer(&self, email: &str) -> PortResult<Customer> {
        self.record("create_customer");
        Ok(self.with(|s| {
            let mut created = customer(&format!("cus_{}", s.customers.len() + 1), "", Some(email));
            created.name = None;
            s.customers.push(created.clone());
            created
        }))
    }

    async fn update_customer_email(&self, customer_id: &str, email: &str) -> PortResult<Customer> {
        self.record(format!("update_customer:{customer_id}"));
        self.with(|s| {
            let customer = s
                .customers
                .iter_mut()
                .find(|c| c.id == customer_id)
                .ok_or_else(|| Self::missing("customer", customer_id))?;
            customer.email = Some(email.to_string());
            Ok(customer.clone())
        })
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> PortResult<Customer> {
        self.record(format!("update_customer:{customer_id}"));
        self.with(|s| {
            let customer = s
                .customers
                .iter_mut()
                .find(|c| c.id == customer_id)
                .ok_or_else(|| Self::missing("customer", customer_id))?;
            customer.default_payment_method = Some(payment_method_id.to_string());
            Ok(customer.clone())
        })
    }

    async fn list_customer_cards(&self, customer_id: &str) -> PortResult<Vec<PaymentMethod>> {
        self.record(format!("list_cards:{customer_id}"));
        self.check_customer(customer_id)?;
        Ok(self.with(|s| s.cards.get(customer_id).cloned().unwrap_or_default()))
    }

    async fn retrieve_payment_method(&self, payment_method_id: &str) -> PortResult<PaymentMethod> {
        self.record(format!("retrieve_payment_method:{payment_method_id}"));
        self.with(|s| s.payment_methods.get(payment_method_id).cloned())
            .ok_or_else(|| Self::missing("payment_method", payment_method_id))
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> PortResult<PaymentMethod> {
        self.record(format!("attach_payment_method:{payment_method_id}"));
        self.with(|s| {
            let pm = s
                .payment_methods
                .get_mut(payment_method_id)
                .ok_or_else(|| Self::missing("payment_method", payment_method_id))?;
            pm.customer = Some(customer_id.to_string());
            let pm = pm.clone();
            s.cards
                .entry(customer_id.to_string())
                .or_default()
                .push(pm.clone());
            Ok(pm)
        })
    }

    async fn search_charges_by_fingerprint(&self, fingerprint: &str) -> PortResult<Vec<Charge>> {
        self.record("search_charges");
        self.with(|s| {
            if !s.charge_search_supported {
                return Err(PortError::Rejected {
                    status: 400,
                    message: "Search is not supported for this field".to_string(),
                });
            }
            Ok(s.charges
                .iter()
                .filter(|c| c.fingerprint.as_deref() == Some(fingerprint))
                .cloned()
                .collect())
        })
    }

    async fn list_recent_charges(&self, limit: u32) -> PortResult<Vec<Charge>> {
        self.record("list_charges");
        Ok(self.with(|s| s.charges.iter().take(limit as usize).cloned().collect()))
    }

    async fn create_payment_intent(&self, request: &NewPaymentIntent) -> PortResult<PaymentIntent> {
        self.record("create_payment_intent");
        self.with(|s| s.intent_requests.push(request.clone()));
        let intent = self.intent(request);
        self.with(|s| s.payment_intents.insert(intent.id.clone(), intent.clone()));
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, payment_intent_id: &str) -> PortResult<PaymentIntent> {
        self.record(format!("retrieve_payment_intent:{payment_intent_id}"));
        self.with(|s| s.payment_intents.get(payment_intent_id).cloned())
            .ok_or_else(|| Self::missing("payment_intent", payment_intent_id))
    }

    async fn list_payment_intents(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> PortResult<Vec<PaymentIntent>> {
        self.record(format!("list_payment_intents:{customer_id}"));
        let mut intents: Vec<PaymentIntent> = self.with(|s| {
            s.payment_intents
                .values()
                .filter(|pi| pi.customer.as_deref() == Some(customer_id))
                .cloned()
                .collect()
        });
        intents.sort_by(|a, b| b.id.cmp(&a.id));
        intents.truncate(limit as usize);
        Ok(intents)
    }

    async fn confirm_payment_intent(
        &self,
        payment_intent_id: &str,
        payment_method_id: &str,
        _return_url: &str,
    ) -> PortResult<PaymentIntent> {
        self.record(format!("confirm_payment_intent:{payment_intent_id}"));
        let pm = self.with(|s| s.payment_methods.get(payment_method_id).cloned());
        self.update_intent(payment_intent_id, |pi| {
            pi.status = "succeeded".to_string();
            pi.payment_method = pm;
        })
    }

    async fn capture_payment_intent(&self, payment_intent_id: &str) -> PortResult<PaymentIntent> {
        self.record(format!("capture_payment_intent:{payment_intent_id}"));
        self.update_intent(payment_intent_id, |pi| pi.status = "succeeded".to_string())
    }

    async fn cancel_payment_intent(&self, payment_intent_id: &str) -> PortResult<PaymentIntent> {
        self.record(format!("cancel_payment_intent:{payment_intent_id}"));
        self.update_intent(payment_intent_id, |pi| pi.status = "canceled".to_string())
    }

    async fn assign_payment_intent_customer(
        &self,
        payment_intent_id: &str,
        customer_id: &str,
    ) -> PortResult<PaymentIntent> {
        self.record(format!("assign_customer:{payment_intent_id}"));
        self.update_intent(payment_intent_id, |pi| {
            pi.customer = Some(customer_id.to_string())
        })
    }

    async fn update_payment_intent(
        &self,
        payment_intent_id: &str,
        update: &PaymentIntentUpdate,
    ) -> PortResult<PaymentIntent> {
        self.record(format!("update_payment_intent:{payment_intent_id}"));
        let intent = self.update_intent(payment_intent_id, |_| {})?;
        if let Some(email) = &update.receipt_email {
            self.with(|s| s.receipt_emails.insert(intent.id.clone(), email.clone()));
        }
        Ok(intent)
    }

    async fn create_setup_intent(&self, request: &NewSetupIntent) -> PortResult<SetupIntent> {
        self.record("create_setup_intent");
        let id = self.with(|s| {
            s.setup_intents.push(request.clone());
            format!("seti_{}", s.setup_intents.len())
        });
        Ok(SetupIntent {
            client_secret: Some(format!("{id}_secret")),
            id,
            status: "requires_payment_method".to_string(),
            customer: request.customer.clone(),
        })
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: Option<i64>,
    ) -> PortResult<Refund> {
        self.record(format!("create_refund:{payment_intent_id}"));
        let intent = self.retrieve_payment_intent(payment_intent_id).await?;
        Ok(Refund {
            id: format!("re_{payment_intent_id}"),
            amount: amount.unwrap_or(intent.amount),
            currency: intent.currency,
            status: "succeeded".to_string(),
            payment_intent: Some(intent.id),
            charge: None,
        })
    }

    async fn create_checkout_session(
        &self,
        price_id: &str,
        _return_url: &str,
    ) -> PortResult<CheckoutSession> {
        self.record(format!("create_checkout_session:{price_id}"));
        Ok(CheckoutSession {
            id: "cs_test_1".to_string(),
            client_secret: Some("cs_test_1_secret".to_string()),
            url: None,
        })
    }

    async fn create_payment_link(&self, request: &NewPaymentLink) -> PortResult<PaymentLink> {
        self.record(format!("create_payment_link:{}", request.product_name));
        Ok(PaymentLink {
            id: "plink_1".to_string(),
            url: "https://buy.stripe.com/test_1".to_string(),
        })
    }
}

//=========================================================================================
// MemorySessions
//=========================================================================================

/// Session store without expiry; sessions can be seeded with a known id.
#[derive(Default)]
pub struct MemorySessions {
    sessions: Mutex<HashMap<SessionId, Option<String>>>,
    fail: Mutex<bool>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, id: &SessionId) {
        self.lock().insert(id.clone(), None);
    }

    /// Makes every subsequent call fail.
    pub fn break_store(&self) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Option<String>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> PortResult<()> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(PortError::Unexpected("session store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn create(&self) -> PortResult<TerminalSession> {
        self.check()?;
        let id = SessionId::generate();
        self.open(&id);
        let now = Utc::now();
        Ok(TerminalSession {
            id,
            selected_reader_id: None,
            created_at: now,
            last_accessed_at: now,
        })
    }

    async fn touch(&self, id: &SessionId) -> PortResult<bool> {
        self.check()?;
        Ok(self.lock().contains_key(id))
    }

    async fn selected_reader(&self, id: &SessionId) -> PortResult<Option<String>> {
        self.check()?;
        Ok(self.lock().get(id).cloned().flatten())
    }

    async fn set_selected_reader(
        &self,
        id: &SessionId,
        reader_id: Option<&str>,
    ) -> PortResult<()> {
        self.check()?;
        self.lock().insert(id.clone(), reader_id.map(str::to_string));
        Ok(())
    }
}
