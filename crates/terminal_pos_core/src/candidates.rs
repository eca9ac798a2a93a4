//! crates/terminal_pos_core/src/candidates.rs
//!
//! Best-effort search for customers who have used a given physical card.
//!
//! No index is kept: each call rescans a bounded window of recent charges and
//! recent customers' stored cards. Lookup failures on individual items are
//! logged and skipped; only missing or unresolvable input fails the call.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{CandidateCustomer, Charge, Customer};
use crate::error::{PosError, PosResult};
use crate::ports::PaymentPlatform;

/// Upper bound of the platform's list endpoints.
pub const MAX_WINDOW: u32 = 100;

const CARD_SCAN_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct CandidateQuery {
    pub fingerprint: Option<String>,
    pub payment_method: Option<String>,
    pub exclude_customer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub fingerprint: String,
    pub candidates: Vec<CandidateCustomer>,
}

#[derive(Clone)]
pub struct CandidateSearch {
    platform: Arc<dyn PaymentPlatform>,
    charge_window: u32,
    customer_window: u32,
}

impl CandidateSearch {
    pub fn new(platform: Arc<dyn PaymentPlatform>) -> Self {
        Self {
            platform,
            charge_window: MAX_WINDOW,
            customer_window: MAX_WINDOW,
        }
    }

    /// Sets how many recent charges and recent customers each search scans.
    pub fn with_windows(mut self, charge_window: u32, customer_window: u32) -> Self {
        self.charge_window = charge_window.clamp(1, MAX_WINDOW);
        self.customer_window = customer_window.clamp(1, MAX_WINDOW);
        self
    }

    pub async fn search(&self, query: &CandidateQuery) -> PosResult<CandidateReport> {
        let fingerprint = self.resolve_fingerprint(query).await?;
        let exclude = query.exclude_customer_id.as_deref().filter(|id| !id.is_empty());

        let mut order: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut known: HashMap<String, Customer> = HashMap::new();

        for id in self.customers_from_charges(&fingerprint).await {
            if seen.insert(id.clone()) {
                order.push(id);
            }
        }
        for customer in self.customers_from_cards(&fingerprint).await {
            if seen.insert(customer.id.clone()) {
                order.push(customer.id.clone());
            }
            known.insert(customer.id.clone(), customer);
        }

        let mut candidates = Vec::new();
        for id in order.into_iter().filter(|id| Some(id.as_str()) != exclude) {
            if let Some(customer) = known.get(&id) {
                candidates.push(CandidateCustomer::from(customer));
                continue;
            }
            match self.platform.retrieve_customer(&id).await {
                Ok(customer) => candidates.push(CandidateCustomer::from(&customer)),
                Err(e) => warn!("Skipping candidate {}: {}", id, e),
            }
        }

        info!(
            "Found {} candidate customers for fingerprint {}",
            candidates.len(),
            fingerprint
        );
        Ok(CandidateReport {
            fingerprint,
            candidates,
        })
    }

    /// An explicit fingerprint wins; otherwise it is read off the payment method.
    async fn resolve_fingerprint(&self, query: &CandidateQuery) -> PosResult<String> {
        if let Some(fp) = non_empty(&query.fingerprint) {
            return Ok(fp.to_string());
        }
        let Some(pm_id) = non_empty(&query.payment_method) else {
            return Err(PosError::Validation(
                "payment_method or fingerprint is required".to_string(),
            ));
        };

        let pm = self.platform.retrieve_payment_method(pm_id).await?;
        pm.fingerprint().map(str::to_string).ok_or_else(|| {
            PosError::Validation(format!("Payment method {pm_id} has no card fingerprint"))
        })
    }

    /// Customer ids on charges made with the card: platform search first,
    /// then a client-side filter over the recent-charges window.
    async fn customers_from_charges(&self, fingerprint: &str) -> Vec<String> {
        let charges = match self.platform.search_charges_by_fingerprint(fingerprint).await {
            Ok(found) if !found.is_empty() => found,
            Ok(_) => self.recent_matching_charges(fingerprint).await,
            Err(e) => {
                warn!("Charge search unavailable, scanning recent charges: {}", e);
                self.recent_matching_charges(fingerprint).await
            }
        };
        charges.into_iter().filter_map(|c| c.customer).collect()
    }

    async fn recent_matching_charges(&self, fingerprint: &str) -> Vec<Charge> {
        match self.platform.list_recent_charges(self.charge_window).await {
            Ok(charges) => charges
                .into_iter()
                .filter(|c| c.fingerprint.as_deref() == Some(fingerprint))
                .collect(),
            Err(e) => {
                warn!("Listing recent charges failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Recent customers with a stored card carrying the fingerprint.
    async fn customers_from_cards(&self, fingerprint: &str) -> Vec<Customer> {
        let customers = match self.platform.list_customers(self.customer_window).await {
            Ok(customers) => customers,
            Err(e) => {
                warn!("Listing recent customers failed: {}", e);
                return Vec::new();
            }
        };

        let platform = &self.platform;
        stream::iter(customers)
            .map(|customer| async move {
                match platform.list_customer_cards(&customer.id).await {
                    Ok(cards) if cards.iter().any(|pm| pm.fingerprint() == Some(fingerprint)) => {
                        Some(customer)
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Skipping cards of {}: {}", customer.id, e);
                        None
                    }
                }
            })
            .buffered(CARD_SCAN_CONCURRENCY)
            .filter_map(|found| async move { found })
            .collect()
            .await
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
