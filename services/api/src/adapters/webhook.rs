//! services/api/src/adapters/webhook.rs
//!
//! Verification and decoding of Stripe webhook deliveries.
//!
//! Stripe signs `"{timestamp}.{raw body}"` with HMAC-SHA256 using the
//! endpoint secret and sends `Stripe-Signature: t=<unix>,v1=<hex>[,v1=...]`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use super::stripe_types::{WireEvent, WireReader};
use terminal_pos_core::PlatformEvent;

type HmacSha256 = Hmac<Sha256>;

/// Deliveries older (or newer) than this many seconds are refused.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Malformed signature header")]
    MalformedHeader,
    #[error("No signature matches the payload")]
    SignatureMismatch,
    #[error("Timestamp outside the tolerance window")]
    StaleTimestamp,
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Checks the signature header against the payload as of `now` (unix seconds).
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = Some(t),
                Some(("v1", sig)) => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        let issued_at: i64 = timestamp
            .parse()
            .map_err(|_| WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::SignatureMismatch)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);

        let matched = signatures.iter().any(|sig| {
            hex::decode(sig)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }

        if (now - issued_at).abs() > self.tolerance_secs {
            return Err(WebhookError::StaleTimestamp);
        }
        Ok(())
    }
}

/// Decodes a verified delivery into the events this service reacts to.
pub fn parse_event(payload: &[u8]) -> Result<PlatformEvent, WebhookError> {
    let event: WireEvent = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    match event.event_type.as_str() {
        "terminal.reader.action_succeeded" => {
            let reader: WireReader = serde_json::from_value(event.data.object)
                .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
            Ok(PlatformEvent::ReaderActionSucceeded(reader.into_domain()))
        }
        "payment_method.attached" => {
            let id = event
                .data
                .object
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| WebhookError::InvalidPayload("payment method without id".into()))?;
            Ok(PlatformEvent::PaymentMethodAttached { id: id.to_string() })
        }
        _ => Ok(PlatformEvent::Other {
            event_type: event.event_type,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, sig)
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from(SECRET.to_string()))
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign(payload, SECRET, NOW);
        assert!(verifier().verify_at(payload, &header, NOW + 10).is_ok());
    }

    #[test]
    fn any_matching_v1_is_enough() {
        let payload = br#"{"id":"evt_1"}"#;
        let good = sign(payload, SECRET, NOW);
        let sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), sig);
        assert!(verifier().verify_at(payload, &header, NOW).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign(payload, "whsec_other", NOW);
        assert!(matches!(
            verifier().verify_at(payload, &header, NOW),
            Err(WebhookError::SignatureMismatch)
        ));
    }

    #[test]
    fn modified_payload_is_rejected() {
        let header = sign(br#"{"amount":100}"#, SECRET, NOW);
        assert!(matches!(
            verifier().verify_at(br#"{"amount":999}"#, &header, NOW),
            Err(WebhookError::SignatureMismatch)
        ));
    }

    #[test]
    fn old_timestamp_is_rejected() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign(payload, SECRET, NOW - 600);
        assert!(matches!(
            verifier().verify_at(payload, &header, NOW),
            Err(WebhookError::StaleTimestamp)
        ));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let payload = b"{}";
        let no_signature = format!("t={NOW}");
        for header in ["", "v1=abcdef", "t=notanumber,v1=ab", no_signature.as_str()] {
            assert!(
                matches!(
                    verifier().verify_at(payload, header, NOW),
                    Err(WebhookError::MalformedHeader)
                ),
                "{header}"
            );
        }
    }

    #[test]
    fn reader_action_event_is_decoded() {
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "terminal.reader.action_succeeded",
            "data": { "object": {
                "id": "tmr_123",
                "device_type": "bbpos_wisepos_e",
                "status": "online",
                "action": {
                    "type": "collect_inputs",
                    "status": "succeeded",
                    "collect_inputs": {
                        "inputs": [{ "type": "email", "email": { "value": "a@example.com" } }],
                        "metadata": { "customer_id": "cus_1" }
                    }
                }
            }}
        });

        let event = parse_event(payload.to_string().as_bytes()).unwrap();
        let reader = match event {
            PlatformEvent::ReaderActionSucceeded(reader) => reader,
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(reader.id, "tmr_123");
        assert_eq!(reader.collect_inputs().unwrap().value_of("email"), Some("a@example.com"));
    }

    #[test]
    fn other_events_keep_their_type() {
        let payload = br#"{"id":"evt_2","type":"charge.succeeded","data":{"object":{}}}"#;
        assert!(matches!(
            parse_event(payload).unwrap(),
            PlatformEvent::Other { ref event_type } if event_type == "charge.succeeded"
        ));

        let attached =
            br#"{"id":"evt_3","type":"payment_method.attached","data":{"object":{"id":"pm_1"}}}"#;
        assert!(matches!(
            parse_event(attached).unwrap(),
            PlatformEvent::PaymentMethodAttached { ref id } if id == "pm_1"
        ));
    }

    #[test]
    fn garbage_payload_is_rejected() {
        assert!(matches!(
            parse_event(b"not json"),
            Err(WebhookError::InvalidPayload(_))
        ));
    }
}
