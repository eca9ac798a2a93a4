pub mod session_store;
pub mod stripe;
pub mod stripe_types;
pub mod webhook;

pub use session_store::InMemorySessionStore;
pub use stripe::StripeAdapter;
pub use webhook::{parse_event, WebhookError, WebhookVerifier};
