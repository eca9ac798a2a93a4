//! services/api/src/web/middleware.rs
//!
//! Browser session middleware for the session-scoped routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::ApiError;
use crate::web::state::AppState;
use terminal_pos_core::{PosError, SessionId};

pub const SESSION_COOKIE: &str = "pos_session";

/// Middleware that resolves the session cookie to a live server-side session.
///
/// A missing, unknown, or expired cookie gets a brand-new session and a
/// `Set-Cookie` on the response. The `SessionId` is inserted into request
/// extensions for handlers to use.
pub async fn with_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the session id from the cookie header, if any
    let presented = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_from_cookie_header);

    // 2. Confirm it with the store, or open a fresh session
    let known = match &presented {
        Some(id) => state.sessions.touch(id).await.map_err(session_error)?,
        None => false,
    };
    let (session_id, fresh) = match presented {
        Some(id) if known => (id, false),
        _ => {
            let session = state.sessions.create().await.map_err(session_error)?;
            debug!("Opened session {}", session.id);
            (session.id, true)
        }
    };

    // 3. Insert the session id into request extensions
    req.extensions_mut().insert(session_id.clone());

    // 4. Continue to the handler, attaching the cookie for new sessions
    let mut response = next.run(req).await;
    if fresh {
        match HeaderValue::from_str(&session_cookie(&session_id, &state.config)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Failed to build session cookie: {:?}", e),
        }
    }
    Ok(response)
}

fn session_from_cookie_header(cookie_header: &str) -> Option<SessionId> {
    cookie_header
        .split(';')
        .find_map(|c| {
            let c = c.trim();
            c.strip_prefix(SESSION_COOKIE)?.strip_prefix('=')
        })
        .filter(|id| !id.is_empty())
        .map(SessionId::new)
}

pub fn session_cookie(id: &SessionId, config: &Config) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        id,
        config.session_ttl.as_secs()
    );
    if config.session_cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn session_error(e: terminal_pos_core::PortError) -> ApiError {
    PosError::Session(e.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_is_found_among_other_cookies() {
        let id = session_from_cookie_header("theme=dark; pos_session=abc-123; other=1").unwrap();
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn similar_cookie_names_are_ignored() {
        assert!(session_from_cookie_header("pos_session_old=abc").is_none());
        assert!(session_from_cookie_header("pos_session=").is_none());
        assert!(session_from_cookie_header("session=abc").is_none());
    }
}
