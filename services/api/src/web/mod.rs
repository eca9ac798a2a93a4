pub mod customers;
pub mod middleware;
pub mod payments;
pub mod rest;
pub mod state;
pub mod terminal;
pub mod webhook;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::rest::api_document;
use crate::web::state::AppState;

pub use middleware::with_session;

/// Builds the complete HTTP application: every route, the session layer on
/// the session-scoped routes, request tracing and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Routes that read or write the browser session
    let session_routes = Router::new()
        .route("/api/terminal/select", post(terminal::select_terminal_handler))
        .route("/api/terminal/selected", get(terminal::selected_terminal_handler))
        .route("/api/terminal/clear", post(terminal::clear_terminal_handler))
        .route(
            "/api/terminal/collect_email",
            post(terminal::collect_email_selected_handler),
        )
        .route(
            "/api/terminal/collected_data",
            get(terminal::collected_data_selected_handler),
        )
        .route(
            "/api/terminal/cancel_collect_inputs",
            post(terminal::cancel_collect_inputs_selected_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            with_session,
        ));

    let terminal_routes = Router::new()
        .route("/api/terminal/readers", get(terminal::list_readers_handler))
        .route("/api/terminal/{id}", get(terminal::retrieve_reader_handler))
        .route("/api/terminal/{id}/cancel", post(terminal::cancel_action_handler))
        .route("/api/terminal/{id}/cannel", post(terminal::cancel_action_handler))
        .route(
            "/api/terminal/{id}/payment_intent",
            post(terminal::terminal_payment_intent_handler),
        )
        .route(
            "/api/terminal/{id}/collect_email",
            post(terminal::collect_email_handler),
        )
        .route(
            "/api/terminal/{id}/collected_data",
            get(terminal::collected_data_handler),
        )
        .route(
            "/api/terminal/{id}/cancel_collect_inputs",
            post(terminal::cancel_collect_inputs_handler),
        );

    let customer_routes = Router::new()
        .route("/api/customers", get(customers::list_customers_handler))
        .route(
            "/api/customers/candidates_by_payment_method",
            post(customers::candidates_handler),
        )
        .route("/api/customers/{id}", get(customers::customer_detail_handler))
        .route(
            "/api/customers/{id}/payment_intent",
            post(customers::customer_payment_intent_handler),
        )
        .route(
            "/api/customers/{id}/payment_intent/{pm}",
            post(customers::customer_payment_intent_with_method_handler),
        )
        .route(
            "/api/customers/{id}/payment_intents",
            get(customers::customer_payment_intents_handler),
        )
        .route(
            "/api/customers/{id}/attach_default/{pm_id}",
            post(customers::attach_default_handler),
        )
        .route(
            "/api/customers/{id}/payment_intents/{pi_id}/confirm",
            post(customers::confirm_with_default_handler),
        );

    let payment_routes = Router::new()
        .route("/token", get(payments::token_handler))
        .route("/connection_token", post(payments::connection_token_handler))
        .route("/register_reader", post(payments::register_reader_handler))
        .route("/list_locations", get(payments::list_locations_handler))
        .route("/create_location", post(payments::create_location_handler))
        .route(
            "/create_setup_intent",
            post(payments::create_setup_intent_handler),
        )
        .route(
            "/attach_payment_method_to_customer",
            post(payments::attach_payment_method_handler),
        )
        .route(
            "/update_payment_intent",
            post(payments::update_payment_intent_handler),
        )
        .route(
            "/create_payment_intent",
            post(payments::create_payment_intent_handler),
        )
        .route(
            "/capture_payment_intent",
            post(payments::capture_payment_intent_handler),
        )
        .route(
            "/cancel_payment_intent",
            post(payments::cancel_payment_intent_handler),
        )
        .route(
            "/api/payment_intents/assign_customer",
            post(payments::assign_customer_handler),
        )
        .route("/api/payment_intents/{id}", get(payments::payment_intent_handler))
        .route("/api/refunds", post(payments::refund_handler))
        .route("/api/custom_checkout", post(payments::custom_checkout_handler))
        .route("/api/payment_link", post(payments::payment_link_handler))
        .route("/webhook", post(webhook::webhook_handler));

    let api_router = Router::new()
        .merge(session_routes)
        .merge(terminal_routes)
        .merge(customer_routes)
        .merge(payment_routes)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_document()))
        .layer(TraceLayer::new_for_http())
}
