use axum::{Router, routing::{get, post}};
use std::sync::Arc;
use tower_http::cors::{CorsLayer, AllowOrigin};
use axum::http::Method;
use crate::AppState;
use crate::api::{handlers, handlers_face};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(vec![Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(vec![axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/identities/resolve", post(handlers::resolve_identities))
        .route("/identities/recluster", post(handlers::recluster))
        // More specific routes must come before less specific ones
        .route("/persons/merge", post(handlers_face::merge_persons))
        .route("/persons", get(handlers_face::list_persons))
        .route(
            "/persons/:id",
            get(handlers_face::get_person)
                .post(handlers_face::rename_person)
                .delete(handlers_face::delete_person),
        )
        .route("/faces/:id", get(handlers_face::get_face))
        .route("/faces/:id/label", post(handlers_face::label_face))
        .route("/faces/:id/hide", post(handlers_face::hide_face))
        .route("/faces/:id/unhide", post(handlers_face::unhide_face))
        .route("/faces/:id/confirm", post(handlers_face::confirm_face))
        .route("/faces/:id/reject", post(handlers_face::reject_face))
        .layer(cors)
        .with_state(state)
}
