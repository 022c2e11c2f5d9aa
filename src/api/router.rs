use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::{handlers, middleware::admin_auth};
use crate::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    // Subscriber routes (admin token)
    let subscriber_routes = Router::new()
        .route("/", post(handlers::subscribers::subscribe))
        .route(
            "/:recipient_id",
            get(handlers::subscribers::get_subscription)
                .delete(handlers::subscribers::unsubscribe),
        )
        .route(
            "/:recipient_id/devices",
            get(handlers::subscribers::get_devices),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .nest("/subscribers", subscriber_routes)
        .with_state(state)
}
