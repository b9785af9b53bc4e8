use axum::{
    Router,
    routing::{get, post, put},
};

use crate::{AppState, auth, balance, drivers, navigation, operators, trips};

/// All API routes. Session and CORS layers are added by the caller.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/navigation", get(navigation::get_navigation))
        .route(
            "/drivers",
            post(drivers::create_driver).get(drivers::list_drivers),
        )
        .route("/drivers/me", get(drivers::get_my_profile))
        .route("/drivers/me/duty", put(drivers::set_duty))
        .route("/drivers/me/location", post(drivers::update_location))
        .route(
            "/drivers/me/balance-history",
            get(balance::my_balance_history),
        )
        .route("/drivers/me/earnings", get(balance::my_earnings))
        .route(
            "/drivers/{id}",
            get(drivers::get_driver)
                .put(drivers::update_driver)
                .delete(drivers::delete_driver),
        )
        .route("/drivers/{id}/active", put(drivers::set_driver_active))
        .route(
            "/drivers/{id}/balance/recharge",
            post(balance::recharge_balance),
        )
        .route("/drivers/{id}/balance/deduct", post(balance::deduct_balance))
        .route(
            "/drivers/{id}/balance-history",
            get(balance::driver_balance_history),
        )
        .route(
            "/operators",
            post(operators::create_operator).get(operators::list_operators),
        )
        .route(
            "/operators/{id}",
            get(operators::get_operator)
                .put(operators::update_operator)
                .delete(operators::delete_operator),
        )
        .route("/operators/{id}/active", put(operators::set_operator_active))
        .route("/map/drivers", get(drivers::list_driver_locations))
        .route("/trips", post(trips::create_trip).get(trips::list_trips))
        .route("/trips/requests/pending", get(trips::pending_requests))
        .route(
            "/trips/requests/{id}/accept",
            post(trips::accept_request),
        )
        .route(
            "/trips/requests/{id}/reject",
            post(trips::reject_request),
        )
        .route("/trips/{id}", get(trips::get_trip))
        .route("/trips/{id}/start", post(trips::start_trip))
        .route("/trips/{id}/complete", post(trips::complete_trip))
        .route("/trips/{id}/cancel", post(trips::cancel_trip))
        .route("/reports/summary", get(balance::report_summary))
}
