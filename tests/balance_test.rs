mod common;

use axum::http::StatusCode;
use serde_json::json;
use time::OffsetDateTime;

use common::json_request;
use taxi_dispatch::utils::{now_unix, start_of_local_day};

async fn setup_admin_and_driver(app: &common::TestApp) -> (String, String, String) {
    common::create_test_admin(&app.state, "70400000", "0000")
        .await
        .expect("create admin");
    let driver_id = common::create_test_driver(&app.state, "70400001", "1234", "Saldo")
        .await
        .expect("create driver");
    let admin = common::login_user(&app.router, "70400000", "0000")
        .await
        .expect("login admin");
    let driver = common::login_user(&app.router, "70400001", "1234")
        .await
        .expect("login driver");
    (admin, driver_id, driver)
}

#[tokio::test]
async fn test_recharge_and_deduct_balance() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (admin, driver_id, driver) = setup_admin_and_driver(&app).await;

    let (status, recharged) = json_request(
        &app.router,
        "POST",
        &format!("/drivers/{}/balance/recharge", driver_id),
        &admin,
        Some(json!({ "amount": 100.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(recharged["balance"], 100.0);
    assert_eq!(recharged["entry"]["type"], "recarga");
    assert_eq!(recharged["entry"]["description"], "Recarga de saldo");

    let (status, deducted) = json_request(
        &app.router,
        "POST",
        &format!("/drivers/{}/balance/deduct", driver_id),
        &admin,
        Some(json!({ "amount": 30.25, "description": "Multa por retraso" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(deducted["balance"], 69.75);
    assert_eq!(deducted["entry"]["amount"], -30.25);
    assert_eq!(deducted["entry"]["type"], "descuento");

    let (status, history) = json_request(
        &app.router,
        "GET",
        "/drivers/me/balance-history",
        &driver,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["balance"], 69.75);
    assert_eq!(history["entries"].as_array().expect("entries").len(), 2);

    let (status, admin_view) = json_request(
        &app.router,
        "GET",
        &format!("/drivers/{}/balance-history", driver_id),
        &admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(admin_view["entries"], history["entries"]);
}

#[tokio::test]
async fn test_balance_adjustments_are_validated() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (admin, driver_id, driver) = setup_admin_and_driver(&app).await;

    let (status, _) = json_request(
        &app.router,
        "POST",
        &format!("/drivers/{}/balance/deduct", driver_id),
        &admin,
        Some(json!({ "amount": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for amount in [0.0, -5.0] {
        let (status, _) = json_request(
            &app.router,
            "POST",
            &format!("/drivers/{}/balance/recharge", driver_id),
            &admin,
            Some(json!({ "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = json_request(
        &app.router,
        "POST",
        "/drivers/unknown/balance/recharge",
        &admin,
        Some(json!({ "amount": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = json_request(
        &app.router,
        "POST",
        &format!("/drivers/{}/balance/recharge", driver_id),
        &driver,
        Some(json!({ "amount": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_balance_adjustments_round_to_cents() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (admin, driver_id, driver) = setup_admin_and_driver(&app).await;

    for amount in [0.001, 0.004] {
        let (status, _) = json_request(
            &app.router,
            "POST",
            &format!("/drivers/{}/balance/recharge", driver_id),
            &admin,
            Some(json!({ "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {}", amount);
    }

    let (status, _) = json_request(
        &app.router,
        "POST",
        &format!("/drivers/{}/balance/recharge", driver_id),
        &admin,
        Some(json!({ "amount": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // 10.004 is stored as 10.00, which the balance covers exactly.
    let (status, deducted) = json_request(
        &app.router,
        "POST",
        &format!("/drivers/{}/balance/deduct", driver_id),
        &admin,
        Some(json!({ "amount": 10.004 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(deducted["entry"]["amount"], -10.0);
    assert_eq!(deducted["balance"], 0.0);

    let (_, history) = json_request(
        &app.router,
        "GET",
        "/drivers/me/balance-history",
        &driver,
        None,
    )
    .await;
    let entries = history["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry["amount"] != 0.0));
}

#[tokio::test]
async fn test_today_period_excludes_older_entries() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (admin, driver_id, driver) = setup_admin_and_driver(&app).await;

    let midnight = start_of_local_day(OffsetDateTime::now_utc(), app.state.local_offset);
    {
        let conn = app.state.db.write().await;
        for (id, created_at) in [("old-1", midnight - 1), ("old-2", now_unix() - 3 * 86_400)] {
            conn.execute(
                "INSERT INTO balance_history (id, driver_id, amount, type, description, created_at) VALUES (?, ?, 5.0, 'recarga', 'Recarga anterior', ?)",
                (id, driver_id.as_str(), created_at),
            )
            .await
            .expect("insert old entry");
        }
    }

    json_request(
        &app.router,
        "POST",
        &format!("/drivers/{}/balance/recharge", driver_id),
        &admin,
        Some(json!({ "amount": 20.0 })),
    )
    .await;

    let (status, today) = json_request(
        &app.router,
        "GET",
        "/drivers/me/balance-history?period=today",
        &driver,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = today["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["amount"], 20.0);
    assert!(entries[0]["created_at"].as_i64().expect("created_at") >= midnight);

    let (status, all) = json_request(
        &app.router,
        "GET",
        "/drivers/me/balance-history?period=all",
        &driver,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["entries"].as_array().expect("entries").len(), 3);

    let (status, _) = json_request(
        &app.router,
        "GET",
        "/drivers/me/balance-history?period=week",
        &driver,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_summary_aggregates_fleet() {
    let app = common::setup_test_app().await.expect("setup failed");
    let (admin, driver_id, driver) = setup_admin_and_driver(&app).await;
    common::create_test_operator(&app.state, "70400002", "1234", "Central")
        .await
        .expect("create operator");
    let operator = common::login_user(&app.router, "70400002", "1234")
        .await
        .expect("login operator");
    common::place_driver(&app.state, &driver_id, -17.78, -63.18)
        .await
        .expect("place driver");

    json_request(
        &app.router,
        "POST",
        &format!("/drivers/{}/balance/recharge", driver_id),
        &admin,
        Some(json!({ "amount": 50.0 })),
    )
    .await;

    let trip = json!({
        "origin": "Equipetrol",
        "destination": "Centro",
        "price": 40.0,
        "origin_lat": -17.78,
        "origin_lng": -63.18
    });
    let (_, first) = json_request(&app.router, "POST", "/trips", &operator, Some(trip.clone())).await;
    let (_, second) = json_request(&app.router, "POST", "/trips", &operator, Some(trip)).await;

    let (_, pending) =
        json_request(&app.router, "GET", "/trips/requests/pending", &driver, None).await;
    let first_request = pending
        .as_array()
        .expect("pending array")
        .iter()
        .find(|request| request["trip_id"] == first["trip"]["id"])
        .expect("offer for first trip")["id"]
        .as_str()
        .expect("request id")
        .to_string();
    let first_id = first["trip"]["id"].as_str().expect("trip id");
    json_request(
        &app.router,
        "POST",
        &format!("/trips/requests/{}/accept", first_request),
        &driver,
        None,
    )
    .await;
    for action in ["start", "complete"] {
        let (status, _) = json_request(
            &app.router,
            "POST",
            &format!("/trips/{}/{}", first_id, action),
            &driver,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    json_request(
        &app.router,
        "POST",
        &format!("/trips/{}/cancel", second["trip"]["id"].as_str().expect("trip id")),
        &operator,
        None,
    )
    .await;

    let (status, summary) = json_request(&app.router, "GET", "/reports/summary", &admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["trips_by_status"]["completed"], 1);
    assert_eq!(summary["trips_by_status"]["cancelled"], 1);
    assert_eq!(summary["completed_revenue"], 40.0);
    assert_eq!(summary["total_commission"], 4.0);
    assert_eq!(summary["total_driver_balance"], 46.0);
    assert_eq!(summary["active_drivers"], 1);
    assert_eq!(summary["drivers_on_duty"], 1);

    let (_, earnings) = json_request(
        &app.router,
        "GET",
        "/drivers/me/earnings?period=today",
        &driver,
        None,
    )
    .await;
    assert_eq!(earnings["trips"].as_array().expect("trips").len(), 1);
    assert_eq!(earnings["total_net"], 36.0);
}
