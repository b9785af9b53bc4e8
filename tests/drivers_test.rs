mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::json_request;

async fn admin_cookie(app: &common::TestApp) -> String {
    common::create_test_admin(&app.state, "70100000", "0000")
        .await
        .expect("create admin");
    common::login_user(&app.router, "70100000", "0000")
        .await
        .expect("login admin")
}

#[tokio::test]
async fn test_admin_creates_and_updates_driver() {
    let app = common::setup_test_app().await.expect("setup failed");
    let admin = admin_cookie(&app).await;

    let (status, created) = json_request(
        &app.router,
        "POST",
        "/drivers",
        &admin,
        Some(json!({
            "phone_number": "70100001",
            "pin": "1234",
            "name": "Carlos",
            "vehicle": "Nissan Sentra 555-XYZ",
            "vehicle_type": "auto"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["balance"], 0.0);
    assert_eq!(created["is_on_duty"], false);
    assert_eq!(created["active"], true);
    let driver_id = created["id"].as_str().expect("driver id").to_string();

    let (status, updated) = json_request(
        &app.router,
        "PUT",
        &format!("/drivers/{}", driver_id),
        &admin,
        Some(json!({ "vehicle_type": "moto", "pin": "5678" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["vehicle_type"], "moto");
    assert_eq!(updated["name"], "Carlos");

    // The new PIN replaces the old one.
    assert!(common::login_user(&app.router, "70100001", "1234").await.is_err());
    common::login_user(&app.router, "70100001", "5678")
        .await
        .expect("login with new PIN");

    let (status, listed) = json_request(&app.router, "GET", "/drivers", &admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().expect("drivers array").len(), 1);

    let (status, fetched) = json_request(
        &app.router,
        "GET",
        &format!("/drivers/{}", driver_id),
        &admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["phone_number"], "70100001");
}

#[tokio::test]
async fn test_driver_phone_number_must_be_unique() {
    let app = common::setup_test_app().await.expect("setup failed");
    let admin = admin_cookie(&app).await;
    let other_id = common::create_test_driver(&app.state, "70100002", "1234", "Raul")
        .await
        .expect("create driver");

    let payload = json!({
        "phone_number": "70100002",
        "pin": "1234",
        "name": "Duplicado",
        "vehicle": "Suzuki",
        "vehicle_type": "auto"
    });
    let (status, _) = json_request(&app.router, "POST", "/drivers", &admin, Some(payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let second = common::create_test_driver(&app.state, "70100003", "1234", "Ines")
        .await
        .expect("create driver");
    let (status, _) = json_request(
        &app.router,
        "PUT",
        &format!("/drivers/{}", second),
        &admin,
        Some(json!({ "phone_number": "70100002" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Keeping one's own number is not a conflict.
    let (status, _) = json_request(
        &app.router,
        "PUT",
        &format!("/drivers/{}", other_id),
        &admin,
        Some(json!({ "phone_number": "70100002" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_driver_validates_input() {
    let app = common::setup_test_app().await.expect("setup failed");
    let admin = admin_cookie(&app).await;

    for payload in [
        json!({ "phone_number": "12", "pin": "1234", "name": "A", "vehicle": "B", "vehicle_type": "auto" }),
        json!({ "phone_number": "70100004", "pin": "12ab", "name": "A", "vehicle": "B", "vehicle_type": "auto" }),
        json!({ "phone_number": "70100004", "pin": "1234", "name": "  ", "vehicle": "B", "vehicle_type": "auto" }),
    ] {
        let (status, _) = json_request(&app.router, "POST", "/drivers", &admin, Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = json_request(
        &app.router,
        "PUT",
        "/drivers/missing",
        &admin,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_driver_without_history() {
    let app = common::setup_test_app().await.expect("setup failed");
    let admin = admin_cookie(&app).await;
    let fresh = common::create_test_driver(&app.state, "70100005", "1234", "Nuevo")
        .await
        .expect("create driver");
    let funded = common::create_test_driver(&app.state, "70100006", "1234", "Con saldo")
        .await
        .expect("create driver");

    let (status, _) = json_request(
        &app.router,
        "POST",
        &format!("/drivers/{}/balance/recharge", funded),
        &admin,
        Some(json!({ "amount": 50.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = json_request(
        &app.router,
        "DELETE",
        &format!("/drivers/{}", funded),
        &admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = json_request(
        &app.router,
        "DELETE",
        &format!("/drivers/{}", fresh),
        &admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = json_request(
        &app.router,
        "GET",
        &format!("/drivers/{}", fresh),
        &admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duty_toggle_round_trip() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_driver(&app.state, "70100007", "1234", "Jorge")
        .await
        .expect("create driver");
    let driver = common::login_user(&app.router, "70100007", "1234")
        .await
        .expect("login driver");

    let (status, profile) = json_request(
        &app.router,
        "PUT",
        "/drivers/me/duty",
        &driver,
        Some(json!({ "is_on_duty": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["is_on_duty"], true);

    let (status, profile) = json_request(&app.router, "GET", "/drivers/me", &driver, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["is_on_duty"], true);

    let (status, profile) = json_request(
        &app.router,
        "PUT",
        "/drivers/me/duty",
        &driver,
        Some(json!({ "is_on_duty": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["is_on_duty"], false);
}

#[tokio::test]
async fn test_location_updates_require_duty() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_operator(&app.state, "70100008", "1234", "Operadora")
        .await
        .expect("create operator");
    common::create_test_driver(&app.state, "70100009", "1234", "Hugo")
        .await
        .expect("create driver");
    let operator = common::login_user(&app.router, "70100008", "1234")
        .await
        .expect("login operator");
    let driver = common::login_user(&app.router, "70100009", "1234")
        .await
        .expect("login driver");

    let location = json!({ "lat": -17.7833, "lng": -63.1821 });
    let (status, _) = json_request(
        &app.router,
        "POST",
        "/drivers/me/location",
        &driver,
        Some(location.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    json_request(
        &app.router,
        "PUT",
        "/drivers/me/duty",
        &driver,
        Some(json!({ "is_on_duty": true })),
    )
    .await;
    let (status, _) = json_request(
        &app.router,
        "POST",
        "/drivers/me/location",
        &driver,
        Some(location),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = json_request(
        &app.router,
        "POST",
        "/drivers/me/location",
        &driver,
        Some(json!({ "lat": 123.0, "lng": 0.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, map) = json_request(&app.router, "GET", "/map/drivers", &operator, None).await;
    assert_eq!(status, StatusCode::OK);
    let map = map.as_array().expect("locations array");
    assert_eq!(map.len(), 1);
    assert_eq!(map[0]["name"], "Hugo");
    assert_eq!(map[0]["lat"], -17.7833);

    // Going off duty removes the driver from the map.
    json_request(
        &app.router,
        "PUT",
        "/drivers/me/duty",
        &driver,
        Some(json!({ "is_on_duty": false })),
    )
    .await;
    let (_, map) = json_request(&app.router, "GET", "/map/drivers", &operator, None).await;
    assert!(map.as_array().expect("locations array").is_empty());
}

#[tokio::test]
async fn test_deactivation_takes_driver_off_duty() {
    let app = common::setup_test_app().await.expect("setup failed");
    let admin = admin_cookie(&app).await;
    let driver_id = common::create_test_driver(&app.state, "70100010", "1234", "Oscar")
        .await
        .expect("create driver");
    common::place_driver(&app.state, &driver_id, -17.78, -63.18)
        .await
        .expect("place driver");

    let (status, profile) = json_request(
        &app.router,
        "PUT",
        &format!("/drivers/{}/active", driver_id),
        &admin,
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["active"], false);
    assert_eq!(profile["is_on_duty"], false);

    let (status, profile) = json_request(
        &app.router,
        "PUT",
        &format!("/drivers/{}/active", driver_id),
        &admin,
        Some(json!({ "active": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["active"], true);
    common::login_user(&app.router, "70100010", "1234")
        .await
        .expect("reactivated driver logs in");
}
