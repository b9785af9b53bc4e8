mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::json_request;

#[tokio::test]
async fn test_login_returns_session_user_with_role() {
    let app = common::setup_test_app().await.expect("setup failed");
    let driver_id = common::create_test_driver(&app.state, "70000001", "1234", "Juan")
        .await
        .expect("create driver");

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/auth/login",
        "",
        Some(json!({ "phone_number": "70000001", "pin": "1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], driver_id);
    assert_eq!(body["role"], "chofer");

    let cookie = common::login_user(&app.router, "70000001", "1234")
        .await
        .expect("login driver");
    let (status, me) = json_request(&app.router, "GET", "/auth/me", &cookie, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["phone_number"], "70000001");
}

#[tokio::test]
async fn test_login_rejects_wrong_pin_and_unknown_phone() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_operator(&app.state, "70000002", "4321", "Ana")
        .await
        .expect("create operator");

    let (status, _) = json_request(
        &app.router,
        "POST",
        "/auth/login",
        "",
        Some(json!({ "phone_number": "70000002", "pin": "9999" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = json_request(
        &app.router,
        "POST",
        "/auth/login",
        "",
        Some(json!({ "phone_number": "79999999", "pin": "4321" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = json_request(
        &app.router,
        "POST",
        "/auth/login",
        "",
        Some(json!({ "phone_number": "", "pin": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inactive_account_cannot_log_in() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_admin(&app.state, "70000000", "0000")
        .await
        .expect("create admin");
    let driver_id = common::create_test_driver(&app.state, "70000003", "1234", "Pedro")
        .await
        .expect("create driver");

    let admin = common::login_user(&app.router, "70000000", "0000")
        .await
        .expect("login admin");
    let (status, body) = json_request(
        &app.router,
        "PUT",
        &format!("/drivers/{}/active", driver_id),
        &admin,
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/auth/login",
        "",
        Some(json!({ "phone_number": "70000003", "pin": "1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.as_str().unwrap_or_default().contains("inactive"));
}

#[tokio::test]
async fn test_deactivation_ends_existing_sessions() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_admin(&app.state, "70000020", "0000")
        .await
        .expect("create admin");
    let operator_id = common::create_test_operator(&app.state, "70000021", "1234", "Carla")
        .await
        .expect("create operator");
    let driver_id = common::create_test_driver(&app.state, "70000022", "1234", "Hugo")
        .await
        .expect("create driver");

    let admin = common::login_user(&app.router, "70000020", "0000")
        .await
        .expect("login admin");
    let operator = common::login_user(&app.router, "70000021", "1234")
        .await
        .expect("login operator");
    let driver = common::login_user(&app.router, "70000022", "1234")
        .await
        .expect("login driver");

    for uri in [
        format!("/operators/{}/active", operator_id),
        format!("/drivers/{}/active", driver_id),
    ] {
        let (status, _) = json_request(
            &app.router,
            "PUT",
            &uri,
            &admin,
            Some(json!({ "active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
    }

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/trips",
        &operator,
        Some(json!({
            "origin": "Plaza",
            "destination": "Terminal",
            "price": 20.0,
            "origin_lat": -17.78,
            "origin_lng": -63.18
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.as_str().unwrap_or_default().contains("inactive"));

    let (status, _) = json_request(
        &app.router,
        "PUT",
        "/drivers/me/duty",
        &driver,
        Some(json!({ "is_on_duty": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The rejected request flushed the session.
    let (status, _) = json_request(
        &app.router,
        "POST",
        "/drivers/me/location",
        &driver,
        Some(json!({ "lat": -17.78, "lng": -63.18 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, profile) = json_request(
        &app.router,
        "GET",
        &format!("/drivers/{}", driver_id),
        &admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["is_on_duty"], false);

    // Reactivation does not revive the old session.
    let (status, _) = json_request(
        &app.router,
        "PUT",
        &format!("/operators/{}/active", operator_id),
        &admin,
        Some(json!({ "active": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = json_request(&app.router, "GET", "/auth/me", &operator, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let operator = common::login_user(&app.router, "70000021", "1234")
        .await
        .expect("login operator again");
    let (status, _) = json_request(&app.router, "GET", "/auth/me", &operator, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_requests_without_session_are_unauthorized() {
    let app = common::setup_test_app().await.expect("setup failed");

    for (method, uri) in [
        ("GET", "/auth/me"),
        ("GET", "/navigation"),
        ("GET", "/drivers/me"),
        ("GET", "/trips"),
        ("GET", "/trips/requests/pending"),
        ("GET", "/reports/summary"),
    ] {
        let (status, _) = json_request(&app.router, method, uri, "", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
    }
}

#[tokio::test]
async fn test_logout_clears_session() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_driver(&app.state, "70000004", "1234", "Luis")
        .await
        .expect("create driver");
    let cookie = common::login_user(&app.router, "70000004", "1234")
        .await
        .expect("login driver");

    let (status, _) = json_request(&app.router, "POST", "/auth/logout", &cookie, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = json_request(&app.router, "GET", "/auth/me", &cookie, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_gates_reject_other_roles() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_driver(&app.state, "70000005", "1234", "Mario")
        .await
        .expect("create driver");
    common::create_test_operator(&app.state, "70000006", "1234", "Rosa")
        .await
        .expect("create operator");

    let driver = common::login_user(&app.router, "70000005", "1234")
        .await
        .expect("login driver");
    let operator = common::login_user(&app.router, "70000006", "1234")
        .await
        .expect("login operator");

    let (status, _) = json_request(&app.router, "GET", "/drivers", &driver, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = json_request(&app.router, "GET", "/reports/summary", &operator, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = json_request(&app.router, "GET", "/drivers/me", &operator, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = json_request(
        &app.router,
        "POST",
        "/trips",
        &driver,
        Some(json!({
            "origin": "Plaza",
            "destination": "Terminal",
            "price": 20.0,
            "origin_lat": -17.78,
            "origin_lng": -63.18
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_navigation_tabs_follow_role() {
    let app = common::setup_test_app().await.expect("setup failed");
    common::create_test_admin(&app.state, "70000010", "0000")
        .await
        .expect("create admin");
    common::create_test_operator(&app.state, "70000011", "1111", "Operadora")
        .await
        .expect("create operator");
    common::create_test_driver(&app.state, "70000012", "2222", "Chofer")
        .await
        .expect("create driver");

    let cases = [
        ("70000010", "0000", "admin", vec!["mapa", "choferes", "operadores", "reportes"]),
        ("70000011", "1111", "operador", vec!["mapa", "nuevo_viaje", "viajes"]),
        ("70000012", "2222", "chofer", vec!["inicio", "solicitudes", "viajes", "saldo"]),
    ];

    for (phone, pin, role, tabs) in cases {
        let cookie = common::login_user(&app.router, phone, pin)
            .await
            .expect("login");
        let (status, body) = json_request(&app.router, "GET", "/navigation", &cookie, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], role);
        let actual: Vec<&str> = body["tabs"]
            .as_array()
            .expect("tabs array")
            .iter()
            .filter_map(|tab| tab.as_str())
            .collect();
        assert_eq!(actual, tabs, "tabs for {}", role);
    }
}

#[tokio::test]
async fn test_ensure_admin_seeds_once() {
    let app = common::setup_test_app().await.expect("setup failed");

    let created = taxi_dispatch::auth::ensure_admin(&app.state.db, "70000020", "2468")
        .await
        .expect("seed admin");
    assert!(created);
    let created_again = taxi_dispatch::auth::ensure_admin(&app.state.db, "70000021", "1357")
        .await
        .expect("second seed");
    assert!(!created_again);

    let cookie = common::login_user(&app.router, "70000020", "2468")
        .await
        .expect("login seeded admin");
    let (status, body) = json_request(&app.router, "GET", "/auth/me", &cookie, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");
}
