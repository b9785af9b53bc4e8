use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use taxi_dispatch::{
    AppState, auth, config::parse_offset_hours, constants::*, database, models::Role, router,
};
use time::Duration;
use tower::util::ServiceExt;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::Key};
use uuid::Uuid;

#[derive(Clone)]
pub struct TestConfig {
    pub temp_dir_path: String,
}

impl TestConfig {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let temp_dir_path = temp_dir.path().to_string_lossy().to_string();
        std::mem::forget(temp_dir);
        Ok(Self { temp_dir_path })
    }

    pub fn data_path(&self) -> String {
        self.temp_dir_path.clone()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let store = MemoryStore::default();

    let session_secret = "test_secret_key_at_least_64_chars_long_test_secret_key_at_least_64_";
    let session_key = Key::try_from(session_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;

    let session_layer = SessionManagerLayer::new(store)
        .with_secure(false)
        .with_name(SESSION_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(SESSION_EXPIRY_DAYS)))
        .with_signed(session_key);

    Ok(router::api_routes()
        .layer(session_layer)
        .with_state(state))
}

pub async fn setup_test_app() -> anyhow::Result<TestApp> {
    let test_config = TestConfig::new()?;

    let data_path = test_config.data_path();
    std::fs::create_dir_all(&data_path)?;

    let db = database::init_db(&data_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;

    let local_offset = parse_offset_hours(DEFAULT_UTC_OFFSET_HOURS).map_err(anyhow::Error::msg)?;
    let state = AppState { db, local_offset };
    let router = build_router(state.clone())?;

    Ok(TestApp { router, state })
}

async fn insert_test_user(
    state: &AppState,
    phone: &str,
    pin: &str,
    role: Role,
) -> anyhow::Result<String> {
    let pin_hash = auth::hash_pin(pin).map_err(|(_, message)| anyhow::anyhow!(message))?;
    let user_id = Uuid::new_v4().to_string();

    let conn = state.db.write().await;
    auth::insert_user(&conn, &user_id, phone, &pin_hash, role)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create test user: {}", e))?;

    Ok(user_id)
}

pub async fn create_test_admin(state: &AppState, phone: &str, pin: &str) -> anyhow::Result<String> {
    insert_test_user(state, phone, pin, Role::Admin).await
}

pub async fn create_test_operator(
    state: &AppState,
    phone: &str,
    pin: &str,
    name: &str,
) -> anyhow::Result<String> {
    let user_id = insert_test_user(state, phone, pin, Role::Operator).await?;
    let conn = state.db.write().await;
    conn.execute(
        "INSERT INTO operator_profiles (id, name, identity_card) VALUES (?, ?, ?)",
        (user_id.as_str(), name, "1234567"),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create operator profile: {}", e))?;
    Ok(user_id)
}

pub async fn create_test_driver(
    state: &AppState,
    phone: &str,
    pin: &str,
    name: &str,
) -> anyhow::Result<String> {
    let user_id = insert_test_user(state, phone, pin, Role::Driver).await?;
    let conn = state.db.write().await;
    conn.execute(
        "INSERT INTO driver_profiles (id, name, vehicle, vehicle_type, balance, is_on_duty) VALUES (?, ?, ?, ?, 0, FALSE)",
        (user_id.as_str(), name, "Toyota Corolla 1234-ABC", "auto"),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create driver profile: {}", e))?;
    Ok(user_id)
}

/// Puts a driver on duty at the given coordinates without going through HTTP.
#[allow(dead_code)]
pub async fn place_driver(state: &AppState, driver_id: &str, lat: f64, lng: f64) -> anyhow::Result<()> {
    let conn = state.db.write().await;
    conn.execute(
        "UPDATE driver_profiles SET is_on_duty = TRUE WHERE id = ?",
        [driver_id],
    )
    .await?;
    conn.execute(
        "INSERT INTO driver_locations (driver_id, lat, lng, updated_at) VALUES (?, ?, ?, 0) \
         ON CONFLICT(driver_id) DO UPDATE SET lat = excluded.lat, lng = excluded.lng",
        (driver_id, lat, lng),
    )
    .await?;
    Ok(())
}

pub async fn login_user(app: &Router, phone: &str, pin: &str) -> anyhow::Result<String> {
    let payload = serde_json::json!({
        "phone_number": phone,
        "pin": pin
    });

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    if response.status() != StatusCode::OK {
        anyhow::bail!("Login failed with status {}", response.status());
    }

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("No session cookie in response"))?;

    let cookie = set_cookie
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(cookie)
}

fn parse_body_as_json_or_string(bytes: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(bytes).to_string()),
    }
}

/// Sends a request with an optional JSON body and returns status plus body.
pub async fn json_request(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: &str,
    payload: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", cookie);
    let request = match payload {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = app.clone().oneshot(request).await.expect("execute request");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, parse_body_as_json_or_string(&bytes))
}

/// Serves the router on an ephemeral local port and returns its base URL.
#[allow(dead_code)]
pub async fn spawn_server(router: Router) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    Ok(format!("http://{}", address))
}
