use anyhow::Result;
use libsql::{Builder, Connection};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            TEXT    PRIMARY KEY,
    phone_number  TEXT    UNIQUE NOT NULL,
    pin_hash      TEXT    NOT NULL,
    role          TEXT    NOT NULL CHECK (role IN ('admin', 'operador', 'chofer')),
    active        BOOLEAN NOT NULL DEFAULT TRUE,
    created_at    INTEGER NOT NULL
);
"#;

const CREATE_DRIVER_PROFILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS driver_profiles (
    id            TEXT    PRIMARY KEY,
    name          TEXT    NOT NULL,
    vehicle       TEXT    NOT NULL,
    vehicle_type  TEXT    NOT NULL,
    balance       REAL    NOT NULL DEFAULT 0,
    is_on_duty    BOOLEAN NOT NULL DEFAULT FALSE,
    FOREIGN KEY (id) REFERENCES users(id)
);
"#;

const CREATE_OPERATOR_PROFILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS operator_profiles (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    identity_card  TEXT NOT NULL,
    FOREIGN KEY (id) REFERENCES users(id)
);
"#;

const CREATE_DRIVER_LOCATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS driver_locations (
    driver_id   TEXT    PRIMARY KEY,
    lat         REAL    NOT NULL,
    lng         REAL    NOT NULL,
    updated_at  INTEGER NOT NULL,
    FOREIGN KEY (driver_id) REFERENCES users(id)
);
"#;

const CREATE_TRIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trips (
    id                TEXT    PRIMARY KEY,
    origin            TEXT    NOT NULL,
    destination       TEXT    NOT NULL,
    price             REAL    NOT NULL,
    status            TEXT    NOT NULL,
    driver_id         TEXT,
    operator_id       TEXT    NOT NULL,
    origin_lat        REAL    NOT NULL,
    origin_lng        REAL    NOT NULL,
    search_radius_km  REAL    NOT NULL,
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL,
    FOREIGN KEY (operator_id) REFERENCES users(id)
);
"#;

const CREATE_DRIVER_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS driver_requests (
    id          TEXT    PRIMARY KEY,
    trip_id     TEXT    NOT NULL,
    driver_id   TEXT    NOT NULL,
    status      TEXT    NOT NULL,
    created_at  INTEGER NOT NULL,
    UNIQUE (trip_id, driver_id),
    FOREIGN KEY (trip_id) REFERENCES trips(id),
    FOREIGN KEY (driver_id) REFERENCES users(id)
);
"#;

const CREATE_BALANCE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS balance_history (
    id           TEXT    PRIMARY KEY,
    driver_id    TEXT    NOT NULL,
    amount       REAL    NOT NULL,
    type         TEXT    NOT NULL CHECK (type IN ('recarga', 'descuento', 'viaje')),
    description  TEXT    NOT NULL,
    created_at   INTEGER NOT NULL,
    FOREIGN KEY (driver_id) REFERENCES users(id)
);
"#;

const CREATE_INDEXES: [&str; 4] = [
    "CREATE INDEX IF NOT EXISTS idx_trips_status ON trips(status);",
    "CREATE INDEX IF NOT EXISTS idx_trips_driver ON trips(driver_id);",
    "CREATE INDEX IF NOT EXISTS idx_driver_requests_driver ON driver_requests(driver_id, status);",
    "CREATE INDEX IF NOT EXISTS idx_balance_history_driver ON balance_history(driver_id, created_at);",
];

pub type Db = Arc<RwLock<Connection>>;

/// Dispatch database (dispatch.db) holding every table
pub async fn init_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join("dispatch.db");
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute(CREATE_USERS_TABLE, ()).await?;
    conn.execute(CREATE_DRIVER_PROFILES_TABLE, ()).await?;
    conn.execute(CREATE_OPERATOR_PROFILES_TABLE, ()).await?;
    conn.execute(CREATE_DRIVER_LOCATIONS_TABLE, ()).await?;
    conn.execute(CREATE_TRIPS_TABLE, ()).await?;
    conn.execute(CREATE_DRIVER_REQUESTS_TABLE, ()).await?;
    conn.execute(CREATE_BALANCE_HISTORY_TABLE, ()).await?;
    for index in CREATE_INDEXES {
        conn.execute(index, ()).await?;
    }

    Ok(Arc::new(RwLock::new(conn)))
}
