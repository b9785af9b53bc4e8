use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use libsql::Connection;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::{hash_pin, insert_user, phone_number_taken, require_role};
use crate::constants::*;
use crate::models::{
    CreateDriverPayload, DriverLocation, DriverProfile, DutyPayload, ListQuery, LocationPayload,
    Role, SetActivePayload, UpdateDriverPayload,
};
use crate::utils::{
    conflict, db_error_with_context, db_failure, not_found, now_unix, validate_coordinates,
    validate_limit, validate_offset, validate_phone_number, validate_pin, validate_string_length,
};
use crate::{AppState, TransactionError, with_transaction};

const SELECT_DRIVER: &str = "SELECT u.id, u.phone_number, d.name, d.vehicle, d.vehicle_type, d.balance, d.is_on_duty, u.active \
     FROM driver_profiles d JOIN users u ON u.id = d.id";

pub fn extract_driver_from_row(row: &libsql::Row) -> Result<DriverProfile, libsql::Error> {
    Ok(DriverProfile {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        name: row.get(2)?,
        vehicle: row.get(3)?,
        vehicle_type: row.get(4)?,
        balance: row.get(5)?,
        is_on_duty: row.get(6)?,
        active: row.get(7)?,
    })
}

pub async fn fetch_driver(
    conn: &Connection,
    driver_id: &str,
) -> Result<Option<DriverProfile>, libsql::Error> {
    let mut rows = conn
        .query(&format!("{} WHERE d.id = ?", SELECT_DRIVER), [driver_id])
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(extract_driver_from_row(&row)?)),
        None => Ok(None),
    }
}

fn validate_driver_fields(
    name: Option<&str>,
    vehicle: Option<&str>,
    vehicle_type: Option<&str>,
) -> Result<(), (StatusCode, String)> {
    if let Some(name) = name {
        validate_string_length(name, "Name", MAX_NAME_LENGTH)?;
    }
    if let Some(vehicle) = vehicle {
        validate_string_length(vehicle, "Vehicle", MAX_VEHICLE_LENGTH)?;
    }
    if let Some(vehicle_type) = vehicle_type {
        validate_string_length(vehicle_type, "Vehicle type", MAX_VEHICLE_LENGTH)?;
    }
    Ok(())
}

enum DriverWriteError {
    Transaction(TransactionError),
    Db(&'static str, libsql::Error),
    PhoneTaken,
    NotFound,
    HasHistory,
}

impl From<TransactionError> for DriverWriteError {
    fn from(e: TransactionError) -> Self {
        DriverWriteError::Transaction(e)
    }
}

impl From<DriverWriteError> for (StatusCode, String) {
    fn from(e: DriverWriteError) -> Self {
        match e {
            DriverWriteError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            DriverWriteError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            DriverWriteError::Db(context, err) => db_failure(context)(err),
            DriverWriteError::PhoneTaken => conflict("Phone number already registered"),
            DriverWriteError::NotFound => not_found("Driver not found"),
            DriverWriteError::HasHistory => conflict(
                "Driver has trips or balance history; deactivate the account instead",
            ),
        }
    }
}

pub async fn create_driver(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateDriverPayload>,
) -> Result<(StatusCode, Json<DriverProfile>), (StatusCode, String)> {
    let admin = require_role(&app_state.db, &session, &[Role::Admin]).await?;
    validate_phone_number(&payload.phone_number)?;
    validate_pin(&payload.pin)?;
    validate_driver_fields(
        Some(payload.name.as_str()),
        Some(payload.vehicle.as_str()),
        Some(payload.vehicle_type.as_str()),
    )?;

    let pin_hash = hash_pin(&payload.pin)?;
    let driver = DriverProfile {
        id: Uuid::new_v4().to_string(),
        phone_number: payload.phone_number.trim().to_string(),
        name: payload.name.trim().to_string(),
        vehicle: payload.vehicle.trim().to_string(),
        vehicle_type: payload.vehicle_type.trim().to_string(),
        balance: 0.0,
        is_on_duty: false,
        active: true,
    };

    let created = driver.clone();
    with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            if phone_number_taken(conn, &created.phone_number, None)
                .await
                .map_err(|e| DriverWriteError::Db("failed to check phone number", e))?
            {
                return Err(DriverWriteError::PhoneTaken);
            }
            insert_user(conn, &created.id, &created.phone_number, &pin_hash, Role::Driver)
                .await
                .map_err(|e| DriverWriteError::Db("driver account creation failed", e))?;
            conn.execute(
                "INSERT INTO driver_profiles (id, name, vehicle, vehicle_type, balance, is_on_duty) VALUES (?, ?, ?, ?, 0, FALSE)",
                (
                    created.id.as_str(),
                    created.name.as_str(),
                    created.vehicle.as_str(),
                    created.vehicle_type.as_str(),
                ),
            )
            .await
            .map_err(|e| DriverWriteError::Db("driver profile creation failed", e))?;
            Ok(())
        })
    })
    .await
    .map_err(|e: DriverWriteError| -> (StatusCode, String) { e.into() })?;

    tracing::info!(admin_id = %admin.id, driver_id = %driver.id, "driver created");
    Ok((StatusCode::CREATED, Json(driver)))
}

pub async fn list_drivers(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<ListQuery>,
) -> Result<(StatusCode, Json<Vec<DriverProfile>>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;
    let limit = validate_limit(query.limit, DEFAULT_LIST_LIMIT)?;
    let offset = validate_offset(query.offset)?;

    let conn = app_state.db.read().await;
    let mut rows = conn
        .query(
            &format!("{} ORDER BY d.name ASC LIMIT ? OFFSET ?", SELECT_DRIVER),
            (limit, offset),
        )
        .await
        .map_err(db_failure("failed to query drivers"))?;

    let mut drivers = Vec::new();
    while let Some(row) = rows.next().await.map_err(db_failure("failed to read drivers"))? {
        drivers.push(extract_driver_from_row(&row).map_err(db_failure("invalid driver data"))?);
    }

    Ok((StatusCode::OK, Json(drivers)))
}

pub async fn get_driver(
    State(app_state): State<AppState>,
    session: Session,
    Path(driver_id): Path<String>,
) -> Result<(StatusCode, Json<DriverProfile>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;
    let conn = app_state.db.read().await;
    let driver = fetch_driver(&conn, &driver_id)
        .await
        .map_err(db_failure("failed to query driver"))?
        .ok_or_else(|| not_found("Driver not found"))?;
    Ok((StatusCode::OK, Json(driver)))
}

pub async fn update_driver(
    State(app_state): State<AppState>,
    session: Session,
    Path(driver_id): Path<String>,
    Json(payload): Json<UpdateDriverPayload>,
) -> Result<(StatusCode, Json<DriverProfile>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;

    if payload.phone_number.is_none()
        && payload.pin.is_none()
        && payload.name.is_none()
        && payload.vehicle.is_none()
        && payload.vehicle_type.is_none()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one field must be provided for update".to_string(),
        ));
    }
    if let Some(ref phone_number) = payload.phone_number {
        validate_phone_number(phone_number)?;
    }
    validate_driver_fields(
        payload.name.as_deref(),
        payload.vehicle.as_deref(),
        payload.vehicle_type.as_deref(),
    )?;
    let pin_hash = match payload.pin {
        Some(ref pin) => {
            validate_pin(pin)?;
            Some(hash_pin(pin)?)
        }
        None => None,
    };

    let updated = with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            let mut driver = fetch_driver(conn, &driver_id)
                .await
                .map_err(|e| DriverWriteError::Db("failed to query driver", e))?
                .ok_or(DriverWriteError::NotFound)?;

            if let Some(phone_number) = payload.phone_number {
                let phone_number = phone_number.trim().to_string();
                if phone_number_taken(conn, &phone_number, Some(driver.id.as_str()))
                    .await
                    .map_err(|e| DriverWriteError::Db("failed to check phone number", e))?
                {
                    return Err(DriverWriteError::PhoneTaken);
                }
                driver.phone_number = phone_number;
            }
            if let Some(name) = payload.name {
                driver.name = name.trim().to_string();
            }
            if let Some(vehicle) = payload.vehicle {
                driver.vehicle = vehicle.trim().to_string();
            }
            if let Some(vehicle_type) = payload.vehicle_type {
                driver.vehicle_type = vehicle_type.trim().to_string();
            }

            conn.execute(
                "UPDATE users SET phone_number = ? WHERE id = ?",
                (driver.phone_number.as_str(), driver.id.as_str()),
            )
            .await
            .map_err(|e| DriverWriteError::Db("failed to update driver account", e))?;
            if let Some(pin_hash) = pin_hash {
                conn.execute(
                    "UPDATE users SET pin_hash = ? WHERE id = ?",
                    (pin_hash.as_str(), driver.id.as_str()),
                )
                .await
                .map_err(|e| DriverWriteError::Db("failed to update driver PIN", e))?;
            }
            conn.execute(
                "UPDATE driver_profiles SET name = ?, vehicle = ?, vehicle_type = ? WHERE id = ?",
                (
                    driver.name.as_str(),
                    driver.vehicle.as_str(),
                    driver.vehicle_type.as_str(),
                    driver.id.as_str(),
                ),
            )
            .await
            .map_err(|e| DriverWriteError::Db("failed to update driver profile", e))?;

            Ok(driver)
        })
    })
    .await
    .map_err(|e: DriverWriteError| -> (StatusCode, String) { e.into() })?;

    Ok((StatusCode::OK, Json(updated)))
}

/// Activates or deactivates a driver account. Deactivation also takes the
/// driver off duty and withdraws the driver's open offers.
pub async fn set_driver_active(
    State(app_state): State<AppState>,
    session: Session,
    Path(driver_id): Path<String>,
    Json(payload): Json<SetActivePayload>,
) -> Result<(StatusCode, Json<DriverProfile>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;
    let active = payload.active;

    let driver = with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            let affected = conn
                .execute(
                    "UPDATE users SET active = ? WHERE id = ? AND role = ?",
                    (active, driver_id.as_str(), ROLE_DRIVER),
                )
                .await
                .map_err(|e| DriverWriteError::Db("failed to update driver status", e))?;
            if affected == 0 {
                return Err(DriverWriteError::NotFound);
            }
            if !active {
                go_off_duty(conn, &driver_id)
                    .await
                    .map_err(|e| DriverWriteError::Db("failed to take driver off duty", e))?;
            }
            fetch_driver(conn, &driver_id)
                .await
                .map_err(|e| DriverWriteError::Db("failed to query driver", e))?
                .ok_or(DriverWriteError::NotFound)
        })
    })
    .await
    .map_err(|e: DriverWriteError| -> (StatusCode, String) { e.into() })?;

    tracing::info!(driver_id = %driver.id, active, "driver activation changed");
    Ok((StatusCode::OK, Json(driver)))
}

pub async fn delete_driver(
    State(app_state): State<AppState>,
    session: Session,
    Path(driver_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;

    with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            fetch_driver(conn, &driver_id)
                .await
                .map_err(|e| DriverWriteError::Db("failed to query driver", e))?
                .ok_or(DriverWriteError::NotFound)?;

            let mut rows = conn
                .query(
                    "SELECT (SELECT COUNT(*) FROM trips WHERE driver_id = ?1) + (SELECT COUNT(*) FROM balance_history WHERE driver_id = ?1)",
                    [driver_id.as_str()],
                )
                .await
                .map_err(|e| DriverWriteError::Db("failed to check driver history", e))?;
            let history: i64 = match rows
                .next()
                .await
                .map_err(|e| DriverWriteError::Db("failed to check driver history", e))?
            {
                Some(row) => row
                    .get(0)
                    .map_err(|e| DriverWriteError::Db("failed to check driver history", e))?,
                None => 0,
            };
            if history > 0 {
                return Err(DriverWriteError::HasHistory);
            }

            for statement in [
                "DELETE FROM driver_requests WHERE driver_id = ?",
                "DELETE FROM driver_locations WHERE driver_id = ?",
                "DELETE FROM driver_profiles WHERE id = ?",
                "DELETE FROM users WHERE id = ?",
            ] {
                conn.execute(statement, [driver_id.as_str()])
                    .await
                    .map_err(|e| DriverWriteError::Db("failed to delete driver", e))?;
            }
            Ok(())
        })
    })
    .await
    .map_err(|e: DriverWriteError| -> (StatusCode, String) { e.into() })?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_my_profile(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<DriverProfile>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    let conn = app_state.db.read().await;
    let driver = fetch_driver(&conn, &user.id)
        .await
        .map_err(db_failure("failed to query driver"))?
        .ok_or_else(|| not_found("Driver profile not found"))?;
    Ok((StatusCode::OK, Json(driver)))
}

async fn go_off_duty(conn: &Connection, driver_id: &str) -> libsql::Result<()> {
    conn.execute(
        "UPDATE driver_profiles SET is_on_duty = FALSE WHERE id = ?",
        [driver_id],
    )
    .await?;
    conn.execute(
        "UPDATE driver_requests SET status = ? WHERE driver_id = ? AND status = ?",
        (OFFER_STATUS_EXPIRED, driver_id, OFFER_STATUS_PENDING),
    )
    .await?;
    // The next shift starts without a position until the driver reports one.
    conn.execute(
        "DELETE FROM driver_locations WHERE driver_id = ?",
        [driver_id],
    )
    .await?;
    Ok(())
}

pub async fn set_duty(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<DutyPayload>,
) -> Result<(StatusCode, Json<DriverProfile>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    let on_duty = payload.is_on_duty;
    let driver_id = user.id.clone();

    let driver = with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            if on_duty {
                conn.execute(
                    "UPDATE driver_profiles SET is_on_duty = TRUE WHERE id = ?",
                    [driver_id.as_str()],
                )
                .await
                .map_err(|e| DriverWriteError::Db("failed to update duty status", e))?;
            } else {
                go_off_duty(conn, &driver_id)
                    .await
                    .map_err(|e| DriverWriteError::Db("failed to update duty status", e))?;
            }
            fetch_driver(conn, &driver_id)
                .await
                .map_err(|e| DriverWriteError::Db("failed to query driver", e))?
                .ok_or(DriverWriteError::NotFound)
        })
    })
    .await
    .map_err(|e: DriverWriteError| -> (StatusCode, String) { e.into() })?;

    tracing::info!(driver_id = %driver.id, is_on_duty = driver.is_on_duty, "duty status changed");
    Ok((StatusCode::OK, Json(driver)))
}

pub async fn update_location(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<LocationPayload>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    validate_coordinates(payload.lat, payload.lng)?;

    let conn = app_state.db.write().await;
    let driver = fetch_driver(&conn, &user.id)
        .await
        .map_err(db_failure("failed to query driver"))?
        .ok_or_else(|| not_found("Driver profile not found"))?;
    if !driver.is_on_duty {
        return Err(conflict("Driver is off duty"));
    }

    conn.execute(
        "INSERT INTO driver_locations (driver_id, lat, lng, updated_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(driver_id) DO UPDATE SET lat = excluded.lat, lng = excluded.lng, updated_at = excluded.updated_at",
        (user.id.as_str(), payload.lat, payload.lng, now_unix()),
    )
    .await
    .map_err(db_failure("failed to store location"))?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_driver_locations(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<DriverLocation>>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin, Role::Operator]).await?;

    let conn = app_state.db.read().await;
    let mut rows = conn
        .query(
            "SELECT d.id, d.name, d.vehicle, d.vehicle_type, l.lat, l.lng, l.updated_at \
             FROM driver_profiles d \
             JOIN users u ON u.id = d.id \
             JOIN driver_locations l ON l.driver_id = d.id \
             WHERE d.is_on_duty = TRUE AND u.active = TRUE \
             ORDER BY d.name ASC",
            (),
        )
        .await
        .map_err(db_failure("failed to query driver locations"))?;

    let mut locations = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(db_failure("failed to read driver locations"))?
    {
        let read = |row: &libsql::Row| -> Result<DriverLocation, libsql::Error> {
            Ok(DriverLocation {
                driver_id: row.get(0)?,
                name: row.get(1)?,
                vehicle: row.get(2)?,
                vehicle_type: row.get(3)?,
                lat: row.get(4)?,
                lng: row.get(5)?,
                updated_at: row.get(6)?,
            })
        };
        locations.push(read(&row).map_err(db_failure("invalid location data"))?);
    }

    Ok((StatusCode::OK, Json(locations)))
}
