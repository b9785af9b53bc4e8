use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use libsql::Connection;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::require_role;
use crate::balance::apply_ledger_entry;
use crate::constants::*;
use crate::drivers::fetch_driver;
use crate::models::{
    CreateTripPayload, CreateTripResponse, ListTripsQuery, ListTripsResponse, PendingRequest,
    RequestDecisionResponse, Role, SessionUser, Trip, TripView,
};
use crate::utils::{
    bad_request, commission_breakdown, conflict, db_error_with_context, db_failure, haversine_km,
    is_trip_status, not_found, now_unix, validate_coordinates, validate_limit, validate_offset,
    validate_positive_amount, validate_string_length, validate_trip_transition,
};
use crate::{AppState, Db, TransactionError, with_transaction};

const SELECT_TRIP: &str = "SELECT id, origin, destination, price, status, driver_id, operator_id, \
     origin_lat, origin_lng, search_radius_km, created_at, updated_at FROM trips";

fn optional_text(row: &libsql::Row, idx: i32) -> Result<Option<String>, libsql::Error> {
    match row.get_value(idx)? {
        libsql::Value::Text(value) => Ok(Some(value)),
        _ => Ok(None),
    }
}

pub fn extract_trip_from_row(row: &libsql::Row) -> Result<Trip, libsql::Error> {
    Ok(Trip {
        id: row.get(0)?,
        origin: row.get(1)?,
        destination: row.get(2)?,
        price: row.get(3)?,
        status: row.get(4)?,
        driver_id: optional_text(row, 5)?,
        operator_id: row.get(6)?,
        origin_lat: row.get(7)?,
        origin_lng: row.get(8)?,
        search_radius_km: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub async fn fetch_trip(conn: &Connection, trip_id: &str) -> Result<Option<Trip>, libsql::Error> {
    let mut rows = conn
        .query(&format!("{} WHERE id = ?", SELECT_TRIP), [trip_id])
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(extract_trip_from_row(&row)?)),
        None => Ok(None),
    }
}

pub fn trip_view(trip: Trip) -> TripView {
    let (commission, net) = commission_breakdown(trip.price);
    TripView {
        trip,
        commission,
        net,
    }
}

enum TripError {
    Transaction(TransactionError),
    Db(&'static str, libsql::Error),
    NotFound(&'static str),
    Forbidden,
    Conflict(String),
}

impl From<TransactionError> for TripError {
    fn from(e: TransactionError) -> Self {
        TripError::Transaction(e)
    }
}

impl From<TripError> for (StatusCode, String) {
    fn from(e: TripError) -> Self {
        match e {
            TripError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            TripError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            TripError::Db(context, err) => db_failure(context)(err),
            TripError::NotFound(message) => not_found(message),
            TripError::Forbidden => (StatusCode::FORBIDDEN, ERR_FORBIDDEN.to_string()),
            TripError::Conflict(message) => conflict(message),
        }
    }
}

/// Drivers that may receive an offer for a trip starting at the given origin:
/// active, on duty, with a known location inside the search radius.
async fn drivers_within_radius(
    conn: &Connection,
    origin_lat: f64,
    origin_lng: f64,
    radius_km: f64,
) -> Result<Vec<String>, libsql::Error> {
    let mut rows = conn
        .query(
            "SELECT d.id, l.lat, l.lng FROM driver_profiles d \
             JOIN users u ON u.id = d.id \
             JOIN driver_locations l ON l.driver_id = d.id \
             WHERE d.is_on_duty = TRUE AND u.active = TRUE",
            (),
        )
        .await?;

    let mut matches = Vec::new();
    while let Some(row) = rows.next().await? {
        let driver_id: String = row.get(0)?;
        let lat: f64 = row.get(1)?;
        let lng: f64 = row.get(2)?;
        let distance = haversine_km(origin_lat, origin_lng, lat, lng);
        if distance <= radius_km {
            matches.push((distance, driver_id));
        }
    }
    matches.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(matches.into_iter().map(|(_, driver_id)| driver_id).collect())
}

pub async fn create_trip(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateTripPayload>,
) -> Result<(StatusCode, Json<CreateTripResponse>), (StatusCode, String)> {
    let operator = require_role(&app_state.db, &session, &[Role::Operator]).await?;
    validate_string_length(&payload.origin, "Origin", MAX_ADDRESS_LENGTH)?;
    validate_string_length(&payload.destination, "Destination", MAX_ADDRESS_LENGTH)?;
    validate_positive_amount(payload.price, "Price")?;
    validate_coordinates(payload.origin_lat, payload.origin_lng)?;

    let direct_driver = payload
        .driver_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let search_radius_km = match (&direct_driver, payload.search_radius_km) {
        (Some(_), _) => 0.0,
        (None, Some(radius)) => {
            if !radius.is_finite() || radius <= 0.0 || radius > MAX_SEARCH_RADIUS_KM {
                return Err(bad_request(format!(
                    "Search radius must be greater than 0 and at most {} km",
                    MAX_SEARCH_RADIUS_KM
                )));
            }
            radius
        }
        (None, None) => DEFAULT_SEARCH_RADIUS_KM,
    };

    let now = now_unix();
    let trip = Trip {
        id: Uuid::new_v4().to_string(),
        origin: payload.origin.trim().to_string(),
        destination: payload.destination.trim().to_string(),
        price: payload.price,
        status: TRIP_STATUS_BROADCASTING.to_string(),
        driver_id: None,
        operator_id: operator.id.clone(),
        origin_lat: payload.origin_lat,
        origin_lng: payload.origin_lng,
        search_radius_km,
        created_at: now,
        updated_at: now,
    };

    let created = trip.clone();
    let recipients = with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            let recipients = match direct_driver {
                Some(driver_id) => {
                    let driver = fetch_driver(conn, &driver_id)
                        .await
                        .map_err(|e| TripError::Db("failed to query driver", e))?
                        .ok_or(TripError::NotFound("Driver not found"))?;
                    if !driver.active || !driver.is_on_duty {
                        return Err(TripError::Conflict("Driver is not available".to_string()));
                    }
                    vec![driver.id]
                }
                None => drivers_within_radius(
                    conn,
                    created.origin_lat,
                    created.origin_lng,
                    created.search_radius_km,
                )
                .await
                .map_err(|e| TripError::Db("failed to match drivers", e))?,
            };

            conn.execute(
                "INSERT INTO trips (id, origin, destination, price, status, driver_id, operator_id, origin_lat, origin_lng, search_radius_km, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?9, ?10, ?10)",
                libsql::params![
                    created.id.as_str(),
                    created.origin.as_str(),
                    created.destination.as_str(),
                    created.price,
                    created.status.as_str(),
                    created.operator_id.as_str(),
                    created.origin_lat,
                    created.origin_lng,
                    created.search_radius_km,
                    created.created_at,
                ],
            )
            .await
            .map_err(|e| TripError::Db("trip creation failed", e))?;

            for driver_id in &recipients {
                let request_id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO driver_requests (id, trip_id, driver_id, status, created_at) VALUES (?, ?, ?, ?, ?)",
                    (
                        request_id.as_str(),
                        created.id.as_str(),
                        driver_id.as_str(),
                        OFFER_STATUS_PENDING,
                        created.created_at,
                    ),
                )
                .await
                .map_err(|e| TripError::Db("failed to offer trip", e))?;
            }

            Ok(recipients)
        })
    })
    .await
    .map_err(|e: TripError| -> (StatusCode, String) { e.into() })?;

    tracing::info!(
        trip_id = %trip.id,
        operator_id = %operator.id,
        radius_km = trip.search_radius_km,
        drivers_notified = recipients.len(),
        "trip broadcast"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateTripResponse {
            trip,
            drivers_notified: recipients.len() as u32,
        }),
    ))
}

pub async fn list_trips(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<ListTripsQuery>,
) -> Result<(StatusCode, Json<ListTripsResponse>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Admin, Role::Operator, Role::Driver]).await?;
    let limit = validate_limit(query.limit, DEFAULT_LIST_LIMIT)?;
    let offset = validate_offset(query.offset)?;

    let status = query.status.as_deref().map(str::trim).unwrap_or("");
    if !status.is_empty() && !is_trip_status(status) {
        return Err(bad_request(format!("Unknown trip status '{}'", status)));
    }

    // Admins see every trip; the scope parameter is then compared to itself.
    let (scope, scope_value) = match user.role {
        Role::Admin => ("?1 = ?1", ""),
        Role::Operator => ("operator_id = ?1", user.id.as_str()),
        Role::Driver => ("driver_id = ?1", user.id.as_str()),
    };

    let conn = app_state.db.read().await;

    let mut count_rows = conn
        .query(
            &format!(
                "SELECT COUNT(*) FROM trips WHERE {} AND (?2 = '' OR status = ?2)",
                scope
            ),
            (scope_value, status),
        )
        .await
        .map_err(db_failure("failed to count trips"))?;
    let total_count: u32 = match count_rows
        .next()
        .await
        .map_err(db_failure("failed to count trips"))?
    {
        Some(row) => row.get(0).map_err(db_failure("failed to count trips"))?,
        None => 0,
    };

    let mut rows = conn
        .query(
            &format!(
                "{} WHERE {} AND (?2 = '' OR status = ?2) ORDER BY created_at DESC, id ASC LIMIT ?3 OFFSET ?4",
                SELECT_TRIP, scope
            ),
            (scope_value, status, limit, offset),
        )
        .await
        .map_err(db_failure("failed to query trips"))?;

    let mut trips = Vec::new();
    while let Some(row) = rows.next().await.map_err(db_failure("failed to read trips"))? {
        let trip = extract_trip_from_row(&row).map_err(db_failure("invalid trip data"))?;
        trips.push(trip_view(trip));
    }

    Ok((
        StatusCode::OK,
        Json(ListTripsResponse {
            trips,
            total_count,
        }),
    ))
}

async fn driver_was_offered(
    conn: &Connection,
    trip_id: &str,
    driver_id: &str,
) -> Result<bool, libsql::Error> {
    let mut rows = conn
        .query(
            "SELECT id FROM driver_requests WHERE trip_id = ? AND driver_id = ?",
            (trip_id, driver_id),
        )
        .await?;
    Ok(rows.next().await?.is_some())
}

pub async fn get_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(trip_id): Path<String>,
) -> Result<(StatusCode, Json<TripView>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Admin, Role::Operator, Role::Driver]).await?;
    let conn = app_state.db.read().await;
    let trip = fetch_trip(&conn, &trip_id)
        .await
        .map_err(db_failure("failed to query trip"))?
        .ok_or_else(|| not_found("Trip not found"))?;

    let visible = match user.role {
        Role::Admin => true,
        Role::Operator => trip.operator_id == user.id,
        Role::Driver => {
            trip.driver_id.as_deref() == Some(user.id.as_str())
                || driver_was_offered(&conn, &trip.id, &user.id)
                    .await
                    .map_err(db_failure("failed to query trip offers"))?
        }
    };
    if !visible {
        return Err(not_found("Trip not found"));
    }

    Ok((StatusCode::OK, Json(trip_view(trip))))
}

/// Open offers for a driver: offer still pending and trip still broadcasting.
pub async fn load_pending_requests(
    db: &Db,
    driver_id: &str,
) -> Result<Vec<PendingRequest>, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT r.id, t.id, t.origin, t.destination, t.price, t.origin_lat, t.origin_lng, r.created_at \
             FROM driver_requests r JOIN trips t ON t.id = r.trip_id \
             WHERE r.driver_id = ? AND r.status = ? AND t.status = ? \
             ORDER BY r.created_at ASC, r.id ASC",
            (driver_id, OFFER_STATUS_PENDING, TRIP_STATUS_BROADCASTING),
        )
        .await
        .map_err(db_failure("failed to query pending requests"))?;

    let mut requests = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(db_failure("failed to read pending requests"))?
    {
        let read = |row: &libsql::Row| -> Result<PendingRequest, libsql::Error> {
            Ok(PendingRequest {
                id: row.get(0)?,
                trip_id: row.get(1)?,
                origin: row.get(2)?,
                destination: row.get(3)?,
                price: row.get(4)?,
                origin_lat: row.get(5)?,
                origin_lng: row.get(6)?,
                created_at: row.get(7)?,
            })
        };
        requests.push(read(&row).map_err(db_failure("invalid request data"))?);
    }
    Ok(requests)
}

pub async fn pending_requests(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<PendingRequest>>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    let requests = load_pending_requests(&app_state.db, &user.id).await?;
    Ok((StatusCode::OK, Json(requests)))
}

/// Loads an offer addressed to `driver_id`, returning (trip_id, status).
async fn fetch_offer(
    conn: &Connection,
    request_id: &str,
    driver_id: &str,
) -> Result<Option<(String, String)>, libsql::Error> {
    let mut rows = conn
        .query(
            "SELECT trip_id, status FROM driver_requests WHERE id = ? AND driver_id = ?",
            (request_id, driver_id),
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
        None => Ok(None),
    }
}

pub async fn accept_request(
    State(app_state): State<AppState>,
    session: Session,
    Path(request_id): Path<String>,
) -> Result<(StatusCode, Json<RequestDecisionResponse>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    let driver_id = user.id.clone();

    let response = with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            let (trip_id, offer_status) = fetch_offer(conn, &request_id, &driver_id)
                .await
                .map_err(|e| TripError::Db("failed to query request", e))?
                .ok_or(TripError::NotFound("Request not found"))?;
            if offer_status != OFFER_STATUS_PENDING {
                return Err(TripError::Conflict(format!(
                    "Request is already {}",
                    offer_status
                )));
            }

            let driver = fetch_driver(conn, &driver_id)
                .await
                .map_err(|e| TripError::Db("failed to query driver", e))?
                .ok_or(TripError::NotFound("Driver profile not found"))?;
            if !driver.is_on_duty {
                return Err(TripError::Conflict("Driver is off duty".to_string()));
            }

            // Only the first accept can move the trip out of broadcasting.
            let claimed = conn
                .execute(
                    "UPDATE trips SET status = ?, driver_id = ?, updated_at = ? WHERE id = ? AND status = ?",
                    (
                        TRIP_STATUS_PENDING,
                        driver_id.as_str(),
                        now_unix(),
                        trip_id.as_str(),
                        TRIP_STATUS_BROADCASTING,
                    ),
                )
                .await
                .map_err(|e| TripError::Db("failed to assign trip", e))?;
            if claimed == 0 {
                return Err(TripError::Conflict(
                    "Trip is no longer available".to_string(),
                ));
            }

            conn.execute(
                "UPDATE driver_requests SET status = ? WHERE id = ?",
                (OFFER_STATUS_ACCEPTED, request_id.as_str()),
            )
            .await
            .map_err(|e| TripError::Db("failed to accept request", e))?;
            conn.execute(
                "UPDATE driver_requests SET status = ? WHERE trip_id = ? AND id != ? AND status = ?",
                (
                    OFFER_STATUS_EXPIRED,
                    trip_id.as_str(),
                    request_id.as_str(),
                    OFFER_STATUS_PENDING,
                ),
            )
            .await
            .map_err(|e| TripError::Db("failed to expire sibling requests", e))?;

            let trip = fetch_trip(conn, &trip_id)
                .await
                .map_err(|e| TripError::Db("failed to query trip", e))?
                .ok_or(TripError::NotFound("Trip not found"))?;

            Ok(RequestDecisionResponse {
                request_id,
                status: OFFER_STATUS_ACCEPTED.to_string(),
                trip,
            })
        })
    })
    .await
    .map_err(|e: TripError| -> (StatusCode, String) { e.into() })?;

    tracing::info!(trip_id = %response.trip.id, driver_id = %user.id, "trip accepted");
    Ok((StatusCode::OK, Json(response)))
}

pub async fn reject_request(
    State(app_state): State<AppState>,
    session: Session,
    Path(request_id): Path<String>,
) -> Result<(StatusCode, Json<RequestDecisionResponse>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    let driver_id = user.id.clone();

    let response = with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            let (trip_id, offer_status) = fetch_offer(conn, &request_id, &driver_id)
                .await
                .map_err(|e| TripError::Db("failed to query request", e))?
                .ok_or(TripError::NotFound("Request not found"))?;
            if offer_status != OFFER_STATUS_PENDING {
                return Err(TripError::Conflict(format!(
                    "Request is already {}",
                    offer_status
                )));
            }

            conn.execute(
                "UPDATE driver_requests SET status = ? WHERE id = ?",
                (OFFER_STATUS_REJECTED, request_id.as_str()),
            )
            .await
            .map_err(|e| TripError::Db("failed to reject request", e))?;

            let trip = fetch_trip(conn, &trip_id)
                .await
                .map_err(|e| TripError::Db("failed to query trip", e))?
                .ok_or(TripError::NotFound("Trip not found"))?;

            Ok(RequestDecisionResponse {
                request_id,
                status: OFFER_STATUS_REJECTED.to_string(),
                trip,
            })
        })
    })
    .await
    .map_err(|e: TripError| -> (StatusCode, String) { e.into() })?;

    tracing::info!(trip_id = %response.trip.id, driver_id = %user.id, "trip rejected");
    Ok((StatusCode::OK, Json(response)))
}

fn may_transition(user: &SessionUser, trip: &Trip, to: &str) -> bool {
    match to {
        TRIP_STATUS_IN_PROGRESS | TRIP_STATUS_COMPLETED => {
            user.role == Role::Driver && trip.driver_id.as_deref() == Some(user.id.as_str())
        }
        TRIP_STATUS_CANCELLED => match user.role {
            Role::Admin => true,
            Role::Operator => trip.operator_id == user.id,
            Role::Driver => false,
        },
        _ => false,
    }
}

/// Moves a trip to `to`, checking ownership and the status machine. Completing
/// a trip charges the commission to the driver's balance; cancelling expires
/// any open offers.
async fn transition_trip(
    db: &Db,
    user: SessionUser,
    trip_id: String,
    to: &'static str,
) -> Result<Trip, (StatusCode, String)> {
    with_transaction(db, |conn| {
        Box::pin(async move {
            let trip = fetch_trip(conn, &trip_id)
                .await
                .map_err(|e| TripError::Db("failed to query trip", e))?
                .ok_or(TripError::NotFound("Trip not found"))?;

            if !may_transition(&user, &trip, to) {
                return Err(TripError::Forbidden);
            }
            validate_trip_transition(&trip.status, to).map_err(TripError::Conflict)?;

            let now = now_unix();
            let updated = conn
                .execute(
                    "UPDATE trips SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
                    (to, now, trip.id.as_str(), trip.status.as_str()),
                )
                .await
                .map_err(|e| TripError::Db("failed to update trip status", e))?;
            if updated == 0 {
                return Err(TripError::Conflict("Trip status changed concurrently".to_string()));
            }

            match to {
                TRIP_STATUS_COMPLETED => {
                    if let Some(driver_id) = trip.driver_id.as_deref() {
                        let (commission, _) = commission_breakdown(trip.price);
                        let description =
                            format!("Comisión viaje {} -> {}", trip.origin, trip.destination);
                        apply_ledger_entry(
                            conn,
                            driver_id,
                            -commission,
                            BALANCE_TYPE_TRIP,
                            &description,
                        )
                        .await
                        .map_err(|e| TripError::Db("failed to charge commission", e))?;
                    }
                }
                TRIP_STATUS_CANCELLED => {
                    conn.execute(
                        "UPDATE driver_requests SET status = ? WHERE trip_id = ? AND status = ?",
                        (OFFER_STATUS_EXPIRED, trip.id.as_str(), OFFER_STATUS_PENDING),
                    )
                    .await
                    .map_err(|e| TripError::Db("failed to expire requests", e))?;
                }
                _ => {}
            }

            Ok(Trip {
                status: to.to_string(),
                updated_at: now,
                ..trip
            })
        })
    })
    .await
    .map_err(|e: TripError| -> (StatusCode, String) { e.into() })
}

pub async fn start_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(trip_id): Path<String>,
) -> Result<(StatusCode, Json<TripView>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    let trip = transition_trip(&app_state.db, user, trip_id, TRIP_STATUS_IN_PROGRESS).await?;
    tracing::info!(trip_id = %trip.id, "trip started");
    Ok((StatusCode::OK, Json(trip_view(trip))))
}

pub async fn complete_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(trip_id): Path<String>,
) -> Result<(StatusCode, Json<TripView>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    let trip = transition_trip(&app_state.db, user, trip_id, TRIP_STATUS_COMPLETED).await?;
    tracing::info!(trip_id = %trip.id, price = trip.price, "trip completed");
    Ok((StatusCode::OK, Json(trip_view(trip))))
}

pub async fn cancel_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(trip_id): Path<String>,
) -> Result<(StatusCode, Json<TripView>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Admin, Role::Operator]).await?;
    let trip = transition_trip(&app_state.db, user, trip_id, TRIP_STATUS_CANCELLED).await?;
    tracing::info!(trip_id = %trip.id, "trip cancelled");
    Ok((StatusCode::OK, Json(trip_view(trip))))
}
