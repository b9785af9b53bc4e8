use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use libsql::Connection;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::require_role;
use crate::constants::*;
use crate::drivers::fetch_driver;
use crate::models::{
    BalanceAdjustmentPayload, BalanceAdjustmentResponse, BalanceEntry, BalanceHistoryResponse,
    EarningsResponse, Period, PeriodQuery, ReportSummary, Role, TripEarning,
};
use crate::utils::{
    bad_request, commission_breakdown, conflict, db_error_with_context, db_failure, not_found,
    now_unix, round_cents, start_of_local_day, validate_positive_amount, validate_string_length,
};
use crate::{AppState, Db, TransactionError, with_transaction};

fn extract_balance_entry_from_row(row: &libsql::Row) -> Result<BalanceEntry, libsql::Error> {
    Ok(BalanceEntry {
        id: row.get(0)?,
        driver_id: row.get(1)?,
        amount: row.get(2)?,
        entry_type: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Appends a ledger entry and applies `amount` to the driver's balance.
/// Must run inside a transaction so the two writes stay consistent.
pub async fn apply_ledger_entry(
    conn: &Connection,
    driver_id: &str,
    amount: f64,
    entry_type: &str,
    description: &str,
) -> libsql::Result<BalanceEntry> {
    let entry = BalanceEntry {
        id: Uuid::new_v4().to_string(),
        driver_id: driver_id.to_string(),
        amount: round_cents(amount),
        entry_type: entry_type.to_string(),
        description: description.to_string(),
        created_at: now_unix(),
    };

    conn.execute(
        "UPDATE driver_profiles SET balance = ROUND(balance + ?, 2) WHERE id = ?",
        (entry.amount, driver_id),
    )
    .await?;
    conn.execute(
        "INSERT INTO balance_history (id, driver_id, amount, type, description, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        (
            entry.id.as_str(),
            entry.driver_id.as_str(),
            entry.amount,
            entry.entry_type.as_str(),
            entry.description.as_str(),
            entry.created_at,
        ),
    )
    .await?;

    Ok(entry)
}

enum AdjustBalanceError {
    Transaction(TransactionError),
    Db(&'static str, libsql::Error),
    NotFound,
    Insufficient,
}

impl From<TransactionError> for AdjustBalanceError {
    fn from(e: TransactionError) -> Self {
        AdjustBalanceError::Transaction(e)
    }
}

impl From<AdjustBalanceError> for (StatusCode, String) {
    fn from(e: AdjustBalanceError) -> Self {
        match e {
            AdjustBalanceError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            AdjustBalanceError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            AdjustBalanceError::Db(context, err) => db_failure(context)(err),
            AdjustBalanceError::NotFound => not_found("Driver not found"),
            AdjustBalanceError::Insufficient => conflict("Insufficient balance"),
        }
    }
}

async fn adjust_balance(
    db: &Db,
    driver_id: String,
    payload: BalanceAdjustmentPayload,
    entry_type: &'static str,
) -> Result<BalanceAdjustmentResponse, (StatusCode, String)> {
    validate_positive_amount(payload.amount, "Amount")?;
    // Balances are kept in cents, so validate what will actually be stored.
    let amount = round_cents(payload.amount);
    if amount <= 0.0 {
        return Err(bad_request("Amount must be at least 0.01"));
    }
    let description = match payload.description {
        Some(ref description) => {
            validate_string_length(description, "Description", MAX_DESCRIPTION_LENGTH)?;
            description.trim().to_string()
        }
        None if entry_type == BALANCE_TYPE_RECHARGE => "Recarga de saldo".to_string(),
        None => "Descuento de saldo".to_string(),
    };
    let signed_amount = if entry_type == BALANCE_TYPE_RECHARGE {
        amount
    } else {
        -amount
    };

    with_transaction(db, |conn| {
        Box::pin(async move {
            let driver = fetch_driver(conn, &driver_id)
                .await
                .map_err(|e| AdjustBalanceError::Db("failed to query driver", e))?
                .ok_or(AdjustBalanceError::NotFound)?;
            if round_cents(driver.balance + signed_amount) < 0.0 {
                return Err(AdjustBalanceError::Insufficient);
            }

            let entry =
                apply_ledger_entry(conn, &driver_id, signed_amount, entry_type, &description)
                    .await
                    .map_err(|e| AdjustBalanceError::Db("failed to record balance change", e))?;

            Ok(BalanceAdjustmentResponse {
                balance: round_cents(driver.balance + entry.amount),
                entry,
            })
        })
    })
    .await
    .map_err(|e: AdjustBalanceError| -> (StatusCode, String) { e.into() })
}

pub async fn recharge_balance(
    State(app_state): State<AppState>,
    session: Session,
    Path(driver_id): Path<String>,
    Json(payload): Json<BalanceAdjustmentPayload>,
) -> Result<(StatusCode, Json<BalanceAdjustmentResponse>), (StatusCode, String)> {
    let admin = require_role(&app_state.db, &session, &[Role::Admin]).await?;
    let response = adjust_balance(&app_state.db, driver_id, payload, BALANCE_TYPE_RECHARGE).await?;
    tracing::info!(
        admin_id = %admin.id,
        driver_id = %response.entry.driver_id,
        amount = response.entry.amount,
        "balance recharged"
    );
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn deduct_balance(
    State(app_state): State<AppState>,
    session: Session,
    Path(driver_id): Path<String>,
    Json(payload): Json<BalanceAdjustmentPayload>,
) -> Result<(StatusCode, Json<BalanceAdjustmentResponse>), (StatusCode, String)> {
    let admin = require_role(&app_state.db, &session, &[Role::Admin]).await?;
    let response =
        adjust_balance(&app_state.db, driver_id, payload, BALANCE_TYPE_DEDUCTION).await?;
    tracing::info!(
        admin_id = %admin.id,
        driver_id = %response.entry.driver_id,
        amount = response.entry.amount,
        "balance deducted"
    );
    Ok((StatusCode::CREATED, Json(response)))
}

/// Lower bound (unix seconds) for a reporting period.
fn period_start(app_state: &AppState, period: Period) -> i64 {
    match period {
        Period::Today => start_of_local_day(OffsetDateTime::now_utc(), app_state.local_offset),
        Period::All => i64::MIN,
    }
}

async fn load_balance_history(
    app_state: &AppState,
    driver_id: &str,
    period: Period,
) -> Result<BalanceHistoryResponse, (StatusCode, String)> {
    let since = period_start(app_state, period);
    let conn = app_state.db.read().await;

    let driver = fetch_driver(&conn, driver_id)
        .await
        .map_err(db_failure("failed to query driver"))?
        .ok_or_else(|| not_found("Driver not found"))?;

    let mut rows = conn
        .query(
            "SELECT id, driver_id, amount, type, description, created_at FROM balance_history \
             WHERE driver_id = ? AND created_at >= ? ORDER BY created_at DESC, id ASC",
            (driver_id, since),
        )
        .await
        .map_err(db_failure("failed to query balance history"))?;

    let mut entries = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(db_failure("failed to read balance history"))?
    {
        entries.push(
            extract_balance_entry_from_row(&row).map_err(db_failure("invalid balance entry"))?,
        );
    }

    Ok(BalanceHistoryResponse {
        balance: driver.balance,
        entries,
    })
}

pub async fn my_balance_history(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<PeriodQuery>,
) -> Result<(StatusCode, Json<BalanceHistoryResponse>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    let history =
        load_balance_history(&app_state, &user.id, query.period.unwrap_or_default()).await?;
    Ok((StatusCode::OK, Json(history)))
}

pub async fn driver_balance_history(
    State(app_state): State<AppState>,
    session: Session,
    Path(driver_id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<(StatusCode, Json<BalanceHistoryResponse>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;
    let history =
        load_balance_history(&app_state, &driver_id, query.period.unwrap_or_default()).await?;
    Ok((StatusCode::OK, Json(history)))
}

pub async fn my_earnings(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<PeriodQuery>,
) -> Result<(StatusCode, Json<EarningsResponse>), (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &[Role::Driver]).await?;
    let since = period_start(&app_state, query.period.unwrap_or_default());

    let conn = app_state.db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, origin, destination, price, updated_at FROM trips \
             WHERE driver_id = ? AND status = ? AND updated_at >= ? ORDER BY updated_at DESC",
            (user.id.as_str(), TRIP_STATUS_COMPLETED, since),
        )
        .await
        .map_err(db_failure("failed to query earnings"))?;

    let mut trips = Vec::new();
    while let Some(row) = rows.next().await.map_err(db_failure("failed to read earnings"))? {
        let read = |row: &libsql::Row| -> Result<TripEarning, libsql::Error> {
            let price: f64 = row.get(3)?;
            let (commission, net) = commission_breakdown(price);
            Ok(TripEarning {
                trip_id: row.get(0)?,
                origin: row.get(1)?,
                destination: row.get(2)?,
                price,
                commission,
                net,
                completed_at: row.get(4)?,
            })
        };
        trips.push(read(&row).map_err(db_failure("invalid trip data"))?);
    }

    let total_price = round_cents(trips.iter().map(|t| t.price).sum());
    let total_commission = round_cents(trips.iter().map(|t| t.commission).sum());
    let total_net = round_cents(trips.iter().map(|t| t.net).sum());

    Ok((
        StatusCode::OK,
        Json(EarningsResponse {
            trips,
            total_price,
            total_commission,
            total_net,
        }),
    ))
}

pub async fn report_summary(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<ReportSummary>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;
    let conn = app_state.db.read().await;

    let mut trips_by_status = BTreeMap::new();
    let mut completed_revenue = 0.0;
    let mut rows = conn
        .query(
            "SELECT status, COUNT(*), COALESCE(SUM(price), 0.0) FROM trips GROUP BY status",
            (),
        )
        .await
        .map_err(db_failure("failed to summarize trips"))?;
    while let Some(row) = rows.next().await.map_err(db_failure("failed to read trips"))? {
        let status: String = row.get(0).map_err(db_failure("invalid trip summary"))?;
        let count: u32 = row.get(1).map_err(db_failure("invalid trip summary"))?;
        let revenue: f64 = row.get(2).map_err(db_failure("invalid trip summary"))?;
        if status == TRIP_STATUS_COMPLETED {
            completed_revenue = round_cents(revenue);
        }
        trips_by_status.insert(status, count);
    }

    let mut rows = conn
        .query(
            "SELECT COALESCE(SUM(-amount), 0.0) FROM balance_history WHERE type = ?",
            [BALANCE_TYPE_TRIP],
        )
        .await
        .map_err(db_failure("failed to summarize commissions"))?;
    let total_commission: f64 = match rows.next().await.map_err(db_failure("failed to read commissions"))? {
        Some(row) => row.get(0).map_err(db_failure("invalid commission summary"))?,
        None => 0.0,
    };

    let mut rows = conn
        .query(
            "SELECT COALESCE(SUM(d.balance), 0.0), \
                    COALESCE(SUM(CASE WHEN u.active THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN u.active AND d.is_on_duty THEN 1 ELSE 0 END), 0) \
             FROM driver_profiles d JOIN users u ON u.id = d.id",
            (),
        )
        .await
        .map_err(db_failure("failed to summarize drivers"))?;
    let (total_driver_balance, active_drivers, drivers_on_duty) =
        match rows.next().await.map_err(db_failure("failed to read drivers"))? {
            Some(row) => (
                row.get::<f64>(0).map_err(db_failure("invalid driver summary"))?,
                row.get::<u32>(1).map_err(db_failure("invalid driver summary"))?,
                row.get::<u32>(2).map_err(db_failure("invalid driver summary"))?,
            ),
            None => (0.0, 0, 0),
        };

    Ok((
        StatusCode::OK,
        Json(ReportSummary {
            trips_by_status,
            completed_revenue,
            total_commission: round_cents(total_commission),
            total_driver_balance: round_cents(total_driver_balance),
            active_drivers,
            drivers_on_duty,
        }),
    ))
}
