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
    CreateOperatorPayload, ListQuery, OperatorProfile, Role, SetActivePayload,
    UpdateOperatorPayload,
};
use crate::utils::{
    conflict, db_error_with_context, db_failure, not_found, validate_limit, validate_offset,
    validate_phone_number, validate_pin, validate_string_length,
};
use crate::{AppState, TransactionError, with_transaction};

const SELECT_OPERATOR: &str = "SELECT u.id, u.phone_number, o.name, o.identity_card, u.active \
     FROM operator_profiles o JOIN users u ON u.id = o.id";

fn extract_operator_from_row(row: &libsql::Row) -> Result<OperatorProfile, libsql::Error> {
    Ok(OperatorProfile {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        name: row.get(2)?,
        identity_card: row.get(3)?,
        active: row.get(4)?,
    })
}

pub async fn fetch_operator(
    conn: &Connection,
    operator_id: &str,
) -> Result<Option<OperatorProfile>, libsql::Error> {
    let mut rows = conn
        .query(&format!("{} WHERE o.id = ?", SELECT_OPERATOR), [operator_id])
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(extract_operator_from_row(&row)?)),
        None => Ok(None),
    }
}

fn validate_operator_fields(
    name: Option<&str>,
    identity_card: Option<&str>,
) -> Result<(), (StatusCode, String)> {
    if let Some(name) = name {
        validate_string_length(name, "Name", MAX_NAME_LENGTH)?;
    }
    if let Some(identity_card) = identity_card {
        validate_string_length(identity_card, "Identity card", MAX_IDENTITY_CARD_LENGTH)?;
    }
    Ok(())
}

enum OperatorWriteError {
    Transaction(TransactionError),
    Db(&'static str, libsql::Error),
    PhoneTaken,
    NotFound,
    HasTrips,
}

impl From<TransactionError> for OperatorWriteError {
    fn from(e: TransactionError) -> Self {
        OperatorWriteError::Transaction(e)
    }
}

impl From<OperatorWriteError> for (StatusCode, String) {
    fn from(e: OperatorWriteError) -> Self {
        match e {
            OperatorWriteError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            OperatorWriteError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            OperatorWriteError::Db(context, err) => db_failure(context)(err),
            OperatorWriteError::PhoneTaken => conflict("Phone number already registered"),
            OperatorWriteError::NotFound => not_found("Operator not found"),
            OperatorWriteError::HasTrips => {
                conflict("Operator has created trips; deactivate the account instead")
            }
        }
    }
}

pub async fn create_operator(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateOperatorPayload>,
) -> Result<(StatusCode, Json<OperatorProfile>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;
    validate_phone_number(&payload.phone_number)?;
    validate_pin(&payload.pin)?;
    validate_operator_fields(
        Some(payload.name.as_str()),
        Some(payload.identity_card.as_str()),
    )?;

    let pin_hash = hash_pin(&payload.pin)?;
    let operator = OperatorProfile {
        id: Uuid::new_v4().to_string(),
        phone_number: payload.phone_number.trim().to_string(),
        name: payload.name.trim().to_string(),
        identity_card: payload.identity_card.trim().to_string(),
        active: true,
    };

    let created = operator.clone();
    with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            if phone_number_taken(conn, &created.phone_number, None)
                .await
                .map_err(|e| OperatorWriteError::Db("failed to check phone number", e))?
            {
                return Err(OperatorWriteError::PhoneTaken);
            }
            insert_user(conn, &created.id, &created.phone_number, &pin_hash, Role::Operator)
                .await
                .map_err(|e| OperatorWriteError::Db("operator account creation failed", e))?;
            conn.execute(
                "INSERT INTO operator_profiles (id, name, identity_card) VALUES (?, ?, ?)",
                (
                    created.id.as_str(),
                    created.name.as_str(),
                    created.identity_card.as_str(),
                ),
            )
            .await
            .map_err(|e| OperatorWriteError::Db("operator profile creation failed", e))?;
            Ok(())
        })
    })
    .await
    .map_err(|e: OperatorWriteError| -> (StatusCode, String) { e.into() })?;

    tracing::info!(operator_id = %operator.id, "operator created");
    Ok((StatusCode::CREATED, Json(operator)))
}

pub async fn list_operators(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<ListQuery>,
) -> Result<(StatusCode, Json<Vec<OperatorProfile>>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;
    let limit = validate_limit(query.limit, DEFAULT_LIST_LIMIT)?;
    let offset = validate_offset(query.offset)?;

    let conn = app_state.db.read().await;
    let mut rows = conn
        .query(
            &format!("{} ORDER BY o.name ASC LIMIT ? OFFSET ?", SELECT_OPERATOR),
            (limit, offset),
        )
        .await
        .map_err(db_failure("failed to query operators"))?;

    let mut operators = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(db_failure("failed to read operators"))?
    {
        operators
            .push(extract_operator_from_row(&row).map_err(db_failure("invalid operator data"))?);
    }

    Ok((StatusCode::OK, Json(operators)))
}

pub async fn get_operator(
    State(app_state): State<AppState>,
    session: Session,
    Path(operator_id): Path<String>,
) -> Result<(StatusCode, Json<OperatorProfile>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;
    let conn = app_state.db.read().await;
    let operator = fetch_operator(&conn, &operator_id)
        .await
        .map_err(db_failure("failed to query operator"))?
        .ok_or_else(|| not_found("Operator not found"))?;
    Ok((StatusCode::OK, Json(operator)))
}

pub async fn update_operator(
    State(app_state): State<AppState>,
    session: Session,
    Path(operator_id): Path<String>,
    Json(payload): Json<UpdateOperatorPayload>,
) -> Result<(StatusCode, Json<OperatorProfile>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;

    if payload.phone_number.is_none()
        && payload.pin.is_none()
        && payload.name.is_none()
        && payload.identity_card.is_none()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one field must be provided for update".to_string(),
        ));
    }
    if let Some(ref phone_number) = payload.phone_number {
        validate_phone_number(phone_number)?;
    }
    validate_operator_fields(payload.name.as_deref(), payload.identity_card.as_deref())?;
    let pin_hash = match payload.pin {
        Some(ref pin) => {
            validate_pin(pin)?;
            Some(hash_pin(pin)?)
        }
        None => None,
    };

    let updated = with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            let mut operator = fetch_operator(conn, &operator_id)
                .await
                .map_err(|e| OperatorWriteError::Db("failed to query operator", e))?
                .ok_or(OperatorWriteError::NotFound)?;

            if let Some(phone_number) = payload.phone_number {
                let phone_number = phone_number.trim().to_string();
                if phone_number_taken(conn, &phone_number, Some(operator.id.as_str()))
                    .await
                    .map_err(|e| OperatorWriteError::Db("failed to check phone number", e))?
                {
                    return Err(OperatorWriteError::PhoneTaken);
                }
                operator.phone_number = phone_number;
            }
            if let Some(name) = payload.name {
                operator.name = name.trim().to_string();
            }
            if let Some(identity_card) = payload.identity_card {
                operator.identity_card = identity_card.trim().to_string();
            }

            conn.execute(
                "UPDATE users SET phone_number = ? WHERE id = ?",
                (operator.phone_number.as_str(), operator.id.as_str()),
            )
            .await
            .map_err(|e| OperatorWriteError::Db("failed to update operator account", e))?;
            if let Some(pin_hash) = pin_hash {
                conn.execute(
                    "UPDATE users SET pin_hash = ? WHERE id = ?",
                    (pin_hash.as_str(), operator.id.as_str()),
                )
                .await
                .map_err(|e| OperatorWriteError::Db("failed to update operator PIN", e))?;
            }
            conn.execute(
                "UPDATE operator_profiles SET name = ?, identity_card = ? WHERE id = ?",
                (
                    operator.name.as_str(),
                    operator.identity_card.as_str(),
                    operator.id.as_str(),
                ),
            )
            .await
            .map_err(|e| OperatorWriteError::Db("failed to update operator profile", e))?;

            Ok(operator)
        })
    })
    .await
    .map_err(|e: OperatorWriteError| -> (StatusCode, String) { e.into() })?;

    Ok((StatusCode::OK, Json(updated)))
}

pub async fn set_operator_active(
    State(app_state): State<AppState>,
    session: Session,
    Path(operator_id): Path<String>,
    Json(payload): Json<SetActivePayload>,
) -> Result<(StatusCode, Json<OperatorProfile>), (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;

    let conn = app_state.db.write().await;
    let affected = conn
        .execute(
            "UPDATE users SET active = ? WHERE id = ? AND role = ?",
            (payload.active, operator_id.as_str(), ROLE_OPERATOR),
        )
        .await
        .map_err(db_failure("failed to update operator status"))?;
    if affected == 0 {
        return Err(not_found("Operator not found"));
    }

    let operator = fetch_operator(&conn, &operator_id)
        .await
        .map_err(db_failure("failed to query operator"))?
        .ok_or_else(|| not_found("Operator not found"))?;
    Ok((StatusCode::OK, Json(operator)))
}

pub async fn delete_operator(
    State(app_state): State<AppState>,
    session: Session,
    Path(operator_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    require_role(&app_state.db, &session, &[Role::Admin]).await?;

    with_transaction(&app_state.db, |conn| {
        Box::pin(async move {
            fetch_operator(conn, &operator_id)
                .await
                .map_err(|e| OperatorWriteError::Db("failed to query operator", e))?
                .ok_or(OperatorWriteError::NotFound)?;

            let mut rows = conn
                .query(
                    "SELECT id FROM trips WHERE operator_id = ? LIMIT 1",
                    [operator_id.as_str()],
                )
                .await
                .map_err(|e| OperatorWriteError::Db("failed to check operator trips", e))?;
            if rows
                .next()
                .await
                .map_err(|e| OperatorWriteError::Db("failed to check operator trips", e))?
                .is_some()
            {
                return Err(OperatorWriteError::HasTrips);
            }

            conn.execute(
                "DELETE FROM operator_profiles WHERE id = ?",
                [operator_id.as_str()],
            )
            .await
            .map_err(|e| OperatorWriteError::Db("failed to delete operator", e))?;
            conn.execute("DELETE FROM users WHERE id = ?", [operator_id.as_str()])
                .await
                .map_err(|e| OperatorWriteError::Db("failed to delete operator", e))?;
            Ok(())
        })
    })
    .await
    .map_err(|e: OperatorWriteError| -> (StatusCode, String) { e.into() })?;

    Ok(StatusCode::NO_CONTENT)
}
