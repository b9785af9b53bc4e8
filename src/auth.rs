use argon2::{
    Argon2, PasswordHash, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString},
};
use axum::{Json, extract::State, http::StatusCode};
use libsql::Connection;
use password_hash::rand_core::OsRng;
use tower_sessions::Session;
use uuid::Uuid;

use crate::constants::*;
use crate::models::{LoginPayload, Role, SessionUser, User};
use crate::utils::{db_error_with_context, db_failure, now_unix, validate_phone_number, validate_pin};
use crate::{AppState, Db};

pub const ALL_ROLES: [Role; 3] = [Role::Admin, Role::Operator, Role::Driver];

pub fn hash_pin(pin: &str) -> Result<String, (StatusCode, String)> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "failed to hash PIN");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash PIN".to_string(),
            )
        })
}

pub fn verify_pin(pin: &str, pin_hash: &str) -> bool {
    match PasswordHash::new(pin_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(pin.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn extract_user_from_row(row: libsql::Row) -> Result<User, (StatusCode, String)> {
    let invalid = |_: libsql::Error| db_error_with_context("invalid user data");
    let id: String = row.get(0).map_err(invalid)?;
    let phone_number: String = row.get(1).map_err(invalid)?;
    let pin_hash: String = row.get(2).map_err(invalid)?;
    let role: String = row.get(3).map_err(invalid)?;
    let active: bool = row.get(4).map_err(invalid)?;

    let role = Role::parse(&role).ok_or_else(|| db_error_with_context("unknown user role"))?;

    Ok(User {
        id,
        phone_number,
        pin_hash,
        role,
        active,
    })
}

pub async fn get_user_by_phone(
    db: &Db,
    phone_number: &str,
) -> Result<Option<User>, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, phone_number, pin_hash, role, active FROM users WHERE phone_number = ?",
            [phone_number],
        )
        .await
        .map_err(db_failure("failed to look up user"))?;

    match rows.next().await.map_err(db_failure("failed to read user"))? {
        Some(row) => Ok(Some(extract_user_from_row(row)?)),
        None => Ok(None),
    }
}

/// Returns true when a user other than `exclude_id` already owns the phone number.
pub async fn phone_number_taken(
    conn: &Connection,
    phone_number: &str,
    exclude_id: Option<&str>,
) -> libsql::Result<bool> {
    let mut rows = conn
        .query(
            "SELECT id FROM users WHERE phone_number = ? AND id != ?",
            (phone_number, exclude_id.unwrap_or("")),
        )
        .await?;
    Ok(rows.next().await?.is_some())
}

pub async fn insert_user(
    conn: &Connection,
    id: &str,
    phone_number: &str,
    pin_hash: &str,
    role: Role,
) -> libsql::Result<u64> {
    conn.execute(
        "INSERT INTO users (id, phone_number, pin_hash, role, active, created_at) VALUES (?, ?, ?, ?, TRUE, ?)",
        (id, phone_number, pin_hash, role.as_str(), now_unix()),
    )
    .await
}

/// Creates the bootstrap admin account unless an admin already exists.
/// Returns true when an account was created.
pub async fn ensure_admin(db: &Db, phone_number: &str, pin: &str) -> anyhow::Result<bool> {
    validate_phone_number(phone_number).map_err(|(_, message)| anyhow::anyhow!(message))?;
    validate_pin(pin).map_err(|(_, message)| anyhow::anyhow!(message))?;

    let conn = db.write().await;
    let mut rows = conn
        .query("SELECT id FROM users WHERE role = ?", [ROLE_ADMIN])
        .await?;
    if rows.next().await?.is_some() {
        return Ok(false);
    }
    if phone_number_taken(&conn, phone_number.trim(), None).await? {
        anyhow::bail!("ADMIN_PHONE is already used by another account");
    }

    let pin_hash = hash_pin(pin).map_err(|(_, message)| anyhow::anyhow!(message))?;
    let id = Uuid::new_v4().to_string();
    insert_user(&conn, &id, phone_number.trim(), &pin_hash, Role::Admin).await?;
    Ok(true)
}

async fn get_current_user(session: &Session) -> Result<SessionUser, (StatusCode, String)> {
    session
        .get::<SessionUser>(SESSION_USER_KEY)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ERR_INVALID_SESSION.to_string(),
            )
        })?
        .ok_or((StatusCode::UNAUTHORIZED, ERR_UNAUTHORIZED.to_string()))
}

/// Resolves the session user, checks that its role is one of `allowed` and
/// that the account is still active. Sessions of deleted or deactivated
/// accounts are flushed.
pub async fn require_role(
    db: &Db,
    session: &Session,
    allowed: &[Role],
) -> Result<SessionUser, (StatusCode, String)> {
    let user = get_current_user(session).await?;
    if !allowed.contains(&user.role) {
        return Err((StatusCode::FORBIDDEN, ERR_FORBIDDEN.to_string()));
    }

    let active = {
        let conn = db.read().await;
        let mut rows = conn
            .query("SELECT active FROM users WHERE id = ?", [user.id.as_str()])
            .await
            .map_err(db_failure("failed to look up user"))?;
        match rows.next().await.map_err(db_failure("failed to read user"))? {
            Some(row) => Some(row.get::<bool>(0).map_err(db_failure("invalid user data"))?),
            None => None,
        }
    };

    match active {
        Some(true) => Ok(user),
        Some(false) => {
            tracing::warn!(user_id = %user.id, "request rejected: inactive account");
            end_session(session).await?;
            Err((StatusCode::FORBIDDEN, ERR_ACCOUNT_INACTIVE.to_string()))
        }
        None => {
            end_session(session).await?;
            Err((StatusCode::UNAUTHORIZED, ERR_UNAUTHORIZED.to_string()))
        }
    }
}

async fn end_session(session: &Session) -> Result<(), (StatusCode, String)> {
    session.flush().await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ERR_INVALID_SESSION.to_string(),
        )
    })
}

pub async fn login(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginPayload>,
) -> Result<(StatusCode, Json<SessionUser>), (StatusCode, String)> {
    let phone_number = payload.phone_number.trim();
    if phone_number.is_empty() || payload.pin.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Phone number and PIN are required".to_string(),
        ));
    }

    let user = get_user_by_phone(&app_state.db, phone_number)
        .await?
        .ok_or((StatusCode::UNAUTHORIZED, ERR_INVALID_CREDENTIALS.to_string()))?;

    if !verify_pin(&payload.pin, &user.pin_hash) {
        tracing::warn!(user_id = %user.id, "login rejected: wrong PIN");
        return Err((StatusCode::UNAUTHORIZED, ERR_INVALID_CREDENTIALS.to_string()));
    }

    if !user.active {
        tracing::warn!(user_id = %user.id, role = %user.role, "login rejected: inactive account");
        return Err((StatusCode::FORBIDDEN, ERR_ACCOUNT_INACTIVE.to_string()));
    }

    let session_user = SessionUser {
        id: user.id,
        phone_number: user.phone_number,
        role: user.role,
    };

    session.cycle_id().await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ERR_INVALID_SESSION.to_string(),
        )
    })?;
    session
        .insert(SESSION_USER_KEY, session_user.clone())
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ERR_INVALID_SESSION.to_string(),
            )
        })?;

    tracing::info!(user_id = %session_user.id, role = %session_user.role, "user logged in");
    Ok((StatusCode::OK, Json(session_user)))
}

pub async fn me(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<Json<SessionUser>, (StatusCode, String)> {
    let user = require_role(&app_state.db, &session, &ALL_ROLES).await?;
    Ok(Json(user))
}

pub async fn logout(session: Session) -> Result<StatusCode, (StatusCode, String)> {
    end_session(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}
