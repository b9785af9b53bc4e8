use axum::http::StatusCode;
use time::{OffsetDateTime, Time, UtcOffset};

use crate::constants::*;

pub fn db_error_with_context(context: &str) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {}", context),
    )
}

/// Logs the underlying libsql error and masks it behind a contextual message.
pub fn db_failure(context: &'static str) -> impl FnOnce(libsql::Error) -> (StatusCode, String) {
    move |e| {
        tracing::error!(error = %e, context, "database error");
        db_error_with_context(context)
    }
}

pub fn bad_request(message: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.into())
}

pub fn not_found(message: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, message.into())
}

pub fn conflict(message: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::CONFLICT, message.into())
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Unix timestamp of the most recent local midnight at or before `now`.
pub fn start_of_local_day(now: OffsetDateTime, offset: UtcOffset) -> i64 {
    now.to_offset(offset)
        .replace_time(Time::MIDNIGHT)
        .unix_timestamp()
}

pub fn validate_string_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} cannot be empty", field_name)));
    }
    if value.len() > max_length {
        return Err(bad_request(format!(
            "{} must be less than {} characters",
            field_name, max_length
        )));
    }
    Ok(())
}

pub fn validate_phone_number(phone: &str) -> Result<(), (StatusCode, String)> {
    let phone = phone.trim();
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if digits.len() < MIN_PHONE_LENGTH || digits.len() > MAX_PHONE_LENGTH {
        return Err(bad_request(format!(
            "Phone number must have between {} and {} digits",
            MIN_PHONE_LENGTH, MAX_PHONE_LENGTH
        )));
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad_request("Phone number must contain only digits"));
    }
    Ok(())
}

pub fn validate_pin(pin: &str) -> Result<(), (StatusCode, String)> {
    if pin.len() < MIN_PIN_LENGTH || pin.len() > MAX_PIN_LENGTH {
        return Err(bad_request(format!(
            "PIN must have between {} and {} digits",
            MIN_PIN_LENGTH, MAX_PIN_LENGTH
        )));
    }
    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad_request("PIN must contain only digits"));
    }
    Ok(())
}

pub fn validate_coordinates(lat: f64, lng: f64) -> Result<(), (StatusCode, String)> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(bad_request("Latitude must be between -90 and 90"));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(bad_request("Longitude must be between -180 and 180"));
    }
    Ok(())
}

pub fn validate_positive_amount(amount: f64, field_name: &str) -> Result<(), (StatusCode, String)> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(bad_request(format!(
            "{} must be a positive number",
            field_name
        )));
    }
    Ok(())
}

pub fn validate_limit(limit: Option<u32>, default: u32) -> Result<u32, (StatusCode, String)> {
    match limit {
        Some(0) => Err(bad_request("Limit must be greater than 0")),
        Some(l) if l > MAX_LIMIT => Err(bad_request(format!("Limit cannot exceed {}", MAX_LIMIT))),
        Some(l) => Ok(l),
        None => Ok(default),
    }
}

pub fn validate_offset(offset: Option<u32>) -> Result<u32, (StatusCode, String)> {
    match offset {
        Some(o) if o > MAX_OFFSET => Err(bad_request(format!(
            "Offset cannot exceed {}",
            MAX_OFFSET
        ))),
        Some(o) => Ok(o),
        None => Ok(0),
    }
}

pub fn validate_trip_transition(from: &str, to: &str) -> Result<(), String> {
    match (from, to) {
        (TRIP_STATUS_BROADCASTING, TRIP_STATUS_PENDING) => Ok(()),
        (TRIP_STATUS_BROADCASTING, TRIP_STATUS_CANCELLED) => Ok(()),
        (TRIP_STATUS_PENDING, TRIP_STATUS_IN_PROGRESS) => Ok(()),
        (TRIP_STATUS_PENDING, TRIP_STATUS_CANCELLED) => Ok(()),
        (TRIP_STATUS_IN_PROGRESS, TRIP_STATUS_COMPLETED) => Ok(()),
        (TRIP_STATUS_IN_PROGRESS, TRIP_STATUS_CANCELLED) => Ok(()),
        _ => Err(format!("Invalid trip transition from {} to {}", from, to)),
    }
}

pub fn is_trip_status(value: &str) -> bool {
    matches!(
        value,
        TRIP_STATUS_BROADCASTING
            | TRIP_STATUS_PENDING
            | TRIP_STATUS_IN_PROGRESS
            | TRIP_STATUS_COMPLETED
            | TRIP_STATUS_CANCELLED
    )
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Splits a trip price into the platform commission and the driver's net,
/// both rounded to cents. The net absorbs any rounding remainder so the two
/// parts always add up to the rounded price.
pub fn commission_breakdown(price: f64) -> (f64, f64) {
    let commission = round_cents(price * COMMISSION_RATE);
    let net = round_cents(round_cents(price) - commission);
    (commission, net)
}

/// Great-circle distance between two coordinates in kilometres.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
