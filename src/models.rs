use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{ROLE_ADMIN, ROLE_DRIVER, ROLE_OPERATOR};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "operador")]
    Operator,
    #[serde(rename = "chofer")]
    Driver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => ROLE_ADMIN,
            Role::Operator => ROLE_OPERATOR,
            Role::Driver => ROLE_DRIVER,
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            ROLE_ADMIN => Some(Role::Admin),
            ROLE_OPERATOR => Some(Role::Operator),
            ROLE_DRIVER => Some(Role::Driver),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub pin_hash: String,
    pub role: Role,
    pub active: bool,
}

/// The user record kept in the server session and persisted by clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub id: String,
    pub phone_number: String,
    pub role: Role,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginPayload {
    pub phone_number: String,
    pub pin: String,
}

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DriverProfile {
    pub id: String,
    pub phone_number: String,
    pub name: String,
    pub vehicle: String,
    pub vehicle_type: String,
    pub balance: f64,
    pub is_on_duty: bool,
    pub active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateDriverPayload {
    pub phone_number: String,
    pub pin: String,
    pub name: String,
    pub vehicle: String,
    pub vehicle_type: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateDriverPayload {
    pub phone_number: Option<String>,
    pub pin: Option<String>,
    pub name: Option<String>,
    pub vehicle: Option<String>,
    pub vehicle_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SetActivePayload {
    pub active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DutyPayload {
    pub is_on_duty: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LocationPayload {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DriverLocation {
    pub driver_id: String,
    pub name: String,
    pub vehicle: String,
    pub vehicle_type: String,
    pub lat: f64,
    pub lng: f64,
    pub updated_at: i64,
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OperatorProfile {
    pub id: String,
    pub phone_number: String,
    pub name: String,
    pub identity_card: String,
    pub active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateOperatorPayload {
    pub phone_number: String,
    pub pin: String,
    pub name: String,
    pub identity_card: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateOperatorPayload {
    pub phone_number: Option<String>,
    pub pin: Option<String>,
    pub name: Option<String>,
    pub identity_card: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ---------------------------------------------------------------------------
// Trips
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Trip {
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub price: f64,
    pub status: String,
    pub driver_id: Option<String>,
    pub operator_id: String,
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub search_radius_km: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateTripPayload {
    pub origin: String,
    pub destination: String,
    pub price: f64,
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub search_radius_km: Option<f64>,
    pub driver_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateTripResponse {
    pub trip: Trip,
    pub drivers_notified: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TripView {
    #[serde(flatten)]
    pub trip: Trip,
    pub commission: f64,
    pub net: f64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ListTripsQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ListTripsResponse {
    pub trips: Vec<TripView>,
    pub total_count: u32,
}

/// An open trip offer addressed to one driver.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub id: String,
    pub trip_id: String,
    pub origin: String,
    pub destination: String,
    pub price: f64,
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RequestDecisionResponse {
    pub request_id: String,
    pub status: String,
    pub trip: Trip,
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BalanceEntry {
    pub id: String,
    pub driver_id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub description: String,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BalanceAdjustmentPayload {
    pub amount: f64,
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BalanceAdjustmentResponse {
    pub balance: f64,
    pub entry: BalanceEntry,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    #[default]
    All,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PeriodQuery {
    pub period: Option<Period>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BalanceHistoryResponse {
    pub balance: f64,
    pub entries: Vec<BalanceEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TripEarning {
    pub trip_id: String,
    pub origin: String,
    pub destination: String,
    pub price: f64,
    pub commission: f64,
    pub net: f64,
    pub completed_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EarningsResponse {
    pub trips: Vec<TripEarning>,
    pub total_price: f64,
    pub total_commission: f64,
    pub total_net: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReportSummary {
    pub trips_by_status: BTreeMap<String, u32>,
    pub completed_revenue: f64,
    pub total_commission: f64,
    pub total_driver_balance: f64,
    pub active_drivers: u32,
    pub drivers_on_duty: u32,
}
