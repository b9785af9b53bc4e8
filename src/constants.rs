// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_DATA_PATH: &str = "data";
pub const DEFAULT_UTC_OFFSET_HOURS: i8 = -4;

// Session configuration
pub const SESSION_NAME: &str = "dispatch_session";
pub const SESSION_EXPIRY_DAYS: i64 = 30;
pub const MIN_SESSION_SECRET_LENGTH: usize = 64;
pub const SESSION_USER_KEY: &str = "user";

// Roles
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_OPERATOR: &str = "operador";
pub const ROLE_DRIVER: &str = "chofer";

// Trip status FSM
pub const TRIP_STATUS_BROADCASTING: &str = "broadcasting";
pub const TRIP_STATUS_PENDING: &str = "pending";
pub const TRIP_STATUS_IN_PROGRESS: &str = "in_progress";
pub const TRIP_STATUS_COMPLETED: &str = "completed";
pub const TRIP_STATUS_CANCELLED: &str = "cancelled";

// Offer status
pub const OFFER_STATUS_PENDING: &str = "pending";
pub const OFFER_STATUS_ACCEPTED: &str = "accepted";
pub const OFFER_STATUS_REJECTED: &str = "rejected";
pub const OFFER_STATUS_EXPIRED: &str = "expired";

// Balance ledger entry types
pub const BALANCE_TYPE_RECHARGE: &str = "recarga";
pub const BALANCE_TYPE_DEDUCTION: &str = "descuento";
pub const BALANCE_TYPE_TRIP: &str = "viaje";

// Money
pub const COMMISSION_RATE: f64 = 0.1;

// Broadcasting
pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 5.0;
pub const MAX_SEARCH_RADIUS_KM: f64 = 50.0;
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// Database limits and defaults
pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;
pub const MAX_OFFSET: u32 = 1_000_000;

// Validation limits
pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_VEHICLE_LENGTH: usize = 100;
pub const MAX_ADDRESS_LENGTH: usize = 255;
pub const MAX_DESCRIPTION_LENGTH: usize = 255;
pub const MAX_IDENTITY_CARD_LENGTH: usize = 30;
pub const MIN_PHONE_LENGTH: usize = 7;
pub const MAX_PHONE_LENGTH: usize = 15;
pub const MIN_PIN_LENGTH: usize = 4;
pub const MAX_PIN_LENGTH: usize = 6;

// Agent defaults
pub const DEFAULT_DISPATCH_URL: &str = "http://localhost:3000";
pub const DEFAULT_SESSION_FILE: &str = "driver_session.json";
pub const DEFAULT_REQUEST_POLL_SECS: u64 = 10;
pub const DEFAULT_WATCH_POLL_SECS: u64 = 15;
pub const DEFAULT_LOCATION_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_MIN_DISTANCE_METERS: f64 = 10.0;

// Error messages
pub const ERR_INVALID_SESSION: &str = "Invalid session";
pub const ERR_UNAUTHORIZED: &str = "Not logged in";
pub const ERR_FORBIDDEN: &str = "Not allowed for this role";
pub const ERR_INVALID_CREDENTIALS: &str = "Invalid phone number or PIN";
pub const ERR_ACCOUNT_INACTIVE: &str = "Account is inactive";
