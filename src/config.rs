use time::UtcOffset;

use crate::constants::*;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub data_path: String,
    pub session_secret: String,
    pub local_offset: UtcOffset,
    pub admin_phone: Option<String>,
    pub admin_pin: Option<String>,
    pub production: bool,
    pub frontend_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let host = std::env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = std::env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        port.parse::<u16>()
            .map_err(|_| format!("PORT must be a valid port number, got '{}'", port))?;

        let data_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());

        let session_secret = std::env::var("SESSION_SECRET")
            .map_err(|_| "SESSION_SECRET environment variable is required".to_string())?;
        if session_secret.len() < MIN_SESSION_SECRET_LENGTH {
            return Err(format!(
                "SESSION_SECRET must be at least {} characters",
                MIN_SESSION_SECRET_LENGTH
            ));
        }

        let offset_hours = match std::env::var("LOCAL_UTC_OFFSET_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<i8>()
                .map_err(|_| format!("LOCAL_UTC_OFFSET_HOURS must be an integer, got '{}'", raw))?,
            Err(_) => DEFAULT_UTC_OFFSET_HOURS,
        };
        let local_offset = parse_offset_hours(offset_hours)?;

        let admin_phone = std::env::var("ADMIN_PHONE").ok().filter(|v| !v.trim().is_empty());
        let admin_pin = std::env::var("ADMIN_PIN").ok().filter(|v| !v.trim().is_empty());
        if admin_phone.is_some() != admin_pin.is_some() {
            return Err("ADMIN_PHONE and ADMIN_PIN must be set together".to_string());
        }

        let production = std::env::var("PRODUCTION")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);

        let frontend_origin = std::env::var("FRONTEND_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        Ok(Self {
            host,
            port,
            data_path,
            session_secret,
            local_offset,
            admin_phone,
            admin_pin,
            production,
            frontend_origin,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn parse_offset_hours(hours: i8) -> Result<UtcOffset, String> {
    UtcOffset::from_hms(hours, 0, 0)
        .map_err(|_| format!("UTC offset out of range: {} hours", hours))
}
