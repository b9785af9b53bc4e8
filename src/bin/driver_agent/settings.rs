use std::time::Duration;

use taxi_dispatch::constants::*;
use taxi_dispatch::models::LocationPayload;

use crate::AgentError;

pub struct AgentSettings {
    pub dispatch_url: String,
    pub phone_number: String,
    pub pin: String,
    pub session_file: String,
    pub positions_file: Option<String>,
    pub fixed_position: Option<LocationPayload>,
    pub request_poll: Duration,
    pub watch_poll: Duration,
    pub location_interval: Duration,
    pub min_distance_m: f64,
    pub auto_accept: bool,
}

fn seconds_from_env(name: &str, default: u64) -> Result<Duration, AgentError> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("{} must be a whole number of seconds", name))?;
            if secs == 0 {
                return Err(format!("{} must be greater than 0", name).into());
            }
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

impl AgentSettings {
    pub fn from_env() -> Result<Self, AgentError> {
        let dispatch_url =
            std::env::var("DISPATCH_URL").unwrap_or_else(|_| DEFAULT_DISPATCH_URL.to_string());
        let phone_number =
            std::env::var("DRIVER_PHONE").map_err(|_| "DRIVER_PHONE is required")?;
        let pin = std::env::var("DRIVER_PIN").map_err(|_| "DRIVER_PIN is required")?;
        let session_file =
            std::env::var("SESSION_FILE").unwrap_or_else(|_| DEFAULT_SESSION_FILE.to_string());

        let positions_file = std::env::var("POSITIONS_FILE").ok();
        let fixed_position = match std::env::var("FIXED_POSITION") {
            Ok(raw) => {
                let parsed = taxi_dispatch::location::parse_positions(&raw)
                    .map_err(|e| format!("FIXED_POSITION: {}", e))?;
                Some(
                    parsed
                        .into_iter()
                        .next()
                        .ok_or("FIXED_POSITION must be 'lat,lng'")?,
                )
            }
            Err(_) => None,
        };
        if positions_file.is_none() && fixed_position.is_none() {
            return Err("Either POSITIONS_FILE or FIXED_POSITION is required".into());
        }

        let min_distance_m = match std::env::var("MIN_DISTANCE_METERS") {
            Ok(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| "MIN_DISTANCE_METERS must be a number")?,
            Err(_) => DEFAULT_MIN_DISTANCE_METERS,
        };

        let auto_accept = std::env::var("AUTO_ACCEPT")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            dispatch_url,
            phone_number,
            pin,
            session_file,
            positions_file,
            fixed_position,
            request_poll: seconds_from_env("REQUEST_POLL_SECS", DEFAULT_REQUEST_POLL_SECS)?,
            watch_poll: seconds_from_env("WATCH_POLL_SECS", DEFAULT_WATCH_POLL_SECS)?,
            location_interval: seconds_from_env(
                "LOCATION_INTERVAL_SECS",
                DEFAULT_LOCATION_INTERVAL_SECS,
            )?,
            min_distance_m,
            auto_accept,
        })
    }
}
