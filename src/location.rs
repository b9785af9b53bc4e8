//! Client-side duty location reporting.

use std::path::Path;

use anyhow::{Context, Result};

use crate::models::LocationPayload;
use crate::utils::haversine_km;

/// Supplies device positions to the location loop.
pub trait PositionSource: Send {
    fn next_fix(&mut self) -> Option<LocationPayload>;
}

/// Always reports the same coordinates.
pub struct FixedPosition(pub LocationPayload);

impl PositionSource for FixedPosition {
    fn next_fix(&mut self) -> Option<LocationPayload> {
        Some(self.0)
    }
}

/// Replays `lat,lng` lines from a file, cycling back to the start.
pub struct ReplayPositions {
    fixes: Vec<LocationPayload>,
    cursor: usize,
}

impl ReplayPositions {
    pub fn new(fixes: Vec<LocationPayload>) -> Self {
        Self { fixes, cursor: 0 }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read positions file {}", path.display()))?;
        let fixes = parse_positions(&raw)?;
        if fixes.is_empty() {
            anyhow::bail!("positions file {} has no coordinates", path.display());
        }
        Ok(Self::new(fixes))
    }
}

impl PositionSource for ReplayPositions {
    fn next_fix(&mut self) -> Option<LocationPayload> {
        if self.fixes.is_empty() {
            return None;
        }
        let fix = self.fixes[self.cursor % self.fixes.len()];
        self.cursor += 1;
        Some(fix)
    }
}

/// Parses one `lat,lng` pair per line; blank lines and `#` comments are skipped.
pub fn parse_positions(raw: &str) -> Result<Vec<LocationPayload>> {
    raw.lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            let (lat, lng) = line
                .split_once(',')
                .with_context(|| format!("line {}: expected 'lat,lng'", n))?;
            let lat = lat
                .trim()
                .parse::<f64>()
                .with_context(|| format!("line {}: invalid latitude", n))?;
            let lng = lng
                .trim()
                .parse::<f64>()
                .with_context(|| format!("line {}: invalid longitude", n))?;
            Ok(LocationPayload { lat, lng })
        })
        .collect()
}

/// What the loop should do after a failed update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// First failure: warn once and switch to offline mode.
    EnteredOffline,
    /// Already offline: stay quiet.
    StillOffline,
}

/// Distance filter plus the offline flag of the duty location loop.
///
/// While offline only the most recent unsent fix is kept; it is re-sent on the
/// next tick and a successful send clears offline mode.
#[derive(Debug)]
pub struct LocationTracker {
    min_distance_m: f64,
    last_sent: Option<LocationPayload>,
    unsent: Option<LocationPayload>,
    offline: bool,
}

impl LocationTracker {
    pub fn new(min_distance_m: f64) -> Self {
        Self {
            min_distance_m,
            last_sent: None,
            unsent: None,
            offline: false,
        }
    }

    /// Picks the fix to send this tick, if any: a newer fix that moved far
    /// enough, otherwise a fix left unsent by an earlier failure.
    pub fn next_to_send(&mut self, fix: Option<LocationPayload>) -> Option<LocationPayload> {
        if let Some(fix) = fix {
            let moved = match self.last_sent {
                Some(last) => {
                    haversine_km(last.lat, last.lng, fix.lat, fix.lng) * 1000.0
                        >= self.min_distance_m
                }
                None => true,
            };
            if moved {
                self.unsent = Some(fix);
            }
        }
        self.unsent
    }

    pub fn record_success(&mut self, fix: LocationPayload) {
        self.last_sent = Some(fix);
        self.unsent = None;
        self.offline = false;
    }

    pub fn record_failure(&mut self, fix: LocationPayload) -> FailureOutcome {
        self.unsent = Some(fix);
        if self.offline {
            FailureOutcome::StillOffline
        } else {
            self.offline = true;
            FailureOutcome::EnteredOffline
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn last_sent(&self) -> Option<LocationPayload> {
        self.last_sent
    }
}
