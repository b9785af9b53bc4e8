//! HTTP client for the dispatch API, used by the driver agent.
//!
//! Session cookies are kept in the client's cookie store, so a single
//! `DispatchClient` behaves like one logged-in device.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{
    BalanceHistoryResponse, DriverProfile, DutyPayload, EarningsResponse, ListTripsResponse,
    LocationPayload, LoginPayload, PendingRequest, Period, RequestDecisionResponse, SessionUser,
    TripView,
};
use crate::navigation::NavigationResponse;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: StatusCode, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Clone)]
pub struct DispatchClient {
    http: Client,
    base_url: String,
}

fn period_param(period: Period) -> &'static str {
    match period {
        Period::Today => "today",
        Period::All => "all",
    }
}

impl DispatchClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(request: RequestBuilder) -> ClientResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Request failed".to_string());
        Err(ClientError::Status { status, message })
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> ClientResult<T> {
        Ok(Self::check(request).await?.json::<T>().await?)
    }

    async fn send_empty(request: RequestBuilder) -> ClientResult<()> {
        Self::check(request).await?;
        Ok(())
    }

    // Auth API

    pub async fn login(&self, phone_number: &str, pin: &str) -> ClientResult<SessionUser> {
        let payload = LoginPayload {
            phone_number: phone_number.to_string(),
            pin: pin.to_string(),
        };
        Self::send(self.http.post(self.url("/auth/login")).json(&payload)).await
    }

    pub async fn me(&self) -> ClientResult<SessionUser> {
        Self::send(self.http.get(self.url("/auth/me"))).await
    }

    pub async fn logout(&self) -> ClientResult<()> {
        Self::send_empty(self.http.post(self.url("/auth/logout"))).await
    }

    pub async fn navigation(&self) -> ClientResult<NavigationResponse> {
        Self::send(self.http.get(self.url("/navigation"))).await
    }

    // Driver API

    pub async fn my_profile(&self) -> ClientResult<DriverProfile> {
        Self::send(self.http.get(self.url("/drivers/me"))).await
    }

    pub async fn set_duty(&self, is_on_duty: bool) -> ClientResult<DriverProfile> {
        Self::send(
            self.http
                .put(self.url("/drivers/me/duty"))
                .json(&DutyPayload { is_on_duty }),
        )
        .await
    }

    pub async fn update_location(&self, lat: f64, lng: f64) -> ClientResult<()> {
        Self::send_empty(
            self.http
                .post(self.url("/drivers/me/location"))
                .json(&LocationPayload { lat, lng }),
        )
        .await
    }

    pub async fn balance_history(&self, period: Period) -> ClientResult<BalanceHistoryResponse> {
        Self::send(
            self.http
                .get(self.url("/drivers/me/balance-history"))
                .query(&[("period", period_param(period))]),
        )
        .await
    }

    pub async fn earnings(&self, period: Period) -> ClientResult<EarningsResponse> {
        Self::send(
            self.http
                .get(self.url("/drivers/me/earnings"))
                .query(&[("period", period_param(period))]),
        )
        .await
    }

    // Trips API

    pub async fn pending_requests(&self) -> ClientResult<Vec<PendingRequest>> {
        Self::send(self.http.get(self.url("/trips/requests/pending"))).await
    }

    pub async fn accept_request(&self, request_id: &str) -> ClientResult<RequestDecisionResponse> {
        Self::send(
            self.http
                .post(self.url(&format!("/trips/requests/{}/accept", request_id))),
        )
        .await
    }

    pub async fn reject_request(&self, request_id: &str) -> ClientResult<RequestDecisionResponse> {
        Self::send(
            self.http
                .post(self.url(&format!("/trips/requests/{}/reject", request_id))),
        )
        .await
    }

    pub async fn my_trips(&self, status: Option<&str>) -> ClientResult<ListTripsResponse> {
        let mut request = self.http.get(self.url("/trips"));
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        Self::send(request).await
    }

    pub async fn start_trip(&self, trip_id: &str) -> ClientResult<TripView> {
        Self::send(self.http.post(self.url(&format!("/trips/{}/start", trip_id)))).await
    }

    pub async fn complete_trip(&self, trip_id: &str) -> ClientResult<TripView> {
        Self::send(
            self.http
                .post(self.url(&format!("/trips/{}/complete", trip_id))),
        )
        .await
    }
}
