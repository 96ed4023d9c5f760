//! Outbound REST helper for a single node.
//!
//! Thin wrapper over the node's HTTP surface: track loading/decoding and the
//! route planner. Transport errors propagate to the caller; no retries are
//! performed here.

use std::time::Duration;

use cadenza_proto::{LoadResponse, TrackInfo};
use reqwest::header::AUTHORIZATION;
use reqwest::redirect::Policy;
use serde_json::json;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::node::NodeConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RestClient {
    http: reqwest::Client,
    base: String,
    password: String,
}

impl RestClient {
    pub(crate) fn new(config: &NodeConfig) -> Result<Self> {
        let redirect = if config.follow_redirects {
            Policy::limited(10)
        } else {
            Policy::none()
        };
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(redirect)
            .build()?;

        let scheme = if config.secure { "https" } else { "http" };
        Ok(Self {
            http,
            base: format!("{}://{}:{}", scheme, config.host, config.port),
            password: config.password.clone(),
        })
    }

    /// `GET /loadtracks` — resolve a search query or URI into tracks.
    pub async fn load_tracks(&self, identifier: &str) -> Result<LoadResponse> {
        debug!(identifier, "loading tracks");
        let response = self
            .http
            .get(format!("{}/loadtracks", self.base))
            .query(&[("identifier", identifier)])
            .header(AUTHORIZATION, &self.password)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// `GET /decodetrack` — expand an encoded track back into metadata.
    /// The node answers 500 when it cannot decode, which maps to NoResults.
    pub async fn decode_track(&self, encoded: &str) -> Result<TrackInfo> {
        let response = self
            .http
            .get(format!("{}/decodetrack", self.base))
            .query(&[("track", encoded)])
            .header(AUTHORIZATION, &self.password)
            .send()
            .await?;

        if response.status().as_u16() == 500 {
            return Err(ClientError::NoResults(encoded.to_string()));
        }

        Ok(response.error_for_status()?.json().await?)
    }

    /// `GET /routeplanner/status`
    pub async fn route_planner_status(&self) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}/routeplanner/status", self.base))
            .header(AUTHORIZATION, &self.password)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// `POST /routeplanner/free/address` — unmark one failing address.
    pub async fn route_planner_free_address(&self, address: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/routeplanner/free/address", self.base))
            .header(AUTHORIZATION, &self.password)
            .json(&json!({ "address": address }))
            .send()
            .await?;

        match response.status().as_u16() {
            204 => Ok(()),
            status => Err(ClientError::UnexpectedStatus(status)),
        }
    }

    /// `POST /routeplanner/free/all` — unmark every failing address.
    pub async fn route_planner_free_all(&self) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/routeplanner/free/all", self.base))
            .header(AUTHORIZATION, &self.password)
            .send()
            .await?;

        match response.status().as_u16() {
            204 => Ok(()),
            status => Err(ClientError::UnexpectedStatus(status)),
        }
    }
}
