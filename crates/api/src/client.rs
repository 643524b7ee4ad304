use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ApiError, FALLBACK_MESSAGE};
use crate::range::TimeRange;
use crate::session::{Credentials, Session};
use crate::types::{
    Cluster, ClusterSpec, ClusterStatus, ClustersResponse, CredentialsRequest, ErrorBody,
    LatestMetric, LoginResponse, MessageResponse, MetricsHistoryResponse, RegisterResponse,
    ServerMetric,
};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// HTTP client for the autoscaler REST API.
///
/// Every request carries the session's bearer token when one is set. A 401
/// clears the session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Session) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!(
                "{} cannot be used as a base URL",
                base_url
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// POST /auth/login, storing the returned token in the session
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = CredentialsRequest { username, password };
        let resp = self
            .send("login", self.client.post(self.url("/auth/login")).json(&body))
            .await?;
        let login: LoginResponse = resp.json().await?;

        self.session
            .set(Credentials::issued(
                login.token.clone(),
                login.username.clone(),
                login.expires_in,
                Utc::now(),
            ))
            .await;
        info!(username = %login.username, expires_in = login.expires_in, "Logged in");
        Ok(login)
    }

    /// POST /auth/register
    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<RegisterResponse, ApiError> {
        let body = CredentialsRequest { username, password };
        self.fetch(
            "register",
            self.client.post(self.url("/auth/register")).json(&body),
        )
        .await
    }

    /// GET /clusters
    pub async fn list_clusters(&self) -> Result<Vec<Cluster>, ApiError> {
        let body: ClustersResponse = self
            .fetch("list_clusters", self.client.get(self.url("/clusters")))
            .await?;
        Ok(body.clusters)
    }

    /// GET /clusters/:id
    pub async fn get_cluster(&self, id: &str) -> Result<Cluster, ApiError> {
        let url = self.cluster_url(id, &[])?;
        self.fetch("get_cluster", self.client.get(url)).await
    }

    /// POST /clusters
    pub async fn create_cluster(&self, spec: &ClusterSpec) -> Result<Cluster, ApiError> {
        spec.validate()?;
        let cluster: Cluster = self
            .fetch(
                "create_cluster",
                self.client.post(self.url("/clusters")).json(spec),
            )
            .await?;
        info!(id = %cluster.id, name = %cluster.name, "Cluster created");
        Ok(cluster)
    }

    /// PUT /clusters/:id
    pub async fn update_cluster(&self, id: &str, spec: &ClusterSpec) -> Result<Cluster, ApiError> {
        spec.validate()?;
        let url = self.cluster_url(id, &[])?;
        self.fetch("update_cluster", self.client.put(url).json(spec))
            .await
    }

    /// DELETE /clusters/:id, returning the backend's confirmation message
    pub async fn delete_cluster(&self, id: &str) -> Result<String, ApiError> {
        let url = self.cluster_url(id, &[])?;
        let body: MessageResponse = self.fetch("delete_cluster", self.client.delete(url)).await?;
        Ok(body.message)
    }

    /// GET /clusters/:id/status
    pub async fn cluster_status(&self, id: &str) -> Result<ClusterStatus, ApiError> {
        let url = self.cluster_url(id, &["status"])?;
        self.fetch("cluster_status", self.client.get(url)).await
    }

    /// GET /clusters/:id/metrics/latest
    pub async fn latest_metric(&self, id: &str) -> Result<LatestMetric, ApiError> {
        let url = self.cluster_url(id, &["metrics", "latest"])?;
        self.fetch("latest_metric", self.client.get(url)).await
    }

    /// GET /clusters/:id/metrics?from=..&limit=..
    pub async fn metrics_history(
        &self,
        id: &str,
        range: TimeRange,
    ) -> Result<Vec<ServerMetric>, ApiError> {
        let params = range.query_params(Utc::now());
        let url = self.cluster_url(id, &["metrics"])?;
        let query = [("from", params.from), ("limit", params.limit.to_string())];
        let body: MetricsHistoryResponse = self
            .fetch("metrics_history", self.client.get(url).query(&query))
            .await?;
        Ok(body.data.unwrap_or_default())
    }

    /// GET /clusters/:id/metrics/hourly?range=..
    pub async fn hourly_metrics(&self, id: &str, range: TimeRange) -> Result<Value, ApiError> {
        let url = self.cluster_url(id, &["metrics", "hourly"])?;
        self.fetch(
            "hourly_metrics",
            self.client.get(url).query(&[("range", range.as_str())]),
        )
        .await
    }

    /// GET /clusters/:id/events?range=..&limit=..
    pub async fn cluster_events(
        &self,
        id: &str,
        range: TimeRange,
        limit: u32,
    ) -> Result<Value, ApiError> {
        let url = self.cluster_url(id, &["events"])?;
        let query = [("range", range.to_string()), ("limit", limit.to_string())];
        self.fetch("cluster_events", self.client.get(url).query(&query))
            .await
    }

    /// GET /events/recent?limit=..
    pub async fn recent_events(&self, limit: u32) -> Result<Value, ApiError> {
        self.fetch(
            "recent_events",
            self.client
                .get(self.url("/events/recent"))
                .query(&[("limit", limit)]),
        )
        .await
    }

    /// GET /clusters/:id/events/stats?range=..
    pub async fn scaling_stats(&self, id: &str, range: TimeRange) -> Result<Value, ApiError> {
        let url = self.cluster_url(id, &["events", "stats"])?;
        self.fetch(
            "scaling_stats",
            self.client.get(url).query(&[("range", range.as_str())]),
        )
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// `/clusters/{id}/..` with the id escaped as a single path segment
    fn cluster_url(&self, id: &str, rest: &[&str]) -> Result<Url, ApiError> {
        if id.is_empty() {
            return Err(ApiError::InvalidRequest("cluster id is required".to_string()));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::InvalidRequest(format!("{} cannot be a base URL", self.base_url))
            })?
            .pop_if_empty()
            .push("clusters")
            .push(id)
            .extend(rest);
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        op: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let resp = self.send(op, request).await?;
        Ok(resp.json().await?)
    }

    async fn send(&self, op: &'static str, request: RequestBuilder) -> Result<Response, ApiError> {
        let request = match self.session.token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            debug!(op, %status, "Request succeeded");
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = error_message(&body);

        if status == StatusCode::UNAUTHORIZED {
            warn!(op, message = %message, "Unauthorized, clearing session");
            self.session.clear().await;
            return Err(ApiError::Unauthorized(message));
        }

        warn!(op, %status, message = %message, "Request failed");
        Err(ApiError::Status { status, message })
    }
}

/// Pull `error` out of a `{"error": ".."}` body, falling back to a generic
/// message
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error)
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}
