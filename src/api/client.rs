use std::sync::Arc;
use std::time::Duration;

use log::info;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::model::{
    LoginRequest, LoginResponse, MarketSegment, MarketStatsSnapshot, MarketSymbol, Notification,
    ProviderLoginUrl, ReadAllResponse, Setting, SettingUpdate, SubBroker, SupportTicket,
};
use crate::session::SessionContext;

const REQUEST_TIMEOUT_SECS: u64 = 20;

/// Typed wrappers over the platform REST API. Errors pass through to the
/// caller unchanged; nothing here decides how they are presented.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionContext>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Arc<SessionContext>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> Arc<SessionContext> {
        self.session.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let request = match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        // Failure bodies are plain message objects; fall back to the status
        // line when even that is missing.
        let message = serde_json::from_str::<crate::model::ApiMessage>(&body)
            .map(|m| m.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        Err(match status {
            StatusCode::UNAUTHORIZED => SyncError::InvalidCredentials(message),
            StatusCode::NOT_FOUND => SyncError::NotFound(message),
            _ => SyncError::Http {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.http.get(self.url(path))).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.http.post(self.url(path))).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.http.put(self.url(path)).json(body)).await
    }

    /// Authenticates and persists the returned token through the session
    /// context, so the realtime channel picks it up on its next attempt.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let response: LoginResponse = self
            .post(
                "/auth/login",
                &LoginRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;

        self.session.store_token(&response.token)?;
        info!("Logged in as {} ({})", response.user.email, response.user.role);
        Ok(response)
    }

    pub fn logout(&self) -> Result<()> {
        self.session.clear()
    }

    pub async fn market_segments(&self) -> Result<Vec<MarketSegment>> {
        self.get("/market/segments").await
    }

    pub async fn market_symbols(&self) -> Result<Vec<MarketSymbol>> {
        self.get("/market/symbols").await
    }

    pub async fn market_stats(&self) -> Result<MarketStatsSnapshot> {
        self.get("/market/stats").await
    }

    pub async fn provider_login_url(&self, provider: &str) -> Result<ProviderLoginUrl> {
        self.get(&format!("/market/login/{}/url", provider)).await
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>> {
        self.get("/notifications").await
    }

    pub async fn mark_notification_read(&self, id: Uuid) -> Result<Notification> {
        self.post_empty(&format!("/notifications/{}/read", id)).await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<ReadAllResponse> {
        self.post_empty("/notifications/read-all").await
    }

    pub async fn setting(&self, key: &str) -> Result<Setting> {
        self.get(&format!("/settings/{}", key)).await
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<Setting> {
        self.put(
            &format!("/settings/{}", key),
            &SettingUpdate {
                value: value.to_string(),
            },
        )
        .await
    }

    pub async fn sub_brokers(&self) -> Result<Vec<SubBroker>> {
        self.get("/sub-brokers").await
    }

    pub async fn dashboard_tickets(&self) -> Result<Vec<SupportTicket>> {
        self.get("/dashboard/tickets").await
    }
}
