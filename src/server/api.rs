use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use log::{info, warn};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::model::{
    ApiMessage, LoginRequest, LoginResponse, MarketSegment, MarketStatsSnapshot, MarketSymbol,
    Notification, ProviderLoginUrl, ReadAllResponse, Setting, SettingUpdate, SubBroker,
    SupportTicket,
};
use crate::server::data::{MockStore, LOGIN_DELAY_MS, MOCK_TOKEN};

type ApiError = (StatusCode, Json<ApiMessage>);

fn error_response(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ApiMessage {
            message: message.to_string(),
        }),
    )
}

// Extract the bearer token from the Authorization header
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_str| {
            auth_str
                .strip_prefix("Bearer ")
                .map(|token| token.to_string())
        })
}

fn authenticate(headers: &HeaderMap) -> Result<(), ApiError> {
    match extract_bearer(headers) {
        Some(token) if token == MOCK_TOKEN => Ok(()),
        Some(_) => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token",
        )),
        None => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header",
        )),
    }
}

// POST /auth/login
async fn login(
    State(store): State<Arc<MockStore>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    // The platform's mock layer resolves after a fixed artificial delay.
    tokio::time::sleep(Duration::from_millis(LOGIN_DELAY_MS)).await;

    match store.check_login(&request.email, &request.password) {
        Some(response) => {
            info!("Demo login for {}", request.email);
            Ok(Json(response))
        }
        None => {
            warn!("Rejected login for {}", request.email);
            Err(error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid credentials",
            ))
        }
    }
}

// GET /notifications
async fn list_notifications(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Notification>>, ApiError> {
    authenticate(&headers)?;
    Ok(Json(store.notifications()))
}

// POST /notifications/{id}/read
async fn mark_notification_read(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    authenticate(&headers)?;

    match store.mark_read(id) {
        Some(notification) => Ok(Json(notification)),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            "Notification not found",
        )),
    }
}

// POST /notifications/read-all
async fn mark_all_notifications_read(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
) -> Result<Json<ReadAllResponse>, ApiError> {
    authenticate(&headers)?;
    let updated = store.mark_all_read();
    info!("Marked {} notifications read", updated);
    Ok(Json(ReadAllResponse { updated }))
}

// GET /settings/{key}
async fn get_setting(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<Setting>, ApiError> {
    authenticate(&headers)?;

    match store.setting(&key) {
        Some(setting) => Ok(Json(setting)),
        None => Err(error_response(StatusCode::NOT_FOUND, "Setting not found")),
    }
}

// PUT /settings/{key}
async fn put_setting(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(update): Json<SettingUpdate>,
) -> Result<Json<Setting>, ApiError> {
    authenticate(&headers)?;
    Ok(Json(store.put_setting(&key, &update.value)))
}

// GET /sub-brokers
async fn list_sub_brokers(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
) -> Result<Json<Vec<SubBroker>>, ApiError> {
    authenticate(&headers)?;
    Ok(Json(store.sub_brokers()))
}

// GET /dashboard/tickets
async fn list_tickets(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
) -> Result<Json<Vec<SupportTicket>>, ApiError> {
    authenticate(&headers)?;
    Ok(Json(store.tickets()))
}

// GET /market/segments
async fn list_segments(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
) -> Result<Json<Vec<MarketSegment>>, ApiError> {
    authenticate(&headers)?;
    Ok(Json(store.segments()))
}

// GET /market/symbols
async fn list_symbols(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
) -> Result<Json<Vec<MarketSymbol>>, ApiError> {
    authenticate(&headers)?;
    Ok(Json(store.symbols()))
}

// GET /market/stats
async fn market_stats(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
) -> Result<Json<MarketStatsSnapshot>, ApiError> {
    authenticate(&headers)?;
    Ok(Json(store.market_stats()))
}

// GET /market/login/{provider}/url
async fn provider_login_url(
    State(store): State<Arc<MockStore>>,
    headers: HeaderMap,
    Path(provider): Path<String>,
) -> Result<Json<ProviderLoginUrl>, ApiError> {
    authenticate(&headers)?;

    match store.provider_login_url(&provider) {
        Some(url) => Ok(Json(url)),
        None => Err(error_response(StatusCode::NOT_FOUND, "Unknown provider")),
    }
}

// GET /health
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "masterstroke-mock-api",
    }))
}

pub fn create_mock_router(store: Arc<MockStore>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        .route("/market/segments", get(list_segments))
        .route("/market/symbols", get(list_symbols))
        .route("/market/stats", get(market_stats))
        .route("/market/login/:provider/url", get(provider_login_url))
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route("/notifications/:id/read", post(mark_notification_read))
        .route("/settings/:key", get(get_setting).put(put_setting))
        .route("/sub-brokers", get(list_sub_brokers))
        .route("/dashboard/tickets", get(list_tickets))
        .layer(CorsLayer::permissive()) // Enable CORS for the web console
        .with_state(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("Authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(extract_bearer(&headers).as_deref(), Some("abc123"));

        headers.insert("Authorization", "Basic abc123".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn authenticate_accepts_only_the_mock_token() {
        let mut headers = HeaderMap::new();
        assert!(authenticate(&headers).is_err());

        headers.insert(
            "Authorization",
            format!("Bearer {}", MOCK_TOKEN).parse().unwrap(),
        );
        assert!(authenticate(&headers).is_ok());

        headers.insert("Authorization", "Bearer stale-token".parse().unwrap());
        assert!(authenticate(&headers).is_err());
    }
}
