//! GoogleBusinessClient and GoogleProvider against a local axum stand-in for
//! Google's endpoints.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Form, Path, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::json;

use gbp_sync::business::{
    ApiFailure, BusinessApi, BusinessEndpoints, DateRange, GoogleBusinessClient,
};
use gbp_sync::providers::{GoogleOAuthEndpoints, GoogleProvider, OAuthProvider};

const GOOD_TOKEN: &str = "ya29.good";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {GOOD_TOKEN}"))
}

async fn accounts(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match q.get("pageToken").map(String::as_str) {
        None => Json(json!({
            "accounts": [{"name": "accounts/1", "accountName": "Owner", "type": "PERSONAL"}],
            "nextPageToken": "page-2",
        }))
        .into_response(),
        Some("page-2") => Json(json!({
            "accounts": [{"name": "accounts/2", "type": "LOCATION_GROUP"}],
        }))
        .into_response(),
        Some(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn locations(
    headers: HeaderMap,
    Path(account): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match account.as_str() {
        "limited" => (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "12")]).into_response(),
        "broken" => (StatusCode::FORBIDDEN, "PERMISSION_DENIED").into_response(),
        _ if !q.contains_key("readMask") => StatusCode::BAD_REQUEST.into_response(),
        _ => Json(json!({
            "locations": [
                {"name": "locations/10", "title": "Bakery", "websiteUri": "https://bakery.example"},
                {"name": "locations/11"}
            ]
        }))
        .into_response(),
    }
}

async fn reviews(Path((_account, _location)): Path<(String, String)>) -> Response {
    Json(json!({
        "reviews": [{
            "reviewId": "r1",
            "reviewer": {"displayName": "Pat"},
            "starRating": "FIVE",
            "createTime": "2026-03-01T10:00:00Z"
        }],
        "averageRating": 5,
        "totalReviewCount": 1
    }))
    .into_response()
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
    match form.get("grant_type").map(String::as_str) {
        Some("refresh_token") if form.get("refresh_token").map(String::as_str) == Some("1//good") => {
            Json(json!({"access_token": "ya29.fresh", "expires_in": 3599, "token_type": "Bearer"}))
                .into_response()
        }
        _ => (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response(),
    }
}

async fn tokeninfo(Query(q): Query<HashMap<String, String>>) -> Response {
    if q.get("access_token").map(String::as_str) == Some(GOOD_TOKEN) {
        Json(json!({"email": "owner@example.com", "user_id": "1029384756", "expires_in": 1800}))
            .into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_token"}))).into_response()
    }
}

async fn spawn_mock() -> String {
    let app = Router::new()
        .route("/accounts", get(accounts))
        .route("/accounts/{account}/locations", get(locations))
        .route("/accounts/{account}/locations/{location}/reviews", get(reviews))
        .route("/token", post(token))
        .route("/tokeninfo", get(tokeninfo));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base: &str) -> GoogleBusinessClient {
    GoogleBusinessClient::with_endpoints(
        reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap(),
        BusinessEndpoints::single_host(base),
    )
}

fn provider(base: &str) -> GoogleProvider {
    GoogleProvider::with_endpoints(
        "client-1".into(),
        "secret".into(),
        reqwest::Client::new(),
        GoogleOAuthEndpoints {
            authorize_url: format!("{base}/auth"),
            token_url: format!("{base}/token"),
            token_info_url: format!("{base}/tokeninfo"),
        },
    )
}

#[tokio::test]
async fn accounts_follow_page_tokens() {
    let base = spawn_mock().await;
    let api = client(&base);

    let first = api.list_accounts(GOOD_TOKEN, None).await.unwrap();
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].name, "accounts/1");
    assert_eq!(first.next_page_token.as_deref(), Some("page-2"));

    let second = api.list_accounts(GOOD_TOKEN, Some("page-2")).await.unwrap();
    assert_eq!(second.items[0].name, "accounts/2");
    assert!(second.next_page_token.is_none());
}

#[tokio::test]
async fn unauthorized_maps_to_reauth_failure() {
    let base = spawn_mock().await;
    let err = client(&base)
        .list_accounts("ya29.revoked", None)
        .await
        .unwrap_err();
    assert_eq!(err, ApiFailure::Unauthorized);
}

#[tokio::test]
async fn locations_send_read_mask() {
    let base = spawn_mock().await;
    let page = client(&base)
        .list_locations(GOOD_TOKEN, "accounts/1", None)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].title.as_deref(), Some("Bakery"));
    assert!(page.items[1].title.is_none());
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let base = spawn_mock().await;
    let err = client(&base)
        .list_locations(GOOD_TOKEN, "accounts/limited", None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiFailure::RateLimited {
            retry_after: Some(Duration::from_secs(12))
        }
    );
}

#[tokio::test]
async fn other_status_keeps_upstream_code() {
    let base = spawn_mock().await;
    let err = client(&base)
        .list_locations(GOOD_TOKEN, "accounts/broken", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiFailure::Status { status: 403, ref body } if body.contains("PERMISSION_DENIED")));
}

#[tokio::test]
async fn reviews_are_listed() {
    let base = spawn_mock().await;
    let page = client(&base)
        .list_reviews(GOOD_TOKEN, "accounts/1", "locations/10", None)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].star_rating.as_deref(), Some("FIVE"));
}

#[tokio::test]
async fn unreachable_host_is_transport_failure() {
    let err = client("http://127.0.0.1:9")
        .fetch_daily_metrics(
            GOOD_TOKEN,
            "locations/10",
            DateRange {
                start: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 3, 30).unwrap(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiFailure::Transport(_)));
}

#[tokio::test]
async fn token_info_distinguishes_live_and_rejected() {
    let base = spawn_mock().await;
    let google = provider(&base);

    let info = google.token_info(GOOD_TOKEN).await.unwrap().unwrap();
    assert_eq!(info.email.as_deref(), Some("owner@example.com"));
    assert_eq!(info.subject.as_deref(), Some("1029384756"));

    assert!(google.token_info("ya29.expired").await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_succeeds_and_failures_are_provider_errors() {
    let base = spawn_mock().await;
    let google = provider(&base);

    let tokens = google.refresh_token("1//good").await.unwrap();
    assert_eq!(tokens.access_token, "ya29.fresh");
    assert_eq!(tokens.expires_in, Some(3599));
    assert!(tokens.refresh_token.is_none());

    assert!(google.refresh_token("1//revoked").await.is_err());
}
