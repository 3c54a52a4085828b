//! Replicache pull endpoint
//!
//! Serves `POST /replicache/pull1`. Clients speaking another pull version are
//! redirected to the configured legacy endpoint.

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::cvr::{PullRequest, PullResponse, PULL_VERSION};
use crate::error::{AppError, Result, SyncError};
use crate::state::AppState;

/// Create the replicache router
pub fn router() -> Router<AppState> {
    Router::new().route("/pull1", post(pull))
}

async fn pull(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<PullResponse>> {
    let actor = state
        .actors()
        .resolve(&headers)
        .await?
        .ok_or_else(|| AppError::Unauthorized("No actor for request".to_string()))?;

    // Older protocol bodies do not share our shape, so check the version first
    let version = body.get("pullVersion").and_then(Value::as_i64);
    if version != Some(PULL_VERSION) {
        return Err(redirect(&state, version.unwrap_or_default()));
    }

    let req: PullRequest = serde_json::from_value(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid pull request: {}", e)))?;

    let span = tracing::info_span!(
        "pull",
        request_id = %Uuid::new_v4(),
        client_group_id = %req.client_group_id,
        cookie = ?req.cookie,
        actor = ?actor.kind(),
    );

    let outcome = match state.orchestrator().pull(&actor, &req).instrument(span).await {
        Ok(outcome) => outcome,
        Err(SyncError::UnsupportedPullVersion(version)) => return Err(redirect(&state, version)),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(outcome.into_response()))
}

fn redirect(state: &AppState, version: i64) -> AppError {
    AppError::ProtocolVersionMismatch {
        version,
        location: state.config().sync.redirect_location.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, HeaderName, HeaderValue, Request, StatusCode};
    use serde_json::json;
    use sqlx::SqlitePool;
    use tower::ServiceExt;

    use crate::actor::{Actor, HeaderActorResolver, TenantMember};
    use crate::config::Config;
    use crate::routes::router;
    use crate::state::AppState;
    use crate::tables::default_registry;
    use crate::testing::{seed_workspace, setup_test_db};

    const ACTOR_HEADER: &str = "x-sync-actor";

    async fn test_app() -> (axum::Router, SqlitePool) {
        let pool = setup_test_db().await;
        seed_workspace(&pool).await;

        let state = AppState::new(
            Config::default(),
            pool.clone(),
            default_registry().unwrap(),
            Arc::new(HeaderActorResolver::new(ACTOR_HEADER).unwrap()),
        );
        (router(state), pool)
    }

    fn actor_header() -> String {
        serde_json::to_string(&Actor::TenantMember(TenantMember {
            tenant_id: "ws-1".to_string(),
            user_id: "usr-1".to_string(),
            email: "dev@example.com".to_string(),
        }))
        .unwrap()
    }

    fn pull_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/replicache/pull1")
            .header(header::CONTENT_TYPE, "application/json")
            .header(ACTOR_HEADER, actor_header())
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_pull_over_http() {
        let (app, _pool) = test_app().await;
        let server = axum_test::TestServer::new(app).unwrap();

        let response = server
            .post("/replicache/pull1")
            .add_header(
                HeaderName::from_static(ACTOR_HEADER),
                HeaderValue::from_str(&actor_header()).unwrap(),
            )
            .json(&json!({"pullVersion": 1, "clientGroupID": "cg-1", "cookie": null}))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["cookie"], json!(1));
        assert_eq!(body["patch"][0], json!({"op": "clear"}));
        assert_eq!(body["patch"][1], json!({"op": "put", "key": "/init", "value": true}));
        assert_eq!(body["patch"].as_array().unwrap().len(), 7);
        assert_eq!(body["lastMutationIDChanges"], json!({}));

        let repeat = server
            .post("/replicache/pull1")
            .add_header(
                HeaderName::from_static(ACTOR_HEADER),
                HeaderValue::from_str(&actor_header()).unwrap(),
            )
            .json(&json!({"pullVersion": 1, "clientGroupID": "cg-1", "cookie": 1}))
            .await;
        repeat.assert_status_ok();
        let body: serde_json::Value = repeat.json();
        assert_eq!(body["patch"], json!([]));
        assert_eq!(body["cookie"], json!(1));
    }

    #[tokio::test]
    async fn test_other_pull_version_redirects() {
        let (app, pool) = test_app().await;

        let response = app
            .oneshot(pull_request(json!({
                "pullVersion": 0,
                "clientID": "c-1",
                "cookie": {"order": 3},
                "lastMutationID": 0,
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/replicache/pull"
        );

        let groups: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM replicache_client_group")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(groups, 0);
    }

    #[tokio::test]
    async fn test_missing_actor_is_unauthorized() {
        let (app, _pool) = test_app().await;

        let request = Request::builder()
            .method("POST")
            .uri("/replicache/pull1")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"pullVersion": 1, "clientGroupID": "cg-1"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_pull_is_bad_request() {
        let (app, _pool) = test_app().await;

        let response = app
            .oneshot(pull_request(json!({"pullVersion": 1, "cookie": "abc"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_response_is_gzipped_on_request() {
        let (app, _pool) = test_app().await;

        let mut request = pull_request(json!({"pullVersion": 1, "clientGroupID": "cg-1"}));
        request
            .headers_mut()
            .insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_ENCODING).unwrap(),
            "gzip"
        );
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _pool) = test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "ok");
    }
}
