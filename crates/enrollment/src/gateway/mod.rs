//! Opaque relay from `/gateway/{path}` to the upstream proxy's `/api/{path}`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

const CALLBACK_HEADER: HeaderName = HeaderName::from_static("x-callback-url");

#[derive(Debug, Clone)]
pub struct GatewayForwarder {
    http: Client,
    upstream: String,
}

impl GatewayForwarder {
    pub fn new(upstream: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            upstream: upstream.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        let url = format!("{}/api/{}", self.upstream, path.trim_start_matches('/'));
        match query {
            Some(query) if !query.is_empty() => format!("{url}?{query}"),
            _ => url,
        }
    }

    /// Relays one request. The upstream body is read as JSON, or `{}` when it is not JSON.
    ///
    /// Only `GET` and `POST` reach this; the router mounts nothing else.
    #[instrument(skip(self, headers, body), fields(%method, path = %path), level = "debug")]
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<(StatusCode, Value), reqwest::Error> {
        let target = self.target_url(path, query);
        let is_post = method == Method::POST;

        let content_type = if is_post {
            headers
                .get(header::CONTENT_TYPE)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("application/json"))
        } else {
            HeaderValue::from_static("application/json")
        };

        let mut request = self
            .http
            .request(method, &target)
            .header(header::CONTENT_TYPE, content_type);
        for name in [header::AUTHORIZATION, CALLBACK_HEADER] {
            if let Some(value) = headers.get(&name) {
                request = request.header(name, value.clone());
            }
        }
        if is_post {
            request = request.body(body);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let payload = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}));
        debug!(%target, status = status.as_u16(), "gateway relayed request");
        Ok((status, payload))
    }
}

pub fn gateway_router(forwarder: Arc<GatewayForwarder>) -> Router {
    Router::new()
        .route("/gateway/{*path}", get(relay_get).post(relay_post))
        .with_state(forwarder)
}

async fn relay_get(
    State(forwarder): State<Arc<GatewayForwarder>>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    relay(&forwarder, Method::GET, &path, query, &headers, Bytes::new()).await
}

async fn relay_post(
    State(forwarder): State<Arc<GatewayForwarder>>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay(&forwarder, Method::POST, &path, query, &headers, body).await
}

async fn relay(
    forwarder: &GatewayForwarder,
    method: Method,
    path: &str,
    query: Option<String>,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    match forwarder
        .forward(method, path, query.as_deref(), headers, body)
        .await
    {
        Ok((status, payload)) => (status, Json(payload)).into_response(),
        Err(err) => {
            warn!(error = %err, %path, "gateway request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Gateway request failed" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::routing::any;
    use tower::ServiceExt;

    async fn echo(
        method: Method,
        Path(rest): Path<String>,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        if rest == "plain" {
            return (StatusCode::ACCEPTED, "not json").into_response();
        }
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let status = if rest.starts_with("missing") {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::OK
        };
        let payload = json!({
            "method": method.as_str(),
            "path": rest,
            "query": query,
            "contentType": header("content-type"),
            "authorization": header("authorization"),
            "callback": header("x-callback-url"),
            "body": String::from_utf8_lossy(&body),
        });
        (status, Json(payload)).into_response()
    }

    async fn spawn_upstream() -> String {
        let app = Router::new().route("/proxy/api/{*rest}", any(echo));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind upstream");
        let addr = listener.local_addr().expect("upstream addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("upstream serves");
        });
        format!("http://{addr}/proxy")
    }

    fn router_for(upstream: String) -> Router {
        let forwarder =
            GatewayForwarder::new(upstream, Duration::from_secs(5)).expect("client builds");
        gateway_router(Arc::new(forwarder))
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body reads");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn target_url_joins_path_and_query() {
        let forwarder = GatewayForwarder::new("http://localhost:3005/proxy/", Duration::from_secs(1))
            .expect("client builds");
        assert_eq!(
            forwarder.target_url("tareas/status/7", Some("verbose=1")),
            "http://localhost:3005/proxy/api/tareas/status/7?verbose=1"
        );
        assert_eq!(
            forwarder.target_url("grupo-materias", None),
            "http://localhost:3005/proxy/api/grupo-materias"
        );
    }

    #[tokio::test]
    async fn get_forwards_path_query_and_auth_headers() {
        let router = router_for(spawn_upstream().await);

        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/gateway/tareas/status/42?verbose=1")
                    .header("authorization", "Bearer abc")
                    .header("x-callback-url", "http://localhost:3000/api/callbacks")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("request succeeds");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["method"], "GET");
        assert_eq!(body["path"], "tareas/status/42");
        assert_eq!(body["query"], "verbose=1");
        assert_eq!(body["contentType"], "application/json");
        assert_eq!(body["authorization"], "Bearer abc");
        assert_eq!(body["callback"], "http://localhost:3000/api/callbacks");
    }

    #[tokio::test]
    async fn post_relays_body_and_content_type() {
        let router = router_for(spawn_upstream().await);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/gateway/inscripcions/request-seat")
                    .header("content-type", "application/json; charset=utf-8")
                    .body(Body::from(r#"{"idsGrupoMateria":[1,2]}"#))
                    .expect("request builds"),
            )
            .await
            .expect("request succeeds");

        let body = json_body(response).await;
        assert_eq!(body["method"], "POST");
        assert_eq!(body["contentType"], "application/json; charset=utf-8");
        assert_eq!(body["body"], r#"{"idsGrupoMateria":[1,2]}"#);
        assert!(body["authorization"].is_null());
    }

    #[tokio::test]
    async fn upstream_status_passes_through_and_non_json_becomes_empty_object() {
        let upstream = spawn_upstream().await;

        let missing = router_for(upstream.clone())
            .oneshot(
                Request::builder()
                    .uri("/gateway/missing/thing")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("request succeeds");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let plain = router_for(upstream)
            .oneshot(
                Request::builder()
                    .uri("/gateway/plain")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("request succeeds");
        assert_eq!(plain.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(plain).await, json!({}));
    }

    #[tokio::test]
    async fn unreachable_upstream_returns_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let response = router_for(format!("http://{addr}/proxy"))
            .oneshot(
                Request::builder()
                    .uri("/gateway/grupo-materias")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("request succeeds");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "Gateway request failed" })
        );
    }
}
