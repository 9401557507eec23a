use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::AppConfig;
use crate::state::AppState;
use crate::storage::PUBLIC_PREFIX;
use crate::{auth, users};

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let origin: HeaderValue = state
        .config
        .cors_origin
        .parse()
        .with_context(|| format!("invalid CORS_ORIGIN {:?}", state.config.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .allow_credentials(true);

    let uploads = ServeDir::new(&state.config.upload_dir);

    Ok(Router::new()
        .merge(auth::router())
        .merge(users::router())
        .route("/health", get(|| async { "ok" }))
        .nest_service(PUBLIC_PREFIX, uploads)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        ))
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("parse listen address")?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use bson::oid::ObjectId;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::{dto::LoginResponse, jwt::JwtKeys},
        users::{dto::PublicUser, memory::MemoryUserStore},
    };

    struct TestApp {
        router: Router,
        keys: JwtKeys,
        _dir: tempfile::TempDir,
    }

    async fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::local(dir.path());
        let keys = JwtKeys::new(&config.jwt).unwrap();
        let state = AppState::from_parts(config, Arc::new(MemoryUserStore::new()))
            .await
            .unwrap();
        TestApp {
            router: build_app(state).unwrap(),
            keys,
            _dir: dir,
        }
    }

    impl TestApp {
        async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
            let res = self.router.clone().oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
                .await
                .unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::String(
                    String::from_utf8_lossy(&bytes).into_owned(),
                ))
            };
            (status, body)
        }

        async fn json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
            let req = Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(req).await
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn register(&self, email: &str, password: &str) -> String {
            let (status, _) = self
                .json(
                    "POST",
                    "/api/register",
                    json!({"email": email, "password": password, "role": "user"}),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            let (_, users) = self.get("/api/users").await;
            users
                .as_array()
                .unwrap()
                .iter()
                .rev()
                .find(|u| u["email"] == email)
                .map(|u| u["id"].as_str().unwrap().to_string())
                .unwrap()
        }

        async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
            self.json(
                "POST",
                "/auth/login",
                json!({"email": email, "password": password}),
            )
            .await
        }
    }

    #[tokio::test]
    async fn register_and_login_scenario() {
        let app = test_app().await;

        let (status, body) = app
            .json(
                "POST",
                "/api/register",
                json!({"email": "a@x.com", "password": "pw1"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());

        let (status, body) = app.login("a@x.com", "wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].is_string());

        let (status, body) = app.login("a@x.com", "pw1").await;
        assert_eq!(status, StatusCode::OK);
        let login: LoginResponse = serde_json::from_value(body.clone()).unwrap();
        assert!(!login.token.is_empty());
        assert!(body["user"].get("password").is_none());

        let claims = app.keys.verify(&login.token).unwrap();
        assert_eq!(claims.id, login.user.id);
    }

    #[tokio::test]
    async fn login_unknown_email_is_404() {
        let app = test_app().await;
        app.register("a@x.com", "pw1").await;
        let (status, _) = app.login("nobody@x.com", "pw1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_bodies_are_400_with_message() {
        let app = test_app().await;

        let req = Request::post("/auth/login")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let (status, _) = app
            .json("POST", "/api/register", json!({"email": "a@x.com"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_user_by_id() {
        let app = test_app().await;
        let id = app.register("a@x.com", "pw1").await;

        let (status, body) = app.get(&format!("/api/users/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        let user: PublicUser = serde_json::from_value(body).unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.role, "user");

        let (status, _) = app.get("/api/users/not-an-id").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .get(&format!("/api/users/{}", ObjectId::new().to_hex()))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn role_update_changes_token_role() {
        let app = test_app().await;
        let id = app.register("a@x.com", "pw1").await;

        let (status, _) = app
            .json("PUT", &format!("/api/users/{id}/role"), json!({"role": "admin"}))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app.login("a@x.com", "pw1").await;
        let claims = app.keys.verify(body["token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.role, "admin");

        let (status, _) = app
            .json("PUT", &format!("/api/users/{id}/role"), json!({"role": ""}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn password_change_over_http() {
        let app = test_app().await;
        let id = app.register("a@x.com", "pw1").await;
        let uri = format!("/api/users/{id}/change_password");

        let (status, _) = app
            .json(
                "PUT",
                &uri,
                json!({"current_password": "bad", "new_password": "pw2"}),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.login("a@x.com", "pw1").await.0, StatusCode::OK);

        let (status, _) = app
            .json(
                "PUT",
                &uri,
                json!({"current_password": "pw1", "new_password": "pw2"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.login("a@x.com", "pw1").await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(app.login("a@x.com", "pw2").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn generic_update_keeps_identifier() {
        let app = test_app().await;
        let id = app.register("a@x.com", "pw1").await;
        let other = ObjectId::new().to_hex();

        let (status, _) = app
            .json(
                "PUT",
                &format!("/users/{id}"),
                json!({"_id": other, "id": other, "first_name": "Ada"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.get(&format!("/api/users/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id);
        assert_eq!(body["first_name"], "Ada");

        let (status, _) = app
            .json("PUT", &format!("/users/{other}"), json!({"first_name": "X"}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_nonexistent_id_succeeds() {
        let app = test_app().await;
        let req = Request::delete(format!("/api/users/{}", ObjectId::new().to_hex()))
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn delete_removes_user() {
        let app = test_app().await;
        let id = app.register("a@x.com", "pw1").await;
        let req = Request::delete(format!("/api/users/{id}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(req).await.0, StatusCode::OK);
        assert_eq!(app.login("a@x.com", "pw1").await.0, StatusCode::NOT_FOUND);

        let req = Request::delete("/api/users/garbage")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(req).await.0, StatusCode::BAD_REQUEST);
    }

    fn multipart(field: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"me.png\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    #[tokio::test]
    async fn upload_profile_picture_and_serve_it() {
        let app = test_app().await;
        let id = app.register("a@x.com", "pw1").await;

        let (ct, body) = multipart("profile_picture", "image/png", b"\x89PNG-bytes");
        let req = Request::post(format!("/user/{id}/profile_picture"))
            .header("content-type", ct)
            .body(Body::from(body))
            .unwrap();
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::OK);
        let path = body["profile_picture"].as_str().unwrap().to_string();
        assert!(path.starts_with("/uploads/") && path.ends_with(".png"));

        let (_, user) = app.get(&format!("/api/users/{id}")).await;
        assert_eq!(user["profile_picture"], path.as_str());

        let res = app
            .router
            .clone()
            .oneshot(Request::get(&path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"\x89PNG-bytes");
    }

    #[tokio::test]
    async fn upload_without_file_field_is_400() {
        let app = test_app().await;
        let id = app.register("a@x.com", "pw1").await;

        let (ct, body) = multipart("avatar", "image/png", b"x");
        let req = Request::post(format!("/user/{id}/profile_picture"))
            .header("content-type", ct)
            .body(Body::from(body))
            .unwrap();
        assert_eq!(app.send(req).await.0, StatusCode::BAD_REQUEST);

        let req = Request::post(format!("/user/{id}/profile_picture"))
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(app.send(req).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_and_cors() {
        let app = test_app().await;
        let req = Request::get("/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let res = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
    }
}
