use std::net::SocketAddr;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "ok" }))
        .merge(auth::router())
        .merge(users::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
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
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "message": format!("Welcome to {}", state.config.app_name) }))
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    async fn body_json(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    fn register_req(name: &str, email: &str, password: &str) -> Request<Body> {
        let body = json!({ "name": name, "email": email, "role": "admin", "password": password });
        Request::post("/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn token_req(username: &str, password: &str) -> Request<Body> {
        Request::post("/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={username}&password={password}")))
            .unwrap()
    }

    fn authed(method: &str, uri: &str, token: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
    }

    async fn register_and_login(app: &Router, name: &str, email: &str) -> (i64, String) {
        let res = send(app, register_req(name, email, "s3cr3t")).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let id = body_json(res).await["id"].as_i64().unwrap();

        let res = send(app, token_req(email, "s3cr3t")).await;
        assert_eq!(res.status(), StatusCode::OK);
        let token = body_json(res).await["access_token"]
            .as_str()
            .unwrap()
            .to_string();
        (id, token)
    }

    #[tokio::test]
    async fn register_login_and_read_me() {
        let app = build_app(AppState::fake().await);

        let res = send(&app, register_req("Ana", "a@x.com", "s3cr3t")).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let created = body_json(res).await;
        assert_eq!(created["email"], "a@x.com");
        assert_eq!(created["is_active"], true);
        assert!(created.get("password_hash").is_none());

        let res = send(&app, token_req("a@x.com", "s3cr3t")).await;
        assert_eq!(res.status(), StatusCode::OK);
        let tok = body_json(res).await;
        assert_eq!(tok["token_type"], "bearer");
        let token = tok["access_token"].as_str().unwrap();

        let res = send(
            &app,
            authed("GET", "/users/me", token).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let me = body_json(res).await;
        assert_eq!(me["name"], "Ana");
        assert_eq!(me["email"], "a@x.com");
        assert_eq!(me["role"], "admin");
        assert_eq!(me["is_active"], true);
    }

    #[tokio::test]
    async fn duplicate_registration_is_400() {
        let app = build_app(AppState::fake().await);
        assert_eq!(
            send(&app, register_req("Ana", "a@x.com", "s3cr3t")).await.status(),
            StatusCode::CREATED
        );
        let res = send(&app, register_req("Other", "a@x.com", "pw")).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["detail"], "Email already registered!");
    }

    #[tokio::test]
    async fn concurrent_registration_has_one_winner() {
        let app = build_app(AppState::fake().await);
        let (a, b) = tokio::join!(
            send(&app, register_req("Ana", "a@x.com", "one")),
            send(&app, register_req("Ann", "a@x.com", "two")),
        );
        let mut statuses = vec![a.status().as_u16(), b.status().as_u16()];
        statuses.sort();
        assert_eq!(statuses, vec![201, 400]);
    }

    #[tokio::test]
    async fn bad_password_and_unknown_email_look_identical() {
        let app = build_app(AppState::fake().await);
        send(&app, register_req("Ana", "a@x.com", "s3cr3t")).await;

        let wrong = send(&app, token_req("a@x.com", "nope")).await;
        let unknown = send(&app, token_req("b@x.com", "s3cr3t")).await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status(), unknown.status());
        assert_eq!(
            wrong.headers().get(header::WWW_AUTHENTICATE),
            unknown.headers().get(header::WWW_AUTHENTICATE)
        );
        assert_eq!(body_json(wrong).await, body_json(unknown).await);
    }

    #[tokio::test]
    async fn protected_routes_demand_a_token() {
        let app = build_app(AppState::fake().await);

        let res = send(
            &app,
            Request::get("/users/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            res.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );

        let res = send(
            &app,
            authed("GET", "/users/me", "not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["detail"], "Could not validate credentials");
    }

    #[tokio::test]
    async fn crud_on_other_users() {
        let app = build_app(AppState::fake().await);
        let (ana_id, token) = register_and_login(&app, "Ana", "a@x.com").await;
        let (bo_id, _) = register_and_login(&app, "Bo", "b@x.com").await;

        let res = send(&app, authed("GET", "/users/", &token).body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await.as_array().unwrap().len(), 2);

        let res = send(
            &app,
            authed("GET", &format!("/users/{bo_id}"), &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(body_json(res).await["name"], "Bo");

        let update = json!({ "name": "Bob", "email": "b@x.com", "role": "editor", "password": "ignored" });
        let res = send(
            &app,
            authed("PUT", &format!("/users/{bo_id}"), &token)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(update.to_string()))
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let updated = body_json(res).await;
        assert_eq!(updated["name"], "Bob");
        assert_eq!(updated["role"], "editor");

        let res = send(
            &app,
            authed("DELETE", &format!("/users/{ana_id}"), &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = send(
            &app,
            authed("DELETE", &format!("/users/{bo_id}"), &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = send(
            &app,
            authed("GET", &format!("/users/{bo_id}"), &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = send(
            &app,
            authed("DELETE", &format!("/users/{bo_id}"), &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleted_user_token_stops_working() {
        let app = build_app(AppState::fake().await);
        let (_, ana_token) = register_and_login(&app, "Ana", "a@x.com").await;
        let (bo_id, bo_token) = register_and_login(&app, "Bo", "b@x.com").await;

        let res = send(
            &app,
            authed("DELETE", &format!("/users/{bo_id}"), &ana_token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = send(
            &app,
            authed("GET", "/users/me", &bo_token).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn root_and_health() {
        let app = build_app(AppState::fake().await);
        let res = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(body_json(res).await["message"], "Welcome to userhub-test");
        let res = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}
