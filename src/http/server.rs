//! HTTP server wiring the gates over the application routes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::error::{RategateError, Result};
use crate::ratelimit::{RateLimiter, Role};

use super::gate::{
    endpoint_gate, global_ip_gate, principal_layer, sensitive_ip_gate, Authenticator,
    EndpointGate, GlobalIpGate, Principal, SensitiveIpGate,
};

/// HTTP server for the gated application.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The assembled application router
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server from configuration, a shared limiter, and
    /// the authentication collaborator.
    pub fn new(
        config: &AppConfig,
        limiter: Arc<RateLimiter>,
        authenticator: Arc<DemoAuthenticator>,
    ) -> Self {
        Self {
            addr: config.server.listen_addr,
            router: build_router(config, limiter, authenticator),
        }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            RategateError::Io(e)
        })
    }
}

/// Assemble the application router.
///
/// Layer order, outermost first: request tracing, the global per-IP gate
/// (before authentication, so it never depends on later pipeline state), the
/// principal layer, then the per-route gates.
pub fn build_router(
    config: &AppConfig,
    limiter: Arc<RateLimiter>,
    authenticator: Arc<DemoAuthenticator>,
) -> Router {
    let policies = Arc::new(config.limits.roles.clone());

    let global_gate = GlobalIpGate::new(
        Arc::clone(&limiter),
        &config.limits.ip,
        config.server.exempt_paths.clone(),
    );
    let login_gate = SensitiveIpGate::new(
        Arc::clone(&limiter),
        "login",
        config.limits.ip.login_windows().to_vec(),
    );
    let chat_gate = EndpointGate::new(Arc::clone(&limiter), Arc::clone(&policies), "chat");
    let upload_gate = EndpointGate::new(Arc::clone(&limiter), policies, "upload");

    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health))
        .route(
            "/login",
            post(login).layer(middleware::from_fn_with_state(login_gate, sensitive_ip_gate)),
        )
        .route(
            "/chat",
            post(chat).layer(middleware::from_fn_with_state(chat_gate, endpoint_gate)),
        )
        .route(
            "/upload-handbook",
            post(upload_handbook)
                .layer(middleware::from_fn_with_state(upload_gate, endpoint_gate)),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&authenticator) as Arc<dyn Authenticator>,
            principal_layer,
        ))
        .layer(middleware::from_fn_with_state(global_gate, global_ip_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(authenticator)
}

/// Static stand-in for the identity service used by the demo binary.
///
/// Demo tokens are usernames, verified against a built-in user table; real
/// deployments supply their own [`Authenticator`] backed by actual token
/// verification.
pub struct DemoAuthenticator {
    /// username -> (password, role)
    users: HashMap<&'static str, (&'static str, Role)>,
}

impl DemoAuthenticator {
    /// Table with one demo user per role.
    pub fn new() -> Self {
        Self {
            users: HashMap::from([
                ("admin", ("admin123", Role::Admin)),
                ("employee", ("employee123", Role::Employee)),
                ("intern", ("intern123", Role::Intern)),
            ]),
        }
    }

    fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|(expected, _)| *expected == password)
    }
}

impl Default for DemoAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for DemoAuthenticator {
    async fn verify(&self, token: &str) -> Option<Principal> {
        self.users.get(token).map(|(_, role)| Principal {
            user_id: token.to_string(),
            role: *role,
        })
    }
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to the handbook assistant." }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Demo login handler. Credential storage and token minting belong to the
/// identity service; the demo checks the built-in users and hands the
/// username back as the bearer token.
async fn login(
    State(users): State<Arc<DemoAuthenticator>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let username = request.username.trim();
    if username.is_empty() || !users.check_credentials(username, &request.password) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid username or password" })),
        )
            .into_response();
    }

    Json(json!({ "access_token": username, "token_type": "bearer" })).into_response()
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
}

/// Demo chat handler. Retrieval and answer generation live in the
/// question-answering service behind this gate.
async fn chat(Json(request): Json<ChatRequest>) -> Response {
    let question = request.question.trim();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Question must not be empty" })),
        )
            .into_response();
    }

    Json(json!({ "question": question, "answer": "The handbook service is not wired up in this demo." }))
        .into_response()
}

/// Demo upload handler standing in for handbook ingestion.
async fn upload_handbook() -> Json<serde_json::Value> {
    Json(json!({ "status": "Handbook uploaded and processing started." }))
}
