//! Request gates translating limiter decisions into HTTP responses.
//!
//! Three gates share one [`RateLimiter`] instance: a global per-IP gate
//! applied to every request, a role-aware gate for authenticated endpoints,
//! and a fixed two-window IP gate for sensitive endpoints such as login.
//! Denials become 429 responses carrying a `Retry-After` hint; a missing
//! principal on a role-aware endpoint becomes a 401.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::ratelimit::{Identifier, IpPolicy, RateLimiter, Role, RolePolicies, WindowLimit};

/// Endpoint tag used by the global gate's identifiers.
const GLOBAL_ENDPOINT: &str = "global";

/// Verified principal attached to a request by the authentication layer.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

/// Verification seam for the authentication collaborator.
///
/// Implementations map a bearer token to a verified principal; the gates
/// never verify tokens themselves.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Principal>;
}

/// Rejection raised by a gate before the wrapped handler runs.
#[derive(Debug)]
pub enum GateRejection {
    /// One of the enforced windows is exhausted
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },
    /// A role-aware endpoint was reached without a resolvable principal
    MissingIdentity,
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        match self {
            GateRejection::RateLimited {
                message,
                retry_after_secs,
            } => {
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "detail": message })))
                        .into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            GateRejection::MissingIdentity => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "detail": "User identity not available." })),
            )
                .into_response(),
        }
    }
}

/// Authentication layer: resolves `Authorization: Bearer` tokens through the
/// configured [`Authenticator`] and attaches the verified principal to the
/// request. Requests without a valid token proceed without a principal; the
/// role-aware gates reject them downstream.
pub async fn principal_layer(
    State(authenticator): State<Arc<dyn Authenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    if let Some(token) = token {
        if let Some(principal) = authenticator.verify(&token).await {
            request.extensions_mut().insert(principal);
        }
    }

    next.run(request).await
}

/// State for the global per-IP gate.
#[derive(Clone)]
pub struct GlobalIpGate {
    limiter: Arc<RateLimiter>,
    window: WindowLimit,
    exempt_paths: Arc<[String]>,
}

impl GlobalIpGate {
    /// Gate enforcing `policy`'s hourly per-IP ceiling everywhere except the
    /// exempt paths.
    pub fn new(limiter: Arc<RateLimiter>, policy: &IpPolicy, exempt_paths: Vec<String>) -> Self {
        Self {
            limiter,
            window: policy.global_window(),
            exempt_paths: exempt_paths.into(),
        }
    }
}

/// Middleware applying the global per-IP hourly limit to every request.
///
/// Runs before authentication and relies only on the peer address; exempt
/// paths are never counted against the IP's access log.
pub async fn global_ip_gate(
    State(gate): State<GlobalIpGate>,
    request: Request,
    next: Next,
) -> Response {
    if gate.exempt_paths.iter().any(|p| p == request.uri().path()) {
        return next.run(request).await;
    }

    let ip = client_ip(&request);
    let identifier = Identifier::ip(&ip, GLOBAL_ENDPOINT);
    if let Err(denied) = gate.limiter.check(identifier.as_str(), &gate.window) {
        warn!(ip = %ip, retry_after_secs = denied.retry_after_secs, "Global rate limit exceeded");
        return GateRejection::RateLimited {
            message: "Too many requests. Please try again later.".to_string(),
            retry_after_secs: denied.retry_after_secs,
        }
        .into_response();
    }

    next.run(request).await
}

/// State for the role-aware gate guarding one endpoint.
#[derive(Clone)]
pub struct EndpointGate {
    limiter: Arc<RateLimiter>,
    policies: Arc<RolePolicies>,
    endpoint: &'static str,
}

impl EndpointGate {
    /// Gate resolving per-role windows for `endpoint` through `policies`.
    pub fn new(
        limiter: Arc<RateLimiter>,
        policies: Arc<RolePolicies>,
        endpoint: &'static str,
    ) -> Self {
        Self {
            limiter,
            policies,
            endpoint,
        }
    }
}

/// Middleware enforcing the (role, endpoint) policy for the authenticated
/// principal.
///
/// Requests without a principal are rejected as unauthenticated. A (role,
/// endpoint) pair with no configured policy passes through unthrottled.
pub async fn endpoint_gate(
    State(gate): State<EndpointGate>,
    request: Request,
    next: Next,
) -> Response {
    let Some(principal) = request.extensions().get::<Principal>().cloned() else {
        return GateRejection::MissingIdentity.into_response();
    };

    let Some(windows) = gate.policies.resolve(principal.role, gate.endpoint) else {
        return next.run(request).await;
    };

    let identifier = Identifier::user(&principal.user_id, gate.endpoint);
    match gate.limiter.check_all(identifier.as_str(), &windows) {
        Ok(()) => next.run(request).await,
        Err(denied) => {
            warn!(
                user_id = %principal.user_id,
                endpoint = gate.endpoint,
                window = denied.window,
                "Endpoint rate limit exceeded"
            );
            GateRejection::RateLimited {
                message: format!(
                    "Rate limit exceeded. You have exceeded the {} limit for this endpoint.",
                    display_window(denied.window)
                ),
                retry_after_secs: denied.retry_after_secs,
            }
            .into_response()
        }
    }
}

/// State for the fixed two-window IP gate on sensitive endpoints.
#[derive(Clone)]
pub struct SensitiveIpGate {
    limiter: Arc<RateLimiter>,
    endpoint: &'static str,
    windows: Arc<[WindowLimit]>,
}

impl SensitiveIpGate {
    /// Gate enforcing the given windows per IP on `endpoint`, in the order
    /// supplied at registration time.
    pub fn new(
        limiter: Arc<RateLimiter>,
        endpoint: &'static str,
        windows: Vec<WindowLimit>,
    ) -> Self {
        Self {
            limiter,
            endpoint,
            windows: windows.into(),
        }
    }
}

/// Middleware applying fixed per-IP windows to a sensitive endpoint such as
/// login, before any credential handling runs.
pub async fn sensitive_ip_gate(
    State(gate): State<SensitiveIpGate>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    let identifier = Identifier::ip(&ip, gate.endpoint);
    match gate.limiter.check_all(identifier.as_str(), &gate.windows) {
        Ok(()) => next.run(request).await,
        Err(denied) => {
            warn!(
                ip = %ip,
                endpoint = gate.endpoint,
                window = denied.window,
                "IP rate limit exceeded"
            );
            GateRejection::RateLimited {
                message: format!(
                    "Rate limit exceeded. Too many requests from your IP address. {} limit exceeded.",
                    display_window(denied.window)
                ),
                retry_after_secs: denied.retry_after_secs,
            }
            .into_response()
        }
    }
}

/// Best-effort client address: first hop of `X-Forwarded-For` when present,
/// otherwise the peer address.
fn client_ip(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// User-facing form of a window name: `per_minute` becomes `Per Minute`.
fn display_window(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
