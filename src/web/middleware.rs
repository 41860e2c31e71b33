//! HTTP middleware: visit tracking, host validation and admin authentication
//!
//! The tracking layer records trackable requests before the handler runs, so
//! a page always sees the counts including its own visit.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Basic, Authorization},
    TypedHeader,
};
use futures::future::BoxFuture;
use std::{net::SocketAddr, sync::Arc, task::{Context, Poll}};
use tower::{Layer, Service};

use super::AppState;
use crate::tracking::{record_visit, request_path};

/// Get the real client IP address, checking proxy headers first
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > ConnectInfo
pub fn get_real_ip(headers: &HeaderMap, fallback_ip: &str) -> String {
    // Try X-Real-IP first (set by Caddy/nginx)
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    // Try X-Forwarded-For (may contain chain of IPs, first is original client)
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(ips) = forwarded.to_str() {
            if let Some(first_ip) = ips.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    // Fallback to direct connection IP
    fallback_ip.to_string()
}

/// Socket address of the peer, when the server was started with connect info
pub fn peer_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Layer recording page visits
#[derive(Clone)]
pub struct VisitTrackingLayer {
    state: Arc<AppState>,
}

impl VisitTrackingLayer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for VisitTrackingLayer {
    type Service = VisitTrackingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        VisitTrackingMiddleware {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Middleware service recording page visits
#[derive(Clone)]
pub struct VisitTrackingMiddleware<S> {
    inner: S,
    state: Arc<AppState>,
}

impl<S> Service<Request<Body>> for VisitTrackingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        // Take the service that was polled ready, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let path = request_path(request.uri());
            if state.filter.should_track(request.method(), &path, request.headers()) {
                record_visit(&state.db, &state.cache, &path).await;
            }

            inner.call(request).await
        })
    }
}

/// Reject requests whose `Host` is not in the allowed hosts
pub async fn validate_host(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default();

    if is_allowed_host(host, &state.config.server.allowed_hosts, state.config.debug) {
        next.run(request).await
    } else {
        tracing::warn!("Invalid HTTP_HOST header: {:?}", host);
        (StatusCode::BAD_REQUEST, "<h1>Bad Request (400)</h1>").into_response()
    }
}

/// Match a `Host` value (port ignored) against allowed host patterns.
///
/// `*` allows everything, `.example.com` allows the domain and its subdomains.
/// With no patterns, debug mode falls back to local addresses.
pub fn is_allowed_host(host: &str, allowed: &[String], debug: bool) -> bool {
    let host = strip_port(host).trim_end_matches('.').to_lowercase();
    if host.is_empty() {
        return allowed.iter().any(|p| p == "*");
    }

    let local = ["localhost".to_string(), "127.0.0.1".to_string(), "[::1]".to_string()];
    let patterns: &[String] = if allowed.is_empty() && debug { &local } else { allowed };

    patterns.iter().any(|pattern| {
        let pattern = pattern.to_lowercase();
        if pattern == "*" {
            true
        } else if let Some(domain) = pattern.strip_prefix('.') {
            host == domain || host.ends_with(&pattern)
        } else {
            host == pattern
        }
    })
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal, possibly followed by ":port"
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// HTTP Basic authentication for the real admin
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
    request: Request,
    next: Next,
) -> Response {
    let admin = &state.config.admin;

    // Open admin is only possible in debug, validation rejects it otherwise
    if admin.password.is_empty() {
        return next.run(request).await;
    }

    let authorized = auth.is_some_and(|TypedHeader(credentials)| {
        credentials.username() == admin.username && credentials.password() == admin.password
    });

    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"admin\"")],
            "Authentication required",
        )
            .into_response()
    }
}
