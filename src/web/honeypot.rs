//! Decoy admin login served at `/admin/` in production
//!
//! Every submitted credential is stored as a login attempt and the form
//! always answers with the usual "wrong password" message.

use axum::{
    extract::{FromRequest, Request, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use axum_extra::extract::Form;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};

use super::middleware::{get_real_ip, peer_ip};
use super::templates::{escape_attr, page};
use super::AppState;
use crate::db::LoginAttempt;

const LOGIN_PATH: &str = "/admin/login/";
const LOGIN_ERROR: &str =
    "Please enter the correct username and password for a staff account. Note that both fields may be case-sensitive.";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin", get(to_login))
        .route("/admin/", get(login_form))
        .route(LOGIN_PATH, get(login_form).post(login_submit))
        .route("/admin/*rest", get(to_login))
}

/// Submitted login form. The password is never read or stored.
#[derive(Debug, Default, Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
}

fn render_login(static_url: &str, username: &str, failed: bool) -> String {
    let error = if failed {
        format!(r#"<p class="errornote text-red-600 mb-4">{LOGIN_ERROR}</p>"#)
    } else {
        String::new()
    };
    let body = format!(
        r#"<div id="header"><h1 id="site-name">Site administration</h1></div>
{error}<form action="{LOGIN_PATH}" method="post" id="login-form">
  <div><label for="id_username">Username:</label> <input type="text" name="username" id="id_username" value="{}" autofocus required></div>
  <div><label for="id_password">Password:</label> <input type="password" name="password" id="id_password" required></div>
  <input type="submit" value="Log in">
</form>"#,
        escape_attr(username)
    );
    page(static_url, "Log in | Site administration", &body)
}

async fn to_login() -> Redirect {
    Redirect::to(LOGIN_PATH)
}

async fn login_form(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render_login(&state.config.files.static_url, "", false))
}

async fn login_submit(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let ip = get_real_ip(request.headers(), &peer_ip(&request));
    let user_agent = user_agent(request.headers());
    let path = request.uri().path().to_string();

    let Form(credentials) = match Form::<Credentials>::from_request(request, &state).await {
        Ok(form) => form,
        Err(rejection) => return rejection.into_response(),
    };

    let mut attempt = LoginAttempt::new(ip, path);
    if !credentials.username.is_empty() {
        attempt = attempt.with_username(credentials.username.clone());
    }
    if let Some(user_agent) = user_agent {
        attempt = attempt.with_user_agent(user_agent);
    }

    warn!(
        "Honeypot login attempt from {} as {:?}",
        attempt.ip,
        attempt.username.as_deref().unwrap_or_default()
    );
    if let Err(e) = state.db.insert_login_attempt(&attempt).await {
        error!("Failed to store login attempt: {}", e);
    }

    Html(render_login(&state.config.files.static_url, &credentials.username, true)).into_response()
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .filter(|ua| !ua.is_empty())
        .map(str::to_string)
}
