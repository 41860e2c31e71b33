//! Read-only admin over recorded visits
//!
//! Visits cannot be added or edited here. The only write is the bulk
//! "delete selected" action, which asks for confirmation first.

mod display;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::Form;
use chrono::{Duration, SecondsFormat, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{error, info};

use self::display::{
    colored_path, day_of_week, formatted_timestamp, full_url_link, start_of_today, DateFilter, TimeAgo,
};
use super::middleware::require_admin;
use super::templates::{escape, escape_attr, page};
use super::AppState;
use crate::db::{PathStat, PathType, Visit, VisitFilter};

const LIST_PER_PAGE: i64 = 50;
const LIST_MAX_SHOW_ALL: i64 = 1000;
const TOP_PATHS: i32 = 5;
const LOGIN_ATTEMPTS_SHOWN: i32 = 200;

/// Characters left as-is in query string values
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~').remove(b'/');

/// Admin handler failure, rendered as a 500
pub struct AdminError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for AdminError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        error!("Admin request failed: {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

type AdminResult<T> = Result<T, AdminError>;

pub fn router(state: Arc<AppState>, prefix: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route(&format!("{prefix}/"), get(index))
        .route(&format!("{prefix}/visits/"), get(changelist))
        .route(&format!("{prefix}/visits/add/"), get(forbidden).post(forbidden))
        .route(&format!("{prefix}/visits/action"), post(bulk_action))
        .route(&format!("{prefix}/visits/:id/"), get(detail))
        .route(&format!("{prefix}/visits/:id/change/"), get(forbidden).post(forbidden))
        .route(&format!("{prefix}/login-attempts/"), get(login_attempts))
        .route_layer(from_fn_with_state(state, require_admin))
}

fn admin_page(state: &AppState, title: &str, body: &str) -> Html<String> {
    let prefix = state.config.admin_prefix();
    let nav = format!(
        r#"<nav class="mb-4"><a href="{prefix}/">Site administration</a> · <a href="{prefix}/visits/">Visits</a> · <a href="{prefix}/login-attempts/">Login attempts</a></nav>
{body}"#
    );
    Html(page(&state.config.files.static_url, title, &nav))
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let prefix = state.config.admin_prefix();
    let body = format!(
        r#"<h1>Site administration</h1>
<ul>
  <li><a href="{prefix}/visits/">Visits</a></li>
  <li><a href="{prefix}/login-attempts/">Login attempts</a></li>
</ul>"#
    );
    admin_page(&state, "Site administration", &body)
}

async fn forbidden() -> impl IntoResponse {
    (StatusCode::FORBIDDEN, Html("<h1>403 Forbidden</h1><p>Visits are read-only.</p>"))
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangelistQuery {
    pub q: Option<String>,
    pub date: Option<String>,
    pub path_type: Option<String>,
    /// Kept as text so a malformed value falls back to the first page
    pub page: Option<String>,
    pub all: Option<String>,
}

impl ChangelistQuery {
    fn date_filter(&self) -> Option<DateFilter> {
        self.date.as_deref().and_then(DateFilter::parse)
    }

    fn path_type(&self) -> Option<PathType> {
        let value = self.path_type.as_deref()?;
        PathType::ALL.into_iter().find(|t| t.as_str() == value)
    }

    fn to_filter(&self) -> VisitFilter {
        VisitFilter {
            search: self.q.clone().filter(|q| !q.trim().is_empty()),
            range: self.date_filter().map(|f| f.range(Utc::now())),
            path_type: self.path_type(),
        }
    }

    fn page_number(&self) -> i64 {
        self.page.as_deref().and_then(|p| p.trim().parse().ok()).unwrap_or(1)
    }

    fn show_all(&self) -> bool {
        self.all.is_some()
    }

    /// Query string reproducing the current filters with some values replaced
    fn link(&self, overrides: &[(&str, Option<&str>)]) -> String {
        let current = [
            ("q", self.q.as_deref()),
            ("date", self.date.as_deref()),
            ("path_type", self.path_type.as_deref()),
        ];
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for (key, value) in current {
            let value = overrides
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .unwrap_or(value);
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                pairs.push((key, value));
            }
        }
        for (key, value) in overrides {
            if current.iter().all(|(k, _)| k != key) {
                if let Some(value) = value {
                    pairs.push((*key, *value));
                }
            }
        }

        if pairs.is_empty() {
            return "?".to_string();
        }
        let encoded: Vec<String> = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, utf8_percent_encode(v, QUERY_VALUE)))
            .collect();
        format!("?{}", encoded.join("&"))
    }
}

/// Aggregates shown above the visit list
#[derive(Debug, Clone, Serialize)]
pub struct ChangelistStats {
    pub total_visits: i64,
    pub visits_today: i64,
    pub visits_week: i64,
    pub visits_month: i64,
    pub top_paths: Vec<PathStat>,
}

async fn changelist_stats(state: &AppState) -> anyhow::Result<ChangelistStats> {
    let db = &state.db;
    let now = Utc::now();
    let today = start_of_today(now);

    Ok(ChangelistStats {
        total_visits: db.get_total_count().await?,
        visits_today: db.get_count_between(today, today + Duration::days(1)).await?,
        visits_week: db.get_count_since(now - Duration::days(7)).await?,
        visits_month: db.get_count_since(now - Duration::days(30)).await?,
        top_paths: db.get_top_paths(TOP_PATHS).await?,
    })
}

async fn changelist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChangelistQuery>,
) -> AdminResult<Html<String>> {
    let filter = query.to_filter();
    let matched = state.db.count_visits(&filter).await?;

    let (limit, offset, page_number, page_count) = if query.show_all() && matched <= LIST_MAX_SHOW_ALL {
        (LIST_MAX_SHOW_ALL, 0, 1, 1)
    } else {
        let page_count = ((matched + LIST_PER_PAGE - 1) / LIST_PER_PAGE).max(1);
        let page_number = query.page_number().clamp(1, page_count);
        (LIST_PER_PAGE, (page_number - 1) * LIST_PER_PAGE, page_number, page_count)
    };

    let visits = state.db.list_visits(&filter, limit, offset).await?;
    let stats = changelist_stats(&state).await?;

    let body = render_changelist(&state, &query, &stats, &visits, matched, page_number, page_count);
    Ok(admin_page(&state, "Select visit to view", &body))
}

fn render_changelist(
    state: &AppState,
    query: &ChangelistQuery,
    stats: &ChangelistStats,
    visits: &[Visit],
    matched: i64,
    page_number: i64,
    page_count: i64,
) -> String {
    let prefix = state.config.admin_prefix();
    let now = Utc::now();
    let mut html = String::new();

    // Statistics
    let _ = write!(
        html,
        r#"<section class="grid grid-cols-4 gap-4 mb-4">
  <div><p>Total</p><p data-stat="total_visits">{}</p></div>
  <div><p>Today</p><p data-stat="visits_today">{}</p></div>
  <div><p>Past 7 days</p><p data-stat="visits_week">{}</p></div>
  <div><p>Past 30 days</p><p data-stat="visits_month">{}</p></div>
</section>
<h2>Most visited paths</h2><ol class="mb-4">"#,
        stats.total_visits, stats.visits_today, stats.visits_week, stats.visits_month
    );
    for stat in &stats.top_paths {
        let _ = write!(
            html,
            "<li>{} <span>({})</span></li>",
            colored_path(stat.path.as_deref()),
            stat.count
        );
    }
    html.push_str("</ol>");

    // Search
    let _ = write!(
        html,
        r#"<form method="get" class="mb-4"><input type="search" name="q" value="{}" placeholder="Search path or id">"#,
        escape_attr(query.q.as_deref().unwrap_or_default())
    );
    for (key, value) in [("date", &query.date), ("path_type", &query.path_type)] {
        if let Some(value) = value {
            let _ = write!(html, r#"<input type="hidden" name="{key}" value="{}">"#, escape_attr(value));
        }
    }
    html.push_str(r#"<button type="submit">Search</button></form>"#);

    // Filters
    html.push_str(r#"<aside class="mb-4"><h3>By timestamp</h3><ul>"#);
    let _ = write!(html, r#"<li><a href="{}">Any date</a></li>"#, escape_attr(&query.link(&[("date", None)])));
    for filter in DateFilter::ALL {
        let _ = write!(
            html,
            r#"<li><a href="{}">{}</a></li>"#,
            escape_attr(&query.link(&[("date", Some(filter.as_str()))])),
            filter.label()
        );
    }
    html.push_str("</ul><h3>By page type</h3><ul>");
    let _ = write!(html, r#"<li><a href="{}">All</a></li>"#, escape_attr(&query.link(&[("path_type", None)])));
    for path_type in PathType::ALL {
        let _ = write!(
            html,
            r#"<li><a href="{}">{}</a></li>"#,
            escape_attr(&query.link(&[("path_type", Some(path_type.as_str()))])),
            path_type.label()
        );
    }
    html.push_str("</ul></aside>");

    // Action form and table
    let _ = write!(
        html,
        r#"<form method="post" action="{prefix}/visits/action">
<label>Action: <select name="action">
  <option value="">---------</option>
  <option value="export_as_json">Export selected as JSON</option>
  <option value="delete_selected">Delete selected visits</option>
</select></label>
<button type="submit">Go</button>
<p>{} visit{} matched</p>
<table class="w-full">
<thead><tr><th></th><th>ID</th><th>Path</th><th>Date and time</th><th>Time ago</th><th>Day</th></tr></thead>
<tbody>"#,
        matched,
        if matched == 1 { "" } else { "s" }
    );
    for visit in visits {
        let Some(id) = visit.id else { continue };
        let _ = write!(
            html,
            r#"<tr><td><input type="checkbox" name="ids" value="{id}"></td><td><a href="{prefix}/visits/{id}/">{id}</a></td><td><a href="{prefix}/visits/{id}/">{}</a></td><td><span style="white-space: nowrap;">📅 {}</span></td><td>{}</td><td>{}</td></tr>"#,
            colored_path(visit.path.as_deref()),
            formatted_timestamp(visit.timestamp),
            TimeAgo::between(visit.timestamp, now).to_html(),
            day_of_week(visit.timestamp),
        );
    }
    html.push_str("</tbody></table></form>");

    // Pagination
    if page_count > 1 {
        html.push_str(r#"<nav class="mt-4">"#);
        for number in 1..=page_count {
            if number == page_number {
                let _ = write!(html, "<strong>{number}</strong> ");
            } else {
                let target = query.link(&[("page", Some(number.to_string().as_str()))]);
                let _ = write!(html, r#"<a href="{}">{number}</a> "#, escape_attr(&target));
            }
        }
        if matched <= LIST_MAX_SHOW_ALL {
            let _ = write!(html, r#"<a href="{}">Show all</a>"#, escape_attr(&query.link(&[("all", Some("1"))])));
        }
        html.push_str("</nav>");
    }

    html
}

async fn detail(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> AdminResult<Response> {
    let Some(visit) = state.db.get_visit(id).await? else {
        return Ok((StatusCode::NOT_FOUND, Html("<h1>Visit not found</h1>")).into_response());
    };

    let path = visit.path.as_deref();
    let body = format!(
        r#"<h1>View visit</h1>
<fieldset><legend>Visit information</legend>
<dl>
  <dt>ID</dt><dd>{id}</dd>
  <dt>Path</dt><dd>{}</dd>
  <dt>Full URL</dt><dd>{}</dd>
</dl></fieldset>
<fieldset><legend>Timestamp</legend><p>Date and time of the visit</p>
<dl>
  <dt>Timestamp</dt><dd>{}</dd>
  <dt>Date and time</dt><dd><span style="white-space: nowrap;">📅 {}</span></dd>
  <dt>Time ago</dt><dd>{}</dd>
</dl></fieldset>"#,
        escape(path.unwrap_or("-")),
        full_url_link(&state.config.site_url(), path),
        visit.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        formatted_timestamp(visit.timestamp),
        TimeAgo::between(visit.timestamp, Utc::now()).to_html(),
    );
    Ok(admin_page(&state, "View visit", &body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ActionForm {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub ids: Vec<i64>,
    pub confirm: Option<String>,
}

/// Row of the JSON export
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ExportedVisit {
    pub id: i64,
    pub path: Option<String>,
    pub timestamp: String,
}

impl From<&Visit> for ExportedVisit {
    fn from(visit: &Visit) -> Self {
        Self {
            id: visit.id.unwrap_or_default(),
            path: visit.path.clone(),
            timestamp: visit.timestamp.to_rfc3339(),
        }
    }
}

async fn bulk_action(State(state): State<Arc<AppState>>, Form(form): Form<ActionForm>) -> AdminResult<Response> {
    let list_url = format!("{}/visits/", state.config.admin_prefix());
    if form.ids.is_empty() {
        return Ok(Redirect::to(&list_url).into_response());
    }

    match form.action.as_str() {
        "export_as_json" => export_as_json(&state, &form.ids).await,
        "delete_selected" if form.confirm.as_deref() == Some("yes") => {
            delete_selected(&state, &form.ids).await?;
            Ok(Redirect::to(&list_url).into_response())
        }
        "delete_selected" => confirm_delete(&state, &form.ids).await,
        _ => Ok(Redirect::to(&list_url).into_response()),
    }
}

async fn export_as_json(state: &AppState, ids: &[i64]) -> AdminResult<Response> {
    let visits = state.db.get_visits_by_ids(ids).await?;
    let rows: Vec<ExportedVisit> = visits.iter().map(ExportedVisit::from).collect();
    let json = serde_json::to_string_pretty(&rows)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_DISPOSITION, r#"attachment; filename="visits_export.json""#),
        ],
        json,
    )
        .into_response())
}

async fn confirm_delete(state: &AppState, ids: &[i64]) -> AdminResult<Response> {
    let visits = state.db.get_visits_by_ids(ids).await?;
    let prefix = state.config.admin_prefix();

    let mut body = String::from("<h1>Are you sure?</h1><p>The following visits will be deleted:</p><ul>");
    for visit in &visits {
        let _ = write!(
            body,
            "<li>Visit {} · {}</li>",
            visit.id.unwrap_or_default(),
            colored_path(visit.path.as_deref())
        );
    }
    let _ = write!(
        body,
        r#"</ul><form method="post" action="{prefix}/visits/action"><input type="hidden" name="action" value="delete_selected"><input type="hidden" name="confirm" value="yes">"#
    );
    for visit in &visits {
        if let Some(id) = visit.id {
            let _ = write!(body, r#"<input type="hidden" name="ids" value="{id}">"#);
        }
    }
    let _ = write!(
        body,
        r#"<button type="submit">Yes, I'm sure</button> <a href="{prefix}/visits/">No, take me back</a></form>"#
    );

    Ok(admin_page(state, "Delete multiple visits", &body).into_response())
}

async fn delete_selected(state: &AppState, ids: &[i64]) -> anyhow::Result<()> {
    let visits = state.db.get_visits_by_ids(ids).await?;
    let deleted = state.db.delete_visits(ids).await?;

    let paths: BTreeSet<&str> = visits.iter().filter_map(|v| v.path.as_deref()).collect();
    for path in paths {
        state.cache.invalidate_path(path).await;
    }

    info!("Deleted {} visits from the admin", deleted);
    Ok(())
}

async fn login_attempts(State(state): State<Arc<AppState>>) -> AdminResult<Html<String>> {
    let attempts = state.db.get_recent_login_attempts(LOGIN_ATTEMPTS_SHOWN).await?;

    let mut body = String::from(
        "<h1>Login attempts</h1><table><thead><tr><th>Date and time</th><th>Username</th><th>IP address</th><th>User agent</th><th>Path</th></tr></thead><tbody>",
    );
    for attempt in &attempts {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            formatted_timestamp(attempt.timestamp),
            escape(attempt.username.as_deref().unwrap_or("-")),
            escape(&attempt.ip),
            escape(attempt.user_agent.as_deref().unwrap_or("-")),
            escape(&attempt.path),
        );
    }
    body.push_str("</tbody></table>");

    Ok(admin_page(&state, "Login attempts", &body))
}
