//! Site pages

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse},
};
use std::sync::Arc;

use super::templates::{escape, page};
use super::AppState;
use crate::cache::PageStats;
use crate::tracking::request_path;

/// Pages showing live counts must never be cached
const NEVER_CACHE: &str = "max-age=0, no-cache, no-store, must-revalidate, private";

fn render_home(static_url: &str, stats: &PageStats) -> String {
    let body = format!(
        r#"<h1 class="text-3xl font-bold mb-4">Home Page</h1>
<section class="grid grid-cols-1 md:grid-cols-3 gap-4">
  <div class="p-4 border rounded"><p>Visits to this page</p><p class="text-2xl" data-stat="page_visit_count">{}</p></div>
  <div class="p-4 border rounded"><p>Total visits</p><p class="text-2xl" data-stat="total_visit_count">{}</p></div>
  <div class="p-4 border rounded"><p>Share of all visits</p><p class="text-2xl"><span data-stat="page_visit_percentage">{:.2}</span> %</p></div>
</section>"#,
        stats.page_visit_count, stats.total_visit_count, stats.page_visit_percentage,
    );
    page(static_url, "Home Page", &body)
}

/// Home page with the visit statistics of the current path.
///
/// The tracking layer has already recorded this request.
pub async fn home(State(state): State<Arc<AppState>>, uri: Uri) -> impl IntoResponse {
    let stats = state.cache.page_stats(&request_path(&uri)).await;
    (
        [(header::CACHE_CONTROL, NEVER_CACHE)],
        Html(render_home(&state.config.files.static_url, &stats)),
    )
}

pub async fn visits_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let body = r#"<h1 class="text-3xl font-bold mb-4">Visits Home</h1>
<p>Every page you open on this site is counted. Head back to the <a href="/">home page</a> to see the numbers.</p>"#;
    Html(page(&state.config.files.static_url, "Visits Home", body))
}

pub async fn not_found(State(state): State<Arc<AppState>>, uri: Uri) -> impl IntoResponse {
    let body = format!(
        "<h1>Not Found</h1><p>The requested resource <code>{}</code> was not found on this server.</p>",
        escape(uri.path())
    );
    (StatusCode::NOT_FOUND, Html(page(&state.config.files.static_url, "Not Found", &body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_renders_stats() {
        let stats = PageStats {
            page_visit_count: 2,
            total_visit_count: 8,
            page_visit_percentage: 25.0,
        };
        let html = render_home("/static/", &stats);
        assert!(html.contains(r#"data-stat="page_visit_count">2<"#));
        assert!(html.contains(r#"data-stat="total_visit_count">8<"#));
        assert!(html.contains(r#"data-stat="page_visit_percentage">25.00<"#));
        assert!(html.contains(r#"href="/static/vendors/flowbite.min.css""#));
    }
}
