//! Visit tracking: which requests count as page visits, and recording them

use axum::http::{HeaderMap, Method, Uri};
use percent_encoding::percent_decode_str;
use tracing::{debug, error};

use crate::cache::VisitCache;
use crate::config::FilesConfig;
use crate::db::{Database, Visit};

/// Asset extensions that never count as page visits
const IGNORED_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".jpg", ".jpeg", ".png", ".gif", ".ico", ".svg", ".woff", ".woff2", ".ttf",
    ".eot", ".map", ".json",
];

/// User-agent fragments of crawlers (matched case-insensitively)
const BOT_MARKERS: &[&str] = &["bot", "crawler", "spider", "scraper"];

/// Decides whether a request is a trackable page visit
#[derive(Debug, Clone)]
pub struct RequestFilter {
    static_prefix: String,
    media_prefix: String,
}

impl RequestFilter {
    pub fn new(static_prefix: impl Into<String>, media_prefix: impl Into<String>) -> Self {
        Self {
            static_prefix: static_prefix.into(),
            media_prefix: media_prefix.into(),
        }
    }

    pub fn from_config(files: &FilesConfig) -> Self {
        Self::new(files.static_url.clone(), files.media_url.clone())
    }

    pub fn should_track(&self, method: &Method, path: &str, headers: &HeaderMap) -> bool {
        if *method != Method::GET {
            return false;
        }

        if path.starts_with(&self.static_prefix) || path.starts_with(&self.media_prefix) {
            return false;
        }

        let is_ajax = headers
            .get("x-requested-with")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "XMLHttpRequest");
        if is_ajax {
            return false;
        }

        let lower_path = path.to_lowercase();
        if IGNORED_EXTENSIONS.iter().any(|ext| lower_path.ends_with(ext)) {
            return false;
        }

        let user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if BOT_MARKERS.iter().any(|marker| user_agent.contains(marker)) {
            return false;
        }

        true
    }
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self::from_config(&FilesConfig::default())
    }
}

/// Decoded request path, the form stored in visits and used in cache keys
pub fn request_path(uri: &Uri) -> String {
    percent_decode_str(uri.path()).decode_utf8_lossy().into_owned()
}

/// Store a visit for `path` and drop the cached stats it affects.
///
/// Failures are logged and swallowed so the page still renders.
pub async fn record_visit(db: &Database, cache: &VisitCache, path: &str) {
    match db.insert_visit(&Visit::new(path)).await {
        Ok(id) => {
            debug!("Recorded visit {} for {}", id, path);
            cache.invalidate_path(path).await;
        }
        Err(e) => {
            error!("Failed to record visit for {}: {:#}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::tests::test_db;
    use axum::http::HeaderValue;
    use std::sync::Arc;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    fn tracks(method: Method, path: &str, pairs: &[(&'static str, &'static str)]) -> bool {
        RequestFilter::default().should_track(&method, path, &headers(pairs))
    }

    #[test]
    fn tracks_plain_page_views() {
        assert!(tracks(Method::GET, "/", &[]));
        assert!(tracks(Method::GET, "/visits/", &[("user-agent", "Mozilla/5.0 (X11; Linux x86_64)")]));
    }

    #[test]
    fn only_get_is_tracked() {
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD, Method::PATCH] {
            assert!(!tracks(method, "/", &[]));
        }
    }

    #[test]
    fn static_and_media_paths_are_ignored() {
        assert!(!tracks(Method::GET, "/static/vendors/flowbite.min.css", &[]));
        assert!(!tracks(Method::GET, "/static/", &[]));
        assert!(!tracks(Method::GET, "/media/avatars/me", &[]));
    }

    #[test]
    fn custom_prefixes_are_respected() {
        let filter = RequestFilter::new("/assets/", "/uploads/");
        assert!(!filter.should_track(&Method::GET, "/assets/app", &HeaderMap::new()));
        assert!(!filter.should_track(&Method::GET, "/uploads/a", &HeaderMap::new()));
        assert!(filter.should_track(&Method::GET, "/static/page", &HeaderMap::new()));
    }

    #[test]
    fn ajax_requests_are_ignored() {
        assert!(!tracks(Method::GET, "/", &[("x-requested-with", "XMLHttpRequest")]));
        assert!(tracks(Method::GET, "/", &[("x-requested-with", "fetch")]));
    }

    #[test]
    fn asset_extensions_are_ignored() {
        assert!(!tracks(Method::GET, "/favicon.ico", &[]));
        assert!(!tracks(Method::GET, "/app.JS", &[]));
        assert!(!tracks(Method::GET, "/data/feed.json", &[]));
        assert!(!tracks(Method::GET, "/fonts/x.woff2", &[]));
        assert!(tracks(Method::GET, "/blog/json-tips/", &[]));
    }

    #[test]
    fn bots_are_ignored_in_any_case() {
        for ua in ["Googlebot/2.1", "BingBOT", "SomeCrawler", "web-Spider 1.0", "ScRaPeR"] {
            let mut map = HeaderMap::new();
            map.insert("user-agent", HeaderValue::from_str(ua).unwrap());
            assert!(!RequestFilter::default().should_track(&Method::GET, "/", &map), "{ua}");
        }
    }

    #[test]
    fn request_path_is_percent_decoded() {
        let uri: Uri = "/caf%C3%A9/?q=1".parse().unwrap();
        assert_eq!(request_path(&uri), "/café/");

        let uri: Uri = "/a%20b/".parse().unwrap();
        assert_eq!(request_path(&uri), "/a b/");

        // Invalid UTF-8 is replaced rather than rejected
        let uri: Uri = "/bad%FF/".parse().unwrap();
        assert_eq!(request_path(&uri), "/bad\u{FFFD}/");
    }

    #[tokio::test]
    async fn record_visit_inserts_and_invalidates() {
        let (db, _dir) = test_db().await;
        let cache = VisitCache::new(Arc::new(MemoryCache::new(300)), Arc::new(db.clone()));

        assert_eq!(cache.total_count().await.unwrap(), 0);
        record_visit(&db, &cache, "/").await;

        assert_eq!(db.get_path_count("/").await.unwrap(), 1);
        assert_eq!(cache.total_count().await.unwrap(), 1);
    }
}
