//! Database module

mod schema;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};

use crate::config::DatabaseConfig;

/// A recorded page visit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    pub id: Option<i64>,
    pub path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Visit {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: None,
            path: Some(path.into()),
            timestamp: Utc::now(),
        }
    }
}

type VisitRow = (i64, Option<String>, i64);

impl From<VisitRow> for Visit {
    fn from((id, path, ts): VisitRow) -> Self {
        Visit {
            id: Some(id),
            path,
            timestamp: from_millis(ts),
        }
    }
}

/// A credential submission captured by the decoy admin login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub username: Option<String>,
    pub ip: String,
    pub user_agent: Option<String>,
    pub path: String,
}

impl LoginAttempt {
    pub fn new(ip: String, path: String) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            username: None,
            ip,
            user_agent: None,
            path,
        }
    }

    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = Some(user_agent);
        self
    }
}

fn from_millis(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts).unwrap_or_else(Utc::now)
}

/// Page category used by the admin "path type" filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    Home,
    Admin,
    Visits,
    Other,
}

impl PathType {
    pub const ALL: [PathType; 4] = [PathType::Home, PathType::Admin, PathType::Visits, PathType::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            PathType::Home => "home",
            PathType::Admin => "admin",
            PathType::Visits => "visits",
            PathType::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PathType::Home => "Home",
            PathType::Admin => "Administration",
            PathType::Visits => "Visits",
            PathType::Other => "Other",
        }
    }

    /// Matching is case-sensitive; rows without a path only fall under `Other`.
    fn sql_condition(&self) -> &'static str {
        match self {
            PathType::Home => "path IN ('/', '')",
            PathType::Admin => "instr(path, '/admin') > 0",
            PathType::Visits => "instr(path, '/visit') > 0",
            PathType::Other => {
                "(path IS NULL OR (instr(path, '/admin') = 0 AND instr(path, '/visit') = 0 AND path NOT IN ('/', '')))"
            }
        }
    }
}

/// Filters applied to the admin visit list
#[derive(Debug, Clone, Default)]
pub struct VisitFilter {
    /// Whitespace-separated search terms; each must match the path or the id
    pub search: Option<String>,
    /// Half-open `[start, end)` timestamp range
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub path_type: Option<PathType>,
}

impl VisitFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");

        if let Some((start, end)) = self.range {
            qb.push(" AND timestamp >= ")
                .push_bind(start.timestamp_millis())
                .push(" AND timestamp < ")
                .push_bind(end.timestamp_millis());
        }

        if let Some(path_type) = self.path_type {
            qb.push(" AND ").push(path_type.sql_condition());
        }

        for term in self.search.as_deref().unwrap_or_default().split_whitespace() {
            qb.push(" AND (path LIKE ")
                .push_bind(format!("%{}%", escape_like(term)))
                .push(" ESCAPE '\\'");
            if let Ok(id) = term.parse::<i64>() {
                qb.push(" OR id = ").push_bind(id);
            }
            qb.push(")");
        }
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.url)).await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(schema::CREATE_VISITS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_LOGIN_ATTEMPTS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_VISITS_TIMESTAMP)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_VISITS_PATH)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_LOGIN_ATTEMPTS_TIMESTAMP)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_visit(&self, visit: &Visit) -> Result<i64> {
        let result = sqlx::query("INSERT INTO visits (path, timestamp) VALUES (?, ?)")
            .bind(&visit.path)
            .bind(visit.timestamp.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_total_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM visits")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn get_path_count(&self, path: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM visits WHERE path = ?")
            .bind(path)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Count visits in the half-open range `[start, end)`
    pub async fn get_count_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM visits WHERE timestamp >= ? AND timestamp < ?")
            .bind(start.timestamp_millis())
            .bind(end.timestamp_millis())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn get_count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM visits WHERE timestamp >= ?")
            .bind(since.timestamp_millis())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn get_top_paths(&self, limit: i32) -> Result<Vec<PathStat>> {
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT path, COUNT(*) as count
            FROM visits
            GROUP BY path
            ORDER BY count DESC, path
            LIMIT ?
            "#
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(path, count)| PathStat { path, count }).collect())
    }

    /// Page of visits matching `filter`, newest first
    pub async fn list_visits(&self, filter: &VisitFilter, limit: i64, offset: i64) -> Result<Vec<Visit>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id, path, timestamp FROM visits");
        filter.push_where(&mut qb);
        qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<VisitRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Visit::from).collect())
    }

    pub async fn count_visits(&self, filter: &VisitFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM visits");
        filter.push_where(&mut qb);

        let row: (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    pub async fn get_visit(&self, id: i64) -> Result<Option<Visit>> {
        let row: Option<VisitRow> = sqlx::query_as("SELECT id, path, timestamp FROM visits WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Visit::from))
    }

    pub async fn get_visits_by_ids(&self, ids: &[i64]) -> Result<Vec<Visit>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id, path, timestamp FROM visits WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        let rows: Vec<VisitRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Visit::from).collect())
    }

    pub async fn delete_visits(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM visits WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_login_attempt(&self, attempt: &LoginAttempt) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO login_attempts (timestamp, username, ip, user_agent, path)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.timestamp.timestamp_millis())
        .bind(&attempt.username)
        .bind(&attempt.ip)
        .bind(&attempt.user_agent)
        .bind(&attempt.path)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_recent_login_attempts(&self, limit: i32) -> Result<Vec<LoginAttempt>> {
        let rows: Vec<(i64, i64, Option<String>, String, Option<String>, String)> = sqlx::query_as(
            r#"
            SELECT id, timestamp, username, ip, user_agent, path
            FROM login_attempts
            ORDER BY id DESC
            LIMIT ?
            "#
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id, ts, username, ip, user_agent, path)| {
            LoginAttempt {
                id: Some(id),
                timestamp: from_millis(ts),
                username,
                ip,
                user_agent,
                path,
            }
        }).collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PathStat {
    pub path: Option<String>,
    pub count: i64,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    /// Fresh migrated database in a temporary directory
    pub(crate) async fn test_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: dir.path().join("test.sqlite3").display().to_string(),
        };
        let db = Database::new(&config).await.unwrap();
        db.run_migrations().await.unwrap();
        (db, dir)
    }

    pub(crate) async fn insert_at(db: &Database, path: Option<&str>, timestamp: DateTime<Utc>) -> i64 {
        let visit = Visit {
            id: None,
            path: path.map(str::to_string),
            timestamp,
        };
        db.insert_visit(&visit).await.unwrap()
    }

    #[tokio::test]
    async fn insert_and_count() {
        let (db, _dir) = test_db().await;
        db.insert_visit(&Visit::new("/")).await.unwrap();
        db.insert_visit(&Visit::new("/")).await.unwrap();
        db.insert_visit(&Visit::new("/about/")).await.unwrap();

        assert_eq!(db.get_total_count().await.unwrap(), 3);
        assert_eq!(db.get_path_count("/").await.unwrap(), 2);
        assert_eq!(db.get_path_count("/about/").await.unwrap(), 1);
        assert_eq!(db.get_path_count("/missing/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_visit_round_trips_fields() {
        let (db, _dir) = test_db().await;
        let visit = Visit::new("/blog/");
        let id = db.insert_visit(&visit).await.unwrap();

        let stored = db.get_visit(id).await.unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.path.as_deref(), Some("/blog/"));
        assert_eq!(stored.timestamp.timestamp_millis(), visit.timestamp.timestamp_millis());
        assert!(db.get_visit(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn path_type_filter_buckets_paths() {
        let (db, _dir) = test_db().await;
        let now = Utc::now();
        for path in [Some("/"), Some(""), Some("/admin/visits/"), Some("/visits/"), Some("/blog/"), None] {
            insert_at(&db, path, now).await;
        }

        let count = |path_type| {
            let filter = VisitFilter {
                path_type: Some(path_type),
                ..VisitFilter::default()
            };
            let db = db.clone();
            async move { db.count_visits(&filter).await.unwrap() }
        };

        assert_eq!(count(PathType::Home).await, 2);
        assert_eq!(count(PathType::Admin).await, 1);
        // "/admin/visits/" contains both "/admin" and "/visit", so it lands in both buckets
        assert_eq!(count(PathType::Visits).await, 2);
        // "/blog/" and the row without a path
        assert_eq!(count(PathType::Other).await, 2);
    }

    #[tokio::test]
    async fn search_matches_path_or_id() {
        let (db, _dir) = test_db().await;
        let now = Utc::now();
        let first = insert_at(&db, Some("/Blog/rust/"), now).await;
        insert_at(&db, Some("/blog/python/"), now).await;
        insert_at(&db, Some("/shop/"), now).await;

        let search = |q: &str| VisitFilter {
            search: Some(q.to_string()),
            ..VisitFilter::default()
        };

        assert_eq!(db.count_visits(&search("blog")).await.unwrap(), 2);
        assert_eq!(db.count_visits(&search("blog rust")).await.unwrap(), 1);
        assert_eq!(db.count_visits(&search(&first.to_string())).await.unwrap(), 1);
        // Wildcards are matched literally
        assert_eq!(db.count_visits(&search("%")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_visits_is_newest_first_and_paginated() {
        let (db, _dir) = test_db().await;
        let now = Utc::now();
        for i in 0..5 {
            insert_at(&db, Some(&format!("/p{i}/")), now - Duration::minutes(i)).await;
        }

        let page = db.list_visits(&VisitFilter::default(), 2, 0).await.unwrap();
        let paths: Vec<_> = page.iter().map(|v| v.path.clone().unwrap()).collect();
        assert_eq!(paths, vec!["/p0/", "/p1/"]);

        let page = db.list_visits(&VisitFilter::default(), 2, 4).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].path.as_deref(), Some("/p4/"));
    }

    #[tokio::test]
    async fn range_filter_is_half_open() {
        let (db, _dir) = test_db().await;
        let now = Utc::now();
        insert_at(&db, Some("/old/"), now - Duration::days(10)).await;
        insert_at(&db, Some("/new/"), now - Duration::hours(1)).await;

        let filter = VisitFilter {
            range: Some((now - Duration::days(7), now)),
            ..VisitFilter::default()
        };
        assert_eq!(db.count_visits(&filter).await.unwrap(), 1);
        assert_eq!(db.get_count_since(now - Duration::days(30)).await.unwrap(), 2);
        assert_eq!(db.get_count_between(now - Duration::hours(1), now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn top_paths_orders_by_count() {
        let (db, _dir) = test_db().await;
        for path in ["/", "/", "/", "/a/", "/a/", "/b/"] {
            db.insert_visit(&Visit::new(path)).await.unwrap();
        }

        let top = db.get_top_paths(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].path.as_deref(), Some("/"));
        assert_eq!(top[0].count, 3);
        assert_eq!(top[1].path.as_deref(), Some("/a/"));
    }

    #[tokio::test]
    async fn delete_by_ids() {
        let (db, _dir) = test_db().await;
        let a = db.insert_visit(&Visit::new("/a/")).await.unwrap();
        let b = db.insert_visit(&Visit::new("/b/")).await.unwrap();
        db.insert_visit(&Visit::new("/c/")).await.unwrap();

        let selected = db.get_visits_by_ids(&[b, a]).await.unwrap();
        assert_eq!(selected.iter().map(|v| v.id.unwrap()).collect::<Vec<_>>(), vec![a, b]);

        assert_eq!(db.delete_visits(&[a, b]).await.unwrap(), 2);
        assert_eq!(db.delete_visits(&[]).await.unwrap(), 0);
        assert_eq!(db.get_total_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn login_attempts_are_stored() {
        let (db, _dir) = test_db().await;
        let attempt = LoginAttempt::new("203.0.113.9".to_string(), "/admin/login/".to_string())
            .with_username("root".to_string())
            .with_user_agent("curl/8.0".to_string());
        db.insert_login_attempt(&attempt).await.unwrap();

        let attempts = db.get_recent_login_attempts(10).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].username.as_deref(), Some("root"));
        assert_eq!(attempts[0].ip, "203.0.113.9");
    }
}
