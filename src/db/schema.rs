//! Database schema definitions

pub const CREATE_VISITS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT,
    timestamp BIGINT NOT NULL  -- Unix epoch milliseconds, UTC
)
"#;

// Decoy admin credential submissions
pub const CREATE_LOGIN_ATTEMPTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS login_attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp BIGINT NOT NULL,
    username TEXT,
    ip TEXT NOT NULL,
    user_agent TEXT,
    path TEXT NOT NULL
)
"#;

// For date filters, admin ordering and the changelist counters
pub const CREATE_INDEX_VISITS_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_visits_timestamp ON visits(timestamp)";

// For per-path counts and top paths
pub const CREATE_INDEX_VISITS_PATH: &str =
    "CREATE INDEX IF NOT EXISTS idx_visits_path ON visits(path)";

pub const CREATE_INDEX_LOGIN_ATTEMPTS_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_login_attempts_timestamp ON login_attempts(timestamp)";
