//! Derived columns and filters of the visit admin

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use std::fmt;

use crate::web::templates::{escape, escape_attr};

/// Paths longer than this are shortened in the list
const MAX_PATH_CHARS: usize = 60;
const TRUNCATED_PATH_CHARS: usize = 57;

/// Color of a path in the list view
pub fn path_color(path: &str) -> &'static str {
    if path.contains("/admin") {
        "#dc3545"
    } else if path.contains("/api") {
        "#28a745"
    } else if path == "/" || path.is_empty() {
        "#6c757d"
    } else {
        "#0066cc"
    }
}

pub fn truncate_path(path: &str) -> String {
    if path.chars().count() <= MAX_PATH_CHARS {
        return path.to_string();
    }
    let mut short: String = path.chars().take(TRUNCATED_PATH_CHARS).collect();
    short.push_str("...");
    short
}

pub fn colored_path(path: Option<&str>) -> String {
    match path {
        // Empty paths are shown as missing too
        None | Some("") => r#"<span style="color: #999;">N/A</span>"#.to_string(),
        Some(path) => format!(
            r#"<code style="color: {}; background: #f5f5f5; padding: 2px 6px; border-radius: 3px; font-size: 12px;">{}</code>"#,
            path_color(path),
            escape(&truncate_path(path)),
        ),
    }
}

pub fn formatted_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%d/%m/%Y at %H:%M:%S").to_string()
}

/// Elapsed time since a visit, in the coarsest unit that applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAgo {
    Years(i64),
    Months(i64),
    Days(i64),
    Hours(i64),
    Minutes(i64),
    JustNow,
}

impl TimeAgo {
    pub fn between(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let elapsed = (now - timestamp).num_seconds();
        if elapsed <= 0 {
            return TimeAgo::JustNow;
        }

        let days = elapsed / 86_400;
        let seconds = elapsed % 86_400;

        if days > 365 {
            TimeAgo::Years(days / 365)
        } else if days > 30 {
            TimeAgo::Months(days / 30)
        } else if days > 0 {
            TimeAgo::Days(days)
        } else if seconds > 3600 {
            TimeAgo::Hours(seconds / 3600)
        } else if seconds > 60 {
            TimeAgo::Minutes(seconds / 60)
        } else {
            TimeAgo::JustNow
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            TimeAgo::Years(_) => "#999",
            TimeAgo::Months(_) => "#666",
            TimeAgo::Days(_) => "#333",
            TimeAgo::Hours(_) => "#0066cc",
            TimeAgo::Minutes(_) => "#28a745",
            TimeAgo::JustNow => "#dc3545",
        }
    }

    pub fn to_html(self) -> String {
        let weight = if self == TimeAgo::JustNow { " font-weight: bold;" } else { "" };
        format!(r#"<span style="color: {};{}">{}</span>"#, self.color(), weight, self)
    }
}

impl fmt::Display for TimeAgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, unit) = match *self {
            TimeAgo::Years(n) => (n, "year"),
            TimeAgo::Months(n) => (n, "month"),
            TimeAgo::Days(n) => (n, "day"),
            TimeAgo::Hours(n) => (n, "hour"),
            TimeAgo::Minutes(n) => (n, "minute"),
            TimeAgo::JustNow => return f.write_str("just now"),
        };
        let plural = if n > 1 { "s" } else { "" };
        write!(f, "{n} {unit}{plural} ago")
    }
}

pub fn day_of_week(timestamp: DateTime<Utc>) -> &'static str {
    match timestamp.weekday() {
        Weekday::Mon => "🌙 Monday",
        Weekday::Tue => "🔥 Tuesday",
        Weekday::Wed => "💼 Wednesday",
        Weekday::Thu => "🎯 Thursday",
        Weekday::Fri => "🎉 Friday",
        Weekday::Sat => "🌴 Saturday",
        Weekday::Sun => "☀️ Sunday",
    }
}

/// Clickable absolute URL of a visited path
pub fn full_url_link(site_url: &str, path: Option<&str>) -> String {
    match path {
        None | Some("") => "-".to_string(),
        Some(path) => {
            let url = format!("{site_url}{path}");
            format!(
                r#"<a href="{}" target="_blank" rel="noopener" style="color: #0066cc;">{} <span style="font-size: 10px;">🔗</span></a>"#,
                escape_attr(&url),
                escape(&url),
            )
        }
    }
}

/// Date hierarchy filter of the list view, evaluated in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    Today,
    Past7Days,
    ThisMonth,
    ThisYear,
}

impl DateFilter {
    pub const ALL: [DateFilter; 4] = [
        DateFilter::Today,
        DateFilter::Past7Days,
        DateFilter::ThisMonth,
        DateFilter::ThisYear,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateFilter::Today => "today",
            DateFilter::Past7Days => "past_7_days",
            DateFilter::ThisMonth => "this_month",
            DateFilter::ThisYear => "this_year",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DateFilter::Today => "Today",
            DateFilter::Past7Days => "Past 7 days",
            DateFilter::ThisMonth => "This month",
            DateFilter::ThisYear => "This year",
        }
    }

    /// Half-open `[start, end)` range relative to `now`
    pub fn range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = now.date_naive();
        let tomorrow = today + Duration::days(1);
        let (start, end) = match self {
            DateFilter::Today => (today, tomorrow),
            DateFilter::Past7Days => (today - Duration::days(7), tomorrow),
            DateFilter::ThisMonth => {
                let first = today.with_day(1).unwrap_or(today);
                let next = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
                };
                (first, next.unwrap_or(tomorrow))
            }
            DateFilter::ThisYear => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                let next = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).unwrap_or(tomorrow);
                (first, next)
            }
        };
        (midnight(start), midnight(end))
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Start of the current UTC day
pub fn start_of_today(now: DateTime<Utc>) -> DateTime<Utc> {
    midnight(now.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn colors_follow_path_kind() {
        assert_eq!(path_color("/admin/visits/"), "#dc3545");
        assert_eq!(path_color("/api/v1/"), "#28a745");
        assert_eq!(path_color("/"), "#6c757d");
        assert_eq!(path_color("/blog/"), "#0066cc");
    }

    #[test]
    fn missing_path_is_na() {
        assert!(colored_path(None).contains("N/A"));
        assert!(colored_path(Some("")).contains("N/A"));
    }

    #[test]
    fn long_paths_are_truncated() {
        let exact = "/".repeat(60);
        assert_eq!(truncate_path(&exact), exact);

        let long = format!("/{}", "a".repeat(70));
        let short = truncate_path(&long);
        assert_eq!(short.chars().count(), 60);
        assert!(short.ends_with("..."));
        assert!(short.starts_with("/aaa"));
    }

    #[test]
    fn truncation_counts_characters() {
        let long = "é".repeat(80);
        assert_eq!(truncate_path(&long).chars().count(), 60);
    }

    #[test]
    fn colored_path_escapes_html() {
        let html = colored_path(Some("/<script>alert(1)</script>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn timestamp_format() {
        assert_eq!(formatted_timestamp(at(2024, 3, 9, 7, 5, 1)), "09/03/2024 at 07:05:01");
    }

    #[test]
    fn time_ago_buckets() {
        let now = at(2024, 6, 1, 12, 0, 0);
        assert_eq!(TimeAgo::between(now, now), TimeAgo::JustNow);
        assert_eq!(TimeAgo::between(now - Duration::seconds(60), now), TimeAgo::JustNow);
        assert_eq!(TimeAgo::between(now - Duration::seconds(61), now), TimeAgo::Minutes(1));
        assert_eq!(TimeAgo::between(now - Duration::minutes(59), now), TimeAgo::Minutes(59));
        assert_eq!(TimeAgo::between(now - Duration::minutes(125), now), TimeAgo::Hours(2));
        assert_eq!(TimeAgo::between(now - Duration::days(3), now), TimeAgo::Days(3));
        assert_eq!(TimeAgo::between(now - Duration::days(30), now), TimeAgo::Days(30));
        assert_eq!(TimeAgo::between(now - Duration::days(65), now), TimeAgo::Months(2));
        assert_eq!(TimeAgo::between(now - Duration::days(365), now), TimeAgo::Months(12));
        assert_eq!(TimeAgo::between(now - Duration::days(800), now), TimeAgo::Years(2));
        assert_eq!(TimeAgo::between(now + Duration::hours(2), now), TimeAgo::JustNow);
    }

    #[test]
    fn time_ago_wording() {
        assert_eq!(TimeAgo::Years(1).to_string(), "1 year ago");
        assert_eq!(TimeAgo::Days(2).to_string(), "2 days ago");
        assert_eq!(TimeAgo::Minutes(1).to_string(), "1 minute ago");
        assert_eq!(TimeAgo::JustNow.to_string(), "just now");
        assert!(TimeAgo::JustNow.to_html().contains("font-weight: bold"));
    }

    #[test]
    fn weekday_labels() {
        // 2024-06-03 is a Monday
        assert_eq!(day_of_week(at(2024, 6, 3, 0, 0, 0)), "🌙 Monday");
        assert_eq!(day_of_week(at(2024, 6, 9, 23, 59, 59)), "☀️ Sunday");
    }

    #[test]
    fn full_url_uses_site_url() {
        let link = full_url_link("https://example.com", Some("/blog/?a=1&b=2"));
        assert!(link.contains(r#"href="https://example.com/blog/?a=1&amp;b=2""#));
        assert_eq!(full_url_link("https://example.com", None), "-");
    }

    #[test]
    fn date_filter_ranges() {
        let now = at(2024, 12, 15, 18, 30, 0);

        assert_eq!(DateFilter::Today.range(now), (at(2024, 12, 15, 0, 0, 0), at(2024, 12, 16, 0, 0, 0)));
        assert_eq!(DateFilter::Past7Days.range(now), (at(2024, 12, 8, 0, 0, 0), at(2024, 12, 16, 0, 0, 0)));
        assert_eq!(DateFilter::ThisMonth.range(now), (at(2024, 12, 1, 0, 0, 0), at(2025, 1, 1, 0, 0, 0)));
        assert_eq!(DateFilter::ThisYear.range(now), (at(2024, 1, 1, 0, 0, 0), at(2025, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn date_filter_parse() {
        assert_eq!(DateFilter::parse("past_7_days"), Some(DateFilter::Past7Days));
        assert_eq!(DateFilter::parse("yesterday"), None);
    }
}
