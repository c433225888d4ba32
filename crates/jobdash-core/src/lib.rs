//! Request-scoped domain values shared by the jobdash crates.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CRATE_NAME: &str = "jobdash-core";

/// One result row, keyed by output column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Value bound to a positional placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

/// Canonical gender bucket a free-text seeker gender normalizes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderBucket {
    Male,
    Female,
    Unknown,
    Other,
}

impl GenderBucket {
    /// Lowercased, trimmed spellings that count as male.
    pub const MALE_TERMS: &'static [&'static str] = &["male", "m", "man", "ชาย"];
    /// Lowercased, trimmed spellings that count as female.
    pub const FEMALE_TERMS: &'static [&'static str] = &["female", "f", "woman", "หญิง"];

    /// Classify a raw seeker gender value the same way the SQL bucket
    /// expression does. Postgres `TRIM` strips spaces only, so tabs and
    /// newlines are kept here too.
    pub fn classify(raw: &str) -> Self {
        let normalized = raw.trim_matches(' ').to_lowercase();
        if normalized.is_empty() {
            GenderBucket::Unknown
        } else if Self::MALE_TERMS.contains(&normalized.as_str()) {
            GenderBucket::Male
        } else if Self::FEMALE_TERMS.contains(&normalized.as_str()) {
            GenderBucket::Female
        } else {
            GenderBucket::Other
        }
    }

    /// Interpret a `gender` request parameter. Bucket names select their bucket
    /// directly; any other spelling is classified. Blank means no filter.
    pub fn from_filter(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "" => None,
            "unknown" => Some(GenderBucket::Unknown),
            "other" => Some(GenderBucket::Other),
            _ => Some(Self::classify(&normalized)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenderBucket::Male => "male",
            GenderBucket::Female => "female",
            GenderBucket::Unknown => "unknown",
            GenderBucket::Other => "other",
        }
    }
}

/// Raw query-string parameters of one request. Blank values are dropped on
/// construction so that `?gender=` behaves like an absent filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportQuery {
    params: HashMap<String, String>,
}

impl ReportQuery {
    /// Build from decoded key/value pairs; the last occurrence of a key wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = HashMap::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            if value.trim().is_empty() {
                params.remove(&key);
            } else {
                params.insert(key, value);
            }
        }
        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn page(&self) -> Option<&str> {
        self.get("page")
    }

    pub fn page_size(&self) -> Option<&str> {
        self.get("page_size")
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.get("sort_key")
    }

    pub fn sort_dir(&self) -> Option<&str> {
        self.get("sort_dir")
    }

    pub fn id(&self, key: &str) -> Option<i64> {
        self.lenient(key, parse_int)
    }

    /// Parsed value of `key`; a value that does not parse is dropped like an
    /// absent one.
    fn lenient<T>(&self, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.get(key)?;
        let parsed = parse(raw);
        if parsed.is_none() {
            debug!(key, value = raw, "ignoring unparseable filter value");
        }
        parsed
    }

    pub fn filter_context(&self) -> FilterContext {
        FilterContext {
            geography: self.id("geography"),
            province: self.id("province"),
            district: self.id("district"),
            job_type: self.id("job_type"),
            min_wage: self.lenient("min_wage", parse_number),
            max_wage: self.lenient("max_wage", parse_number),
            start_date: self.lenient("start_date", parse_date),
            end_date: self.lenient("end_date", parse_date),
            approval_status: self.get("approval_status").map(|v| v.trim().to_string()),
            gender: self.lenient("gender", GenderBucket::from_filter),
            age_min: self.id("age_min"),
            age_max: self.id("age_max"),
        }
    }
}

/// Recognized narrowing filters of one request. Every field is optional and an
/// absent field contributes no predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterContext {
    pub geography: Option<i64>,
    pub province: Option<i64>,
    pub district: Option<i64>,
    pub job_type: Option<i64>,
    pub min_wage: Option<f64>,
    pub max_wage: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub approval_status: Option<String>,
    pub gender: Option<GenderBucket>,
    pub age_min: Option<i64>,
    pub age_max: Option<i64>,
}

/// Paged response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub rows: Vec<T>,
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Accepts `YYYY-MM-DD`, RFC 3339 and `YYYY-MM-DD HH:MM:SS`; the raw text
/// is kept so the store applies its own time zone rules. The year must be
/// four digits in 0001..=9999, the range `timestamptz` input accepts without
/// an era suffix.
fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !has_plain_year(raw) {
        return None;
    }
    let valid = NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(raw).is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").is_ok();
    valid.then(|| raw.to_string())
}

fn has_plain_year(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() > 4
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && &raw[..4] != "0000"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ReportQuery {
        ReportQuery::from_pairs(pairs.iter().map(|(k, v)| (*k, *v)))
    }

    #[test]
    fn male_spellings_share_a_bucket() {
        assert_eq!(GenderBucket::classify("Male"), GenderBucket::Male);
        assert_eq!(GenderBucket::classify(" m "), GenderBucket::Male);
        assert_eq!(GenderBucket::classify("ชาย"), GenderBucket::Male);
        assert_eq!(GenderBucket::classify("WOMAN"), GenderBucket::Female);
        assert_eq!(GenderBucket::classify("   "), GenderBucket::Unknown);
        assert_eq!(GenderBucket::classify("nonbinary"), GenderBucket::Other);
    }

    #[test]
    fn only_spaces_are_trimmed_before_classifying() {
        assert_eq!(GenderBucket::classify("\tmale"), GenderBucket::Other);
        assert_eq!(GenderBucket::classify("female\n"), GenderBucket::Other);
        assert_eq!(GenderBucket::classify("\t"), GenderBucket::Other);
        assert_eq!(GenderBucket::classify("  หญิง  "), GenderBucket::Female);
    }

    #[test]
    fn gender_filter_accepts_bucket_names() {
        assert_eq!(GenderBucket::from_filter("unknown"), Some(GenderBucket::Unknown));
        assert_eq!(GenderBucket::from_filter("Other"), Some(GenderBucket::Other));
        assert_eq!(GenderBucket::from_filter("หญิง"), Some(GenderBucket::Female));
        assert_eq!(GenderBucket::from_filter(" "), None);
    }

    #[test]
    fn blank_and_malformed_filters_are_omitted() {
        let ctx = query(&[
            ("gender", ""),
            ("geography", "abc"),
            ("province", "12"),
            ("min_wage", "300.5"),
            ("max_wage", "NaN"),
            ("start_date", "2024-01-01"),
            ("end_date", "yesterday"),
        ])
        .filter_context();

        assert_eq!(ctx.gender, None);
        assert_eq!(ctx.geography, None);
        assert_eq!(ctx.province, Some(12));
        assert_eq!(ctx.min_wage, Some(300.5));
        assert_eq!(ctx.max_wage, None);
        assert_eq!(ctx.start_date.as_deref(), Some("2024-01-01"));
        assert_eq!(ctx.end_date, None);
        assert_eq!((ctx.age_min, ctx.age_max), (None, None));
    }

    #[test]
    fn out_of_range_years_are_omitted() {
        for raw in ["0000-01-01", "-0001-01-01", "+12024-01-01", "12024-01-01", "0000-01-01T00:00:00Z"] {
            let ctx = query(&[("start_date", raw), ("end_date", raw)]).filter_context();
            assert_eq!(ctx.start_date, None, "{raw}");
            assert_eq!(ctx.end_date, None, "{raw}");
        }
        let ctx = query(&[("start_date", "0001-01-01"), ("end_date", "9999-12-31")]).filter_context();
        assert_eq!(ctx.start_date.as_deref(), Some("0001-01-01"));
        assert_eq!(ctx.end_date.as_deref(), Some("9999-12-31"));
    }

    #[test]
    fn last_duplicate_key_wins_and_blank_clears() {
        let q = query(&[("page", "2"), ("page", "3"), ("sort_key", "posts"), ("sort_key", " ")]);
        assert_eq!(q.page(), Some("3"));
        assert_eq!(q.sort_key(), None);
    }

    #[test]
    fn age_bound_alone_is_a_cohort_filter() {
        let ctx = query(&[("age_max", "30")]).filter_context();
        assert_eq!(ctx.gender, None);
        assert_eq!(ctx.age_max, Some(30));
    }

    #[test]
    fn rfc3339_dates_are_accepted() {
        let ctx = query(&[("start_date", "2024-03-01T00:00:00+07:00")]).filter_context();
        assert_eq!(ctx.start_date.as_deref(), Some("2024-03-01T00:00:00+07:00"));
    }
}
