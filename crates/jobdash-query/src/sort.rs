use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Only a case-insensitive `asc` sorts ascending; anything else, including
    /// an absent or garbage value, sorts descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.trim().eq_ignore_ascii_case("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Per-report sort allow-list: public key -> output column, plus the default
/// ordering that doubles as the tie-breaker.
#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
    pub allowed: &'static [(&'static str, &'static str)],
    pub default_order: &'static str,
}

impl SortSpec {
    pub fn column(&self, key: &str) -> Option<&'static str> {
        self.allowed
            .iter()
            .find(|(public, _)| *public == key)
            .map(|(_, column)| *column)
    }
}

/// Build the `ORDER BY` body. Unknown keys fall back to the default order.
pub fn resolve_order(sort_key: Option<&str>, sort_dir: Option<&str>, spec: &SortSpec) -> String {
    let Some(key) = sort_key else {
        return spec.default_order.to_string();
    };
    let Some(column) = spec.column(key) else {
        debug!(sort_key = key, "ignoring sort key outside allow-list");
        return spec.default_order.to_string();
    };
    let direction = SortDirection::parse(sort_dir);
    format!("{column} {} NULLS LAST, {}", direction.as_sql(), spec.default_order)
}
