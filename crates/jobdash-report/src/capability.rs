use jobdash_storage::{QueryExecutor, SchemaProbe, StoreError};

use crate::ReportError;

/// How employments can be attributed to the filtered posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HireLink {
    ByJobpost,
    ByApplication,
    Unavailable,
}

impl HireLink {
    /// A direct `employments.jobpost_id` wins over the application link.
    pub async fn detect(executor: &dyn QueryExecutor) -> Result<Self, StoreError> {
        let probe = SchemaProbe::new(executor);
        if !probe.table_exists("employments").await? {
            return Ok(HireLink::Unavailable);
        }
        if probe.column_exists("employments", "jobpost_id").await? {
            return Ok(HireLink::ByJobpost);
        }
        if probe.column_exists("employments", "job_application_id").await? {
            return Ok(HireLink::ByApplication);
        }
        Ok(HireLink::Unavailable)
    }

    /// `SELECT` producing one `total_employments` row over the `base` CTE of
    /// filtered post ids.
    pub fn total_employments_sql(self) -> &'static str {
        match self {
            HireLink::ByJobpost => {
                "SELECT COUNT(*)::int AS total_employments \
                   FROM employments e \
                   JOIN base b ON e.jobpost_id = b.jobpost_id"
            }
            HireLink::ByApplication => {
                "SELECT COUNT(*)::int AS total_employments \
                   FROM employments e \
                   JOIN job_applications ja ON e.job_application_id = ja.job_application_id \
                   JOIN base b ON ja.jobpost_id = b.jobpost_id"
            }
            HireLink::Unavailable => "SELECT 0::int AS total_employments",
        }
    }
}

/// Optional schema elements some reports branch on, as `(table, column)`;
/// `None` stands for the table itself.
pub const OPTIONAL_ELEMENTS: &[(&str, Option<&str>)] = &[
    ("employments", None),
    ("employments", Some("jobpost_id")),
    ("employments", Some("job_application_id")),
    ("job_seekers", Some("gender")),
    ("legal_compliance_officers", Some("name")),
];

/// Presence of every [`OPTIONAL_ELEMENTS`] entry, keyed `table` or `table.column`.
pub async fn probe_optional(executor: &dyn QueryExecutor) -> Result<Vec<(String, bool)>, StoreError> {
    let mut found = Vec::with_capacity(OPTIONAL_ELEMENTS.len());
    for (table, column) in OPTIONAL_ELEMENTS {
        let entry = match column {
            Some(column) => (format!("{table}.{column}"), has_column(executor, table, column).await?),
            None => (table.to_string(), SchemaProbe::new(executor).table_exists(table).await?),
        };
        found.push(entry);
    }
    Ok(found)
}

/// True when both `table` and `table.column` exist.
pub(crate) async fn has_column(
    executor: &dyn QueryExecutor,
    table: &str,
    column: &str,
) -> Result<bool, StoreError> {
    let probe = SchemaProbe::new(executor);
    Ok(probe.table_exists(table).await? && probe.column_exists(table, column).await?)
}

/// Fail with [`ReportError::CapabilityUnavailable`] unless `table.column` exists.
pub(crate) async fn require_column(
    executor: &dyn QueryExecutor,
    table: &str,
    column: &str,
    reason: &str,
) -> Result<(), ReportError> {
    if has_column(executor, table, column).await? {
        Ok(())
    } else {
        Err(ReportError::CapabilityUnavailable(format!(
            "Cannot compute {reason} because {table}.{column} not found"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobdash_storage::ScriptedExecutor;

    #[tokio::test]
    async fn prefers_jobpost_link() {
        let exec = ScriptedExecutor::new();
        assert_eq!(HireLink::detect(&exec).await.unwrap(), HireLink::ByJobpost);
    }

    #[tokio::test]
    async fn falls_back_to_application_link() {
        let exec = ScriptedExecutor::new().without_column("employments", "jobpost_id");
        assert_eq!(HireLink::detect(&exec).await.unwrap(), HireLink::ByApplication);
    }

    #[tokio::test]
    async fn no_table_means_no_hires() {
        let exec = ScriptedExecutor::new().without_table("employments");
        let link = HireLink::detect(&exec).await.unwrap();
        assert_eq!(link, HireLink::Unavailable);
        assert_eq!(link.total_employments_sql(), "SELECT 0::int AS total_employments");
        assert_eq!(exec.calls().len(), 1);
    }

    #[tokio::test]
    async fn unlinked_table_means_no_hires() {
        let exec = ScriptedExecutor::new()
            .without_column("employments", "jobpost_id")
            .without_column("employments", "job_application_id");
        assert_eq!(HireLink::detect(&exec).await.unwrap(), HireLink::Unavailable);
    }

    #[tokio::test]
    async fn optional_elements_report_presence() {
        let exec = ScriptedExecutor::new().without_table("legal_compliance_officers");
        let found = probe_optional(&exec).await.unwrap();
        assert_eq!(found.len(), OPTIONAL_ELEMENTS.len());
        assert_eq!(found[0], ("employments".to_string(), true));
        assert_eq!(found[4], ("legal_compliance_officers.name".to_string(), false));
    }

    #[tokio::test]
    async fn missing_column_is_a_capability_error() {
        let exec = ScriptedExecutor::new().without_column("employments", "job_application_id");
        let err = require_column(&exec, "employments", "job_application_id", "hire rate by gender")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot compute hire rate by gender because employments.job_application_id not found"
        );
    }
}
