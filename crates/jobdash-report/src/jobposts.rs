//! Reports aggregated per job post. Person filters reach these through the
//! post-level cohort `EXISTS`, never through a join on applicants.

use jobdash_core::{Page, ReportQuery, Row};
use jobdash_query::{gender_bucket_sql, post_filters, Binder, SortSpec};
use jobdash_storage::{QueryExecutor, SchemaProbe};
use serde::Serialize;

use crate::capability::{has_column, HireLink};
use crate::orchestrator::{fetch_object, fetch_page, fetch_rows};
use crate::ReportError;

/// Post -> sub-district -> district -> province joins every post filter relies on.
const POST_GEO_JOINS: &str = "\
    JOIN sub_districts sd ON jp.sub_district_id = sd.id \
    JOIN districts d ON sd.district_id = d.id \
    JOIN provinces p ON d.province_id = p.id";

const GEO_TOP_LIMIT: i64 = 10;

pub const JOBS_SORT: SortSpec = SortSpec {
    allowed: &[
        ("geography", "geography"),
        ("province", "province"),
        ("district", "district"),
        ("job_type", "job_type"),
        ("total_jobs", "total_jobs"),
        ("avg_wage", "avg_wage"),
    ],
    default_order: "geography, province, district, job_type",
};

pub const GEO_AREA_SORT: SortSpec = SortSpec {
    allowed: &[
        ("geography", "geography"),
        ("province", "province"),
        ("district", "district"),
        ("posts", "posts"),
        ("applications", "applications"),
        ("apps_per_post", "apps_per_post"),
        ("avg_wage", "avg_wage"),
        ("avg_workers_needed", "avg_workers_needed"),
    ],
    default_order: "posts DESC, geography, province, district",
};

pub const GOV_LCO_SORT: SortSpec = SortSpec {
    allowed: &[
        ("lco_id", "lco_id"),
        ("total_assigned", "total_assigned"),
        ("pending_count", "pending_count"),
        ("approved_count", "approved_count"),
        ("rejected_count", "rejected_count"),
        ("avg_review_hours", "avg_review_hours"),
        ("total_appeals", "total_appeals"),
    ],
    default_order: "pending_count DESC, total_assigned DESC, lco_id",
};

/// Job counts by geography x job type.
pub async fn jobs(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Page<Row>, ReportError> {
    let filter = post_filters(&query.filter_context(), true);
    let cte = format!(
        r#"
        WITH agg AS (
          SELECT
            g.name AS geography,
            p.name_th AS province,
            d.name_th AS district,
            jt.job_type AS job_type,
            COUNT(*)::int AS total_jobs,
            ROUND(AVG(jp.wage_amount)::numeric, 2) AS avg_wage
          FROM jobposts jp
          {POST_GEO_JOINS}
          JOIN geographies g ON p.geography_id = g.id
          JOIN job_types jt ON jp.job_type_id = jt.job_type_id
          {where_clause}
          GROUP BY g.name, p.name_th, d.name_th, jt.job_type
        )
        "#,
        where_clause = filter.clause,
    );
    fetch_page(executor, &cte, filter.binder, &JOBS_SORT, query).await
}

/// Single-row funnel summary: posts, applications, hires, conversion and
/// job seekers registered inside the requested date window.
pub async fn overview(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Row, ReportError> {
    let ctx = query.filter_context();
    let mut filter = post_filters(&ctx, true);
    let hires = HireLink::detect(executor).await?;

    // Seeker window placeholders come after every post filter placeholder.
    let mut window = Vec::new();
    if let Some(start) = ctx.start_date.clone() {
        window.push(format!("js.created_at >= {}::timestamptz", filter.binder.append(start)));
    }
    if let Some(end) = ctx.end_date.clone() {
        window.push(format!("js.created_at < {}::timestamptz", filter.binder.append(end)));
    }
    let seeker_window = if window.is_empty() {
        "TRUE".to_string()
    } else {
        window.join(" AND ")
    };

    let sql = format!(
        r#"
        WITH base AS (
          SELECT jp.jobpost_id
          FROM jobposts jp
          {POST_GEO_JOINS}
          {where_clause}
        ),
        posts AS (
          SELECT COUNT(*)::int AS total_jobposts FROM base
        ),
        apps AS (
          SELECT
            COUNT(*)::int AS total_applications,
            COUNT(DISTINCT ja.job_seeker_id)::int AS unique_applicants
          FROM job_applications ja
          JOIN base b ON ja.jobpost_id = b.jobpost_id
        ),
        hires AS (
          {hires_sql}
        ),
        seekers AS (
          SELECT
            COUNT(*)::int AS total_jobseekers,
            COUNT(*) FILTER (WHERE {seeker_window})::int AS new_jobseekers_in_range
          FROM job_seekers js
        )
        SELECT
          (SELECT total_jobposts FROM posts) AS total_jobposts,
          (SELECT total_applications FROM apps) AS total_applications,
          (SELECT unique_applicants FROM apps) AS unique_applicants,
          (SELECT total_employments FROM hires) AS total_employments,
          CASE
            WHEN (SELECT total_applications FROM apps) = 0 THEN 0
            ELSE ROUND(
              (SELECT total_employments FROM hires)::numeric
              / (SELECT total_applications FROM apps)::numeric
            , 4)
          END AS conversion_rate,
          (SELECT total_jobseekers FROM seekers) AS total_jobseekers,
          (SELECT new_jobseekers_in_range FROM seekers) AS new_jobseekers_in_range
        "#,
        where_clause = filter.clause,
        hires_sql = hires.total_employments_sql(),
    );
    fetch_object(executor, &sql, &filter.binder).await
}

/// Job-type funnel: posts, applications, hires and the derived rates.
pub async fn market(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Vec<Row>, ReportError> {
    let filter = post_filters(&query.filter_context(), true);
    // Hires are counted per application; without that link every count is zero.
    let hires = if has_column(executor, "employments", "job_application_id").await? {
        "LEFT JOIN employments e ON e.job_application_id = ja.job_application_id"
    } else {
        "LEFT JOIN (SELECT NULL::int AS employment_id) e ON FALSE"
    };
    let sql = format!(
        r#"
        SELECT
          jt.job_type_id,
          jt.job_type,
          COUNT(DISTINCT jp.jobpost_id)::int AS posts,
          COUNT(ja.job_application_id)::int AS applications,
          COUNT(DISTINCT e.employment_id)::int AS hired,
          CASE WHEN COUNT(DISTINCT jp.jobpost_id) = 0 THEN 0
               ELSE ROUND(COUNT(ja.job_application_id)::numeric / COUNT(DISTINCT jp.jobpost_id)::numeric, 2)
          END AS apps_per_post,
          CASE WHEN COUNT(ja.job_application_id) = 0 THEN 0
               ELSE ROUND(COUNT(DISTINCT e.employment_id)::numeric / COUNT(ja.job_application_id)::numeric, 2)
          END AS hire_rate
        FROM jobposts jp
        JOIN job_types jt ON jp.job_type_id = jt.job_type_id
        {POST_GEO_JOINS}
        LEFT JOIN job_applications ja ON ja.jobpost_id = jp.jobpost_id
        {hires}
        {where_clause}
        GROUP BY jt.job_type_id, jt.job_type
        ORDER BY posts DESC, jt.job_type
        "#,
        where_clause = filter.clause,
    );
    fetch_rows(executor, &sql, &filter.binder).await
}

/// Wage percentiles per job type over posts with a wage.
pub async fn wage_distribution(
    executor: &dyn QueryExecutor,
    query: &ReportQuery,
) -> Result<Vec<Row>, ReportError> {
    let mut filter = post_filters(&query.filter_context(), true);
    filter.clause.and("jp.wage_amount IS NOT NULL");
    let sql = format!(
        r#"
        WITH base AS (
          SELECT
            TRIM(jt.job_type) AS job_type,
            jp.wage_amount::numeric AS wage_amount
          FROM jobposts jp
          JOIN job_types jt ON jp.job_type_id = jt.job_type_id
          {POST_GEO_JOINS}
          {where_clause}
        )
        SELECT
          job_type,
          ROUND((percentile_cont(0.25) WITHIN GROUP (ORDER BY wage_amount))::numeric, 2) AS p25_wage,
          ROUND((percentile_cont(0.50) WITHIN GROUP (ORDER BY wage_amount))::numeric, 2) AS median_wage,
          ROUND((percentile_cont(0.75) WITHIN GROUP (ORDER BY wage_amount))::numeric, 2) AS p75_wage,
          ROUND(AVG(wage_amount), 2) AS avg_wage,
          COUNT(*)::int AS posts
        FROM base
        GROUP BY job_type
        ORDER BY posts DESC, job_type
        "#,
        where_clause = filter.clause,
    );
    fetch_rows(executor, &sql, &filter.binder).await
}

/// Paged district-level rollup.
pub async fn geo_area(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Page<Row>, ReportError> {
    let filter = post_filters(&query.filter_context(), true);
    let cte = format!(
        r#"
        WITH agg AS (
          SELECT
            g.name AS geography,
            p.name_th AS province,
            d.name_th AS district,
            COUNT(DISTINCT jp.jobpost_id)::int AS posts,
            COUNT(ja.job_application_id)::int AS applications,
            CASE WHEN COUNT(DISTINCT jp.jobpost_id) = 0 THEN 0
                 ELSE ROUND(COUNT(ja.job_application_id)::numeric / COUNT(DISTINCT jp.jobpost_id)::numeric, 2)
            END AS apps_per_post,
            ROUND(AVG(jp.wage_amount)::numeric, 2) AS avg_wage,
            ROUND(AVG(jp.workers_needed)::numeric, 2) AS avg_workers_needed
          FROM jobposts jp
          {POST_GEO_JOINS}
          JOIN geographies g ON p.geography_id = g.id
          LEFT JOIN job_applications ja ON ja.jobpost_id = jp.jobpost_id
          {where_clause}
          GROUP BY g.name, p.name_th, d.name_th
        )
        "#,
        where_clause = filter.clause,
    );
    fetch_page(executor, &cte, filter.binder, &GEO_AREA_SORT, query).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoTopMode {
    None,
    District,
    Province,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoTop {
    pub mode: GeoTopMode,
    pub rows: Vec<Row>,
}

/// Top provinces by post count, or top districts once a province is chosen.
/// A chosen district leaves nothing to rank.
pub async fn geo_top(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<GeoTop, ReportError> {
    let ctx = query.filter_context();
    if ctx.district.is_some() {
        return Ok(GeoTop {
            mode: GeoTopMode::None,
            rows: Vec::new(),
        });
    }

    let mut filter = post_filters(&ctx, true);
    let (mode, label) = if ctx.province.is_some() {
        (GeoTopMode::District, "d.name_th")
    } else {
        (GeoTopMode::Province, "p.name_th")
    };
    let limit = filter.binder.append(GEO_TOP_LIMIT);
    let sql = format!(
        r#"
        SELECT
          {label} AS label,
          COUNT(DISTINCT jp.jobpost_id)::int AS value
        FROM jobposts jp
        {POST_GEO_JOINS}
        {where_clause}
        GROUP BY {label}
        ORDER BY value DESC, label
        LIMIT {limit}
        "#,
        where_clause = filter.clause,
    );
    let rows = fetch_rows(executor, &sql, &filter.binder).await?;
    Ok(GeoTop { mode, rows })
}

/// Province-level rollup, unpaged.
pub async fn geo_provinces(
    executor: &dyn QueryExecutor,
    query: &ReportQuery,
) -> Result<Vec<Row>, ReportError> {
    let filter = post_filters(&query.filter_context(), true);
    let sql = format!(
        r#"
        SELECT
          g.name AS geography,
          p.name_th AS province,
          COUNT(DISTINCT jp.jobpost_id)::int AS posts,
          COUNT(ja.job_application_id)::int AS applications,
          CASE WHEN COUNT(DISTINCT jp.jobpost_id) = 0 THEN 0
               ELSE ROUND(COUNT(ja.job_application_id)::numeric / COUNT(DISTINCT jp.jobpost_id)::numeric, 2)
          END AS apps_per_post,
          ROUND(AVG(jp.wage_amount)::numeric, 2) AS avg_wage
        FROM jobposts jp
        {POST_GEO_JOINS}
        JOIN geographies g ON p.geography_id = g.id
        LEFT JOIN job_applications ja ON ja.jobpost_id = jp.jobpost_id
        {where_clause}
        GROUP BY g.name, p.name_th
        ORDER BY posts DESC, p.name_th
        "#,
        where_clause = filter.clause,
    );
    fetch_rows(executor, &sql, &filter.binder).await
}

/// Post counts and shares per approval status.
pub async fn gov_status(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Vec<Row>, ReportError> {
    let filter = post_filters(&query.filter_context(), true);
    let sql = format!(
        r#"
        WITH x AS (
          SELECT
            jp.approval_status,
            COUNT(*)::int AS posts_count
          FROM jobposts jp
          {POST_GEO_JOINS}
          {where_clause}
          GROUP BY jp.approval_status
        ),
        total AS (
          SELECT SUM(posts_count)::numeric AS total_posts FROM x
        )
        SELECT
          approval_status,
          posts_count,
          CASE WHEN (SELECT total_posts FROM total) = 0 THEN 0
               ELSE ROUND(posts_count::numeric / (SELECT total_posts FROM total), 4)
          END AS share
        FROM x
        ORDER BY posts_count DESC, approval_status
        "#,
        where_clause = filter.clause,
    );
    fetch_rows(executor, &sql, &filter.binder).await
}

/// Paged workload per compliance officer. The officer name is included only
/// when the installation has that column.
pub async fn gov_lco(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Page<Row>, ReportError> {
    let has_name = SchemaProbe::new(executor)
        .column_exists("legal_compliance_officers", "name")
        .await?;
    let (name_select, name_group) = if has_name {
        (", lco.name AS lco_name", ", lco.name")
    } else {
        ("", "")
    };

    let filter = post_filters(&query.filter_context(), true);
    let cte = format!(
        r#"
        WITH agg AS (
          SELECT
            jp.lco_id{name_select},
            COUNT(*)::int AS total_assigned,
            COUNT(*) FILTER (WHERE jp.approval_status = 'Pending')::int AS pending_count,
            COUNT(*) FILTER (WHERE jp.approval_status = 'Approved')::int AS approved_count,
            COUNT(*) FILTER (WHERE jp.approval_status = 'Rejected')::int AS rejected_count,
            ROUND(
              (AVG(EXTRACT(EPOCH FROM (jp.approval_date - jp.created_at)) / 3600)
                FILTER (WHERE jp.approval_date IS NOT NULL))::numeric
            , 2) AS avg_review_hours,
            COALESCE(SUM(jp.appeal_count), 0)::int AS total_appeals
          FROM jobposts jp
          {POST_GEO_JOINS}
          LEFT JOIN legal_compliance_officers lco ON jp.lco_id = lco.lco_id
          {where_clause}
          GROUP BY jp.lco_id{name_group}
        )
        "#,
        where_clause = filter.clause,
    );
    fetch_page(executor, &cte, filter.binder, &GOV_LCO_SORT, query).await
}

/// Unfiltered totals across the whole dataset.
pub async fn global_summary(executor: &dyn QueryExecutor) -> Result<Row, ReportError> {
    let bucket = gender_bucket_sql("gender");
    let sql = format!(
        r#"
        WITH js AS (
          SELECT
            COUNT(*)::int AS total_users,
            COUNT(*) FILTER (WHERE ({bucket}) = 'male')::int AS male_total,
            COUNT(*) FILTER (WHERE ({bucket}) = 'female')::int AS female_total
          FROM job_seekers
        ),
        jp AS (
          SELECT COUNT(*)::int AS total_jobposts FROM jobposts
        ),
        ja AS (
          SELECT COUNT(*)::int AS total_applications FROM job_applications
        )
        SELECT
          (SELECT total_users FROM js) AS total_users,
          (SELECT total_jobposts FROM jp) AS total_jobposts,
          (SELECT total_applications FROM ja) AS total_applications,
          (SELECT male_total FROM js) AS male_total,
          (SELECT female_total FROM js) AS female_total,
          ((SELECT male_total FROM js) + (SELECT female_total FROM js))::int AS male_female_total
        "#
    );
    fetch_object(executor, &sql, &Binder::new()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobdash_core::SqlValue;
    use jobdash_storage::ScriptedExecutor;
    use serde_json::json;

    fn query(pairs: &[(&str, &str)]) -> ReportQuery {
        ReportQuery::from_pairs(pairs.iter().map(|(k, v)| (*k, *v)))
    }

    #[tokio::test]
    async fn jobs_envelope_and_cohort_exists() {
        let exec = ScriptedExecutor::new()
            .reply("AS total FROM agg", json!([{"total": 1}]))
            .reply("AS row_ordinal FROM agg", json!([{"geography": "North", "total_jobs": 4}]));
        let page = jobs(
            &exec,
            &query(&[("province", "10"), ("gender", "M"), ("page_size", "9999")]),
        )
        .await
        .unwrap();

        assert_eq!(page.page_size, 200);
        assert_eq!(page.total, 1);
        let calls = exec.calls();
        assert!(calls[0].sql.contains("p.id = $1"));
        assert!(calls[0].sql.contains("WHERE ja2.jobpost_id = jp.jobpost_id"));
        assert!(!calls[0].sql.contains("JOIN job_applications ja "));
        assert_eq!(
            calls[1].params,
            vec![
                SqlValue::Int(10),
                SqlValue::Text("male".into()),
                SqlValue::Int(200),
                SqlValue::Int(0)
            ]
        );
    }

    #[tokio::test]
    async fn overview_binds_seeker_window_after_filters() {
        let exec = ScriptedExecutor::new().reply("WITH base AS", json!([{"total_jobposts": 7}]));
        let row = overview(
            &exec,
            &query(&[("start_date", "2024-01-01"), ("end_date", "2024-02-01"), ("job_type", "3")]),
        )
        .await
        .unwrap();
        assert_eq!(row["total_jobposts"], json!(7));

        let call = exec.calls().pop().unwrap();
        assert!(call.sql.contains("jp.created_at >= $1::timestamptz"));
        assert!(call.sql.contains("jp.job_type_id = $3"));
        assert!(call.sql.contains("js.created_at >= $4::timestamptz AND js.created_at < $5::timestamptz"));
        assert!(call.sql.contains("JOIN base b ON e.jobpost_id = b.jobpost_id"));
        assert_eq!(call.params.len(), 5);
    }

    #[tokio::test]
    async fn overview_without_employments_counts_zero_hires() {
        let exec = ScriptedExecutor::new().without_table("employments");
        let row = overview(&exec, &query(&[])).await.unwrap();
        assert!(row.is_empty());
        let call = exec.calls().pop().unwrap();
        assert!(call.sql.contains("SELECT 0::int AS total_employments"));
        assert!(call.sql.contains("FILTER (WHERE TRUE)"));
        assert!(call.params.is_empty());
    }

    #[tokio::test]
    async fn wage_distribution_requires_a_wage() {
        let exec = ScriptedExecutor::new();
        wage_distribution(&exec, &query(&[("min_wage", "350")])).await.unwrap();
        let call = exec.calls().pop().unwrap();
        assert!(call.sql.contains("WHERE jp.wage_amount >= $1 AND jp.wage_amount IS NOT NULL"));
        assert_eq!(call.params, vec![SqlValue::Float(350.0)]);
    }

    #[tokio::test]
    async fn geo_top_switches_on_selection() {
        let exec = ScriptedExecutor::new().reply("AS label", json!([{"label": "Mueang", "value": 9}]));

        let top = geo_top(&exec, &query(&[])).await.unwrap();
        assert_eq!(top.mode, GeoTopMode::Province);

        let top = geo_top(&exec, &query(&[("province", "10")])).await.unwrap();
        assert_eq!(top.mode, GeoTopMode::District);
        assert_eq!(top.rows.len(), 1);
        let call = exec.calls().pop().unwrap();
        assert!(call.sql.contains("d.name_th AS label"));
        assert!(call.sql.contains("LIMIT $2"));

        let calls_before = exec.calls().len();
        let top = geo_top(&exec, &query(&[("province", "10"), ("district", "100")])).await.unwrap();
        assert_eq!(top.mode, GeoTopMode::None);
        assert!(top.rows.is_empty());
        assert_eq!(exec.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn gov_lco_omits_missing_name_column() {
        let exec = ScriptedExecutor::new().without_column("legal_compliance_officers", "name");
        gov_lco(&exec, &query(&[("sort_key", "lco_name")])).await.unwrap();
        let call = exec.calls().pop().unwrap();
        assert!(!call.sql.contains("lco.name"));
        assert!(call.sql.contains("ORDER BY pending_count DESC, total_assigned DESC, lco_id LIMIT"));

        let exec = ScriptedExecutor::new();
        gov_lco(&exec, &query(&[])).await.unwrap();
        let call = exec.calls().pop().unwrap();
        assert!(call.sql.contains("lco.name AS lco_name"));
        assert!(call.sql.contains("GROUP BY jp.lco_id, lco.name"));
    }

    #[tokio::test]
    async fn market_counts_hires_through_applications() {
        let exec = ScriptedExecutor::new();
        market(&exec, &query(&[])).await.unwrap();
        let call = exec.calls().pop().unwrap();
        assert!(call.sql.contains("e.job_application_id = ja.job_application_id"));
        assert!(call.sql.contains("WHERE TRUE"));

        let exec = ScriptedExecutor::new().without_table("employments");
        market(&exec, &query(&[])).await.unwrap();
        let call = exec.calls().pop().unwrap();
        assert!(call.sql.contains("e ON FALSE"));
        assert!(!call.sql.contains("FROM employments"));
    }

    #[tokio::test]
    async fn global_summary_ignores_filters() {
        let exec = ScriptedExecutor::new().reply("total_users", json!([{"total_users": 12}]));
        let row = global_summary(&exec).await.unwrap();
        assert_eq!(row["total_users"], json!(12));
        assert!(exec.calls()[0].params.is_empty());
    }
}
