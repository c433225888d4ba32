//! Reports aggregated per application row. Each application joins exactly one
//! seeker, so person filters can apply to that seeker directly.

use jobdash_core::{ReportQuery, Row};
use jobdash_query::{application_filters, gender_bucket_sql, ApplicationFilterOptions};
use jobdash_storage::QueryExecutor;

use crate::capability::require_column;
use crate::orchestrator::fetch_rows;
use crate::ReportError;

/// Application -> post -> sub-district -> district -> province joins.
const APPLICATION_GEO_JOINS: &str = "\
    JOIN jobposts jp ON ja.jobpost_id = jp.jobpost_id \
    JOIN sub_districts sd ON jp.sub_district_id = sd.id \
    JOIN districts d ON sd.district_id = d.id \
    JOIN provinces p ON d.province_id = p.id";

const DEMOGRAPHICS_LIMIT: i64 = 500;
const APPS_PER_USER_LIMIT: i64 = 50;

const INLINE_SEEKER: ApplicationFilterOptions = ApplicationFilterOptions {
    use_gender: true,
    seeker_alias: Some("js"),
};

/// Applicants and applications by job type x raw gender x age bucket.
pub async fn demographics(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Vec<Row>, ReportError> {
    let mut filter = application_filters(&query.filter_context(), INLINE_SEEKER);
    let limit = filter.binder.append(DEMOGRAPHICS_LIMIT);
    let sql = format!(
        r#"
        SELECT
          jt.job_type,
          COALESCE(js.gender, 'Unknown') AS gender,
          CASE
            WHEN js.birth_date IS NULL THEN 'Unknown'
            WHEN DATE_PART('year', AGE(CURRENT_DATE, js.birth_date)) < 20 THEN '<20'
            WHEN DATE_PART('year', AGE(CURRENT_DATE, js.birth_date)) BETWEEN 20 AND 29 THEN '20-29'
            WHEN DATE_PART('year', AGE(CURRENT_DATE, js.birth_date)) BETWEEN 30 AND 39 THEN '30-39'
            WHEN DATE_PART('year', AGE(CURRENT_DATE, js.birth_date)) BETWEEN 40 AND 49 THEN '40-49'
            WHEN DATE_PART('year', AGE(CURRENT_DATE, js.birth_date)) BETWEEN 50 AND 59 THEN '50-59'
            ELSE '60+'
          END AS age_bucket,
          COUNT(DISTINCT ja.job_seeker_id)::int AS unique_applicants,
          COUNT(*)::int AS applications
        FROM job_applications ja
        JOIN job_seekers js ON ja.job_seeker_id = js.job_seeker_id
        {APPLICATION_GEO_JOINS}
        JOIN job_types jt ON jp.job_type_id = jt.job_type_id
        {where_clause}
        GROUP BY jt.job_type, 2, 3
        ORDER BY jt.job_type, 2, 3
        LIMIT {limit}
        "#,
        where_clause = filter.clause,
    );
    fetch_rows(executor, &sql, &filter.binder).await
}

/// Heaviest applicants by application count.
pub async fn apps_per_user(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Vec<Row>, ReportError> {
    let mut filter = application_filters(&query.filter_context(), ApplicationFilterOptions::default());
    let limit = filter.binder.append(APPS_PER_USER_LIMIT);
    let sql = format!(
        r#"
        SELECT
          ja.job_seeker_id,
          COUNT(*)::int AS applications
        FROM job_applications ja
        {APPLICATION_GEO_JOINS}
        {where_clause}
        GROUP BY ja.job_seeker_id
        ORDER BY applications DESC, ja.job_seeker_id
        LIMIT {limit}
        "#,
        where_clause = filter.clause,
    );
    fetch_rows(executor, &sql, &filter.binder).await
}

/// Applications, hires and hire rate per normalized gender. Needs employments
/// linked to applications and a seeker gender column.
pub async fn hire_rate_by_gender(
    executor: &dyn QueryExecutor,
    query: &ReportQuery,
) -> Result<Vec<Row>, ReportError> {
    require_column(executor, "employments", "job_application_id", "hire rate by gender").await?;
    require_column(executor, "job_seekers", "gender", "hire rate by gender").await?;

    let filter = application_filters(&query.filter_context(), INLINE_SEEKER);
    let bucket = gender_bucket_sql("js.gender");
    let sql = format!(
        r#"
        WITH base AS (
          SELECT
            ja.job_application_id,
            INITCAP({bucket}) AS gender
          FROM job_applications ja
          JOIN job_seekers js ON ja.job_seeker_id = js.job_seeker_id
          {APPLICATION_GEO_JOINS}
          {where_clause}
        )
        SELECT
          gender,
          COUNT(*)::int AS applications,
          COUNT(*) FILTER (WHERE e.employment_id IS NOT NULL)::int AS hired,
          CASE WHEN COUNT(*) = 0 THEN 0
               ELSE ROUND(
                 (COUNT(*) FILTER (WHERE e.employment_id IS NOT NULL))::numeric
                 / COUNT(*)::numeric
               , 4)
          END AS hire_rate
        FROM base b
        LEFT JOIN employments e ON e.job_application_id = b.job_application_id
        GROUP BY gender
        ORDER BY applications DESC, gender
        "#,
        where_clause = filter.clause,
    );
    fetch_rows(executor, &sql, &filter.binder).await
}

/// Male/female split per job type over applicants of known gender. The
/// request's own gender filter is ignored so the shares stay meaningful.
pub async fn gender_ratio_by_job_type(
    executor: &dyn QueryExecutor,
    query: &ReportQuery,
) -> Result<Vec<Row>, ReportError> {
    require_column(executor, "job_seekers", "gender", "gender ratio by job type").await?;

    let options = ApplicationFilterOptions {
        use_gender: false,
        ..INLINE_SEEKER
    };
    let filter = application_filters(&query.filter_context(), options);
    let bucket = gender_bucket_sql("js.gender");
    let sql = format!(
        r#"
        WITH base AS (
          SELECT
            TRIM(jt.job_type) AS job_type,
            {bucket} AS gender
          FROM job_applications ja
          JOIN job_seekers js ON ja.job_seeker_id = js.job_seeker_id
          {APPLICATION_GEO_JOINS}
          JOIN job_types jt ON jp.job_type_id = jt.job_type_id
          {where_clause}
        ),
        agg AS (
          SELECT
            job_type,
            COUNT(*) FILTER (WHERE gender = 'male')::int AS male,
            COUNT(*) FILTER (WHERE gender = 'female')::int AS female
          FROM base
          GROUP BY job_type
        )
        SELECT
          job_type,
          male,
          female,
          (male + female)::int AS total_known,
          CASE WHEN (male + female) = 0 THEN 0
               ELSE ROUND(male::numeric / (male + female)::numeric, 4)
          END AS male_share,
          CASE WHEN (male + female) = 0 THEN 0
               ELSE ROUND(female::numeric / (male + female)::numeric, 4)
          END AS female_share,
          CASE WHEN female = 0 THEN NULL
               ELSE ROUND(male::numeric / female::numeric, 4)
          END AS male_to_female_ratio
        FROM agg
        WHERE (male + female) > 0
        ORDER BY total_known DESC, job_type
        "#,
        where_clause = filter.clause,
    );
    fetch_rows(executor, &sql, &filter.binder).await
}
