//! Post-level and application-level `WHERE` builders.
//!
//! Both builders walk a fixed sequence of optional predicates. Each step that
//! has a value appends it to the shared [`Binder`] first and only then renders
//! its fragment, so fragment order and placeholder order always agree.

use std::fmt;

use jobdash_core::FilterContext;

use crate::binder::Binder;
use crate::cohort::{Cohort, CohortMode};

/// Conjunction of predicates; renders as `WHERE ...` (`WHERE TRUE` when empty).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhereClause {
    predicates: Vec<String>,
}

impl WhereClause {
    pub fn and(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.predicates.push(predicate.into());
        self
    }

    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.predicates.is_empty() {
            f.write_str("WHERE TRUE")
        } else {
            write!(f, "WHERE {}", self.predicates.join(" AND "))
        }
    }
}

/// A `WHERE` clause together with the parameter list its placeholders index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSql {
    pub clause: WhereClause,
    pub binder: Binder,
}

impl FilterSql {
    /// Run one optional step: when `value` is present, `fragment` receives it
    /// together with the binder and returns the predicate text.
    fn step<T>(&mut self, value: Option<T>, fragment: impl FnOnce(T, &mut Binder) -> String) -> &mut Self {
        if let Some(value) = value {
            let predicate = fragment(value, &mut self.binder);
            self.clause.and(predicate);
        }
        self
    }

    fn geography_and_post(&mut self, ctx: &FilterContext) -> &mut Self {
        self.step(ctx.geography, |v, b| format!("p.geography_id = {}", b.append(v)))
            .step(ctx.province, |v, b| format!("p.id = {}", b.append(v)))
            .step(ctx.district, |v, b| format!("d.id = {}", b.append(v)))
            .step(ctx.job_type, |v, b| format!("jp.job_type_id = {}", b.append(v)))
            .step(ctx.min_wage, |v, b| format!("jp.wage_amount >= {}", b.append(v)))
            .step(ctx.max_wage, |v, b| format!("jp.wage_amount <= {}", b.append(v)))
    }

    fn time_window(&mut self, ctx: &FilterContext, column: &str) -> &mut Self {
        self.step(ctx.start_date.clone(), |v, b| {
            format!("{column} >= {}::timestamptz", b.append(v))
        })
        .step(ctx.end_date.clone(), |v, b| {
            format!("{column} < {}::timestamptz", b.append(v))
        })
    }
}

/// Filters over `jobposts jp` joined to `sub_districts sd`, `districts d` and
/// `provinces p`. With `with_cohort`, a set gender/age filter keeps only posts
/// that have at least one matching applicant.
pub fn post_filters(ctx: &FilterContext, with_cohort: bool) -> FilterSql {
    let mut filter = FilterSql::default();
    filter
        .time_window(ctx, "jp.created_at")
        .geography_and_post(ctx)
        .step(ctx.approval_status.clone(), |v, b| {
            format!("jp.approval_status = {}", b.append(v))
        });
    if with_cohort {
        let cohort = Cohort::from_context(ctx);
        if let Some(predicate) = cohort.predicate(CohortMode::Exists, &mut filter.binder) {
            filter.clause.and(predicate);
        }
    }
    filter
}

/// Options for [`application_filters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationFilterOptions {
    /// Apply the request's gender filter. Reports that split by gender turn
    /// this off so their ratios are not pre-filtered.
    pub use_gender: bool,
    /// Seeker alias already joined once per application row. When set, person
    /// predicates apply inline to it; otherwise they go through an `EXISTS`
    /// keyed to `ja.job_seeker_id`.
    pub seeker_alias: Option<&'static str>,
}

impl Default for ApplicationFilterOptions {
    fn default() -> Self {
        Self {
            use_gender: true,
            seeker_alias: None,
        }
    }
}

/// Filters over `job_applications ja` joined to its post `jp` and the post's
/// geography. The time window applies to `ja.applied_at`.
pub fn application_filters(ctx: &FilterContext, options: ApplicationFilterOptions) -> FilterSql {
    let mut filter = FilterSql::default();
    filter.time_window(ctx, "ja.applied_at").geography_and_post(ctx);

    let cohort = Cohort::from_context(ctx);
    let gender = if options.use_gender {
        cohort.without_age()
    } else {
        Cohort::default()
    };
    let age = cohort.without_gender();

    for part in [gender, age] {
        let predicate = match options.seeker_alias {
            Some(seeker) => part.predicate(CohortMode::Inline { seeker }, &mut filter.binder),
            None => part.seeker_exists(&mut filter.binder),
        };
        if let Some(predicate) = predicate {
            filter.clause.and(predicate);
        }
    }
    filter
}
