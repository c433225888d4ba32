//! Filter composition for the reporting queries: placeholder binding, paging,
//! sort resolution, applicant cohort predicates and the two filter builders.

pub mod binder;
pub mod cohort;
pub mod filters;
pub mod paging;
pub mod sort;

pub use binder::{Binder, Placeholder};
pub use cohort::{gender_bucket_sql, Cohort, CohortMode};
pub use filters::{application_filters, post_filters, ApplicationFilterOptions, FilterSql, WhereClause};
pub use paging::PageWindow;
pub use sort::{resolve_order, SortDirection, SortSpec};

pub const CRATE_NAME: &str = "jobdash-query";
