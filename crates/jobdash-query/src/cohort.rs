//! Applicant cohort (gender / age) predicates.
//!
//! A cohort filter constrains *people*. Reports that aggregate per job post
//! must not join applicants in just to filter them, or every post with several
//! applicants would be counted several times; they use [`CohortMode::Exists`],
//! which keeps one row per post and asks whether at least one applicant of
//! that post matches. Reports that aggregate per application already carry
//! exactly one seeker row per application and use [`CohortMode::Inline`].

use jobdash_core::{FilterContext, GenderBucket};

use crate::binder::Binder;

/// How a cohort predicate attaches to the surrounding query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohortMode {
    /// Correlated `EXISTS` over the applicants of the outer `jp` post row.
    Exists,
    /// Plain predicate on a seeker alias the caller has already joined.
    Inline { seeker: &'static str },
}

/// `CASE` expression mapping a raw gender column to `male` / `female` /
/// `unknown` / `other`.
pub fn gender_bucket_sql(column: &str) -> String {
    let normalized = format!("lower(trim(COALESCE({column}, '')))");
    format!(
        "CASE \
         WHEN {normalized} IN ({male}) THEN 'male' \
         WHEN {normalized} IN ({female}) THEN 'female' \
         WHEN COALESCE(trim({column}), '') = '' THEN 'unknown' \
         ELSE 'other' END",
        male = sql_list(GenderBucket::MALE_TERMS),
        female = sql_list(GenderBucket::FEMALE_TERMS),
    )
}

/// Whole years between the seeker's birth date and today.
pub fn age_years_sql(seeker: &str) -> String {
    format!("DATE_PART('year', AGE(CURRENT_DATE, {seeker}.birth_date))::int")
}

fn sql_list(terms: &[&str]) -> String {
    terms
        .iter()
        .map(|t| format!("'{}'", t.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Person-attribute part of a filter context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cohort {
    pub gender: Option<GenderBucket>,
    pub age_min: Option<i64>,
    pub age_max: Option<i64>,
}

impl Cohort {
    pub fn from_context(ctx: &FilterContext) -> Self {
        Self {
            gender: ctx.gender,
            age_min: ctx.age_min,
            age_max: ctx.age_max,
        }
    }

    pub fn is_present(&self) -> bool {
        self.gender.is_some() || self.has_age_bounds()
    }

    pub fn has_age_bounds(&self) -> bool {
        self.age_min.is_some() || self.age_max.is_some()
    }

    /// Same cohort without the gender part.
    pub fn without_gender(self) -> Self {
        Self {
            gender: None,
            ..self
        }
    }

    /// Same cohort without the age part.
    pub fn without_age(self) -> Self {
        Self {
            age_min: None,
            age_max: None,
            ..self
        }
    }

    /// Emit the cohort predicate, or `None` when no cohort filter is set.
    pub fn predicate(&self, mode: CohortMode, binder: &mut Binder) -> Option<String> {
        if !self.is_present() {
            return None;
        }
        match mode {
            CohortMode::Inline { seeker } => {
                let parts = self.seeker_predicates(seeker, binder);
                Some(
                    parts
                        .into_iter()
                        .map(|p| format!("({p})"))
                        .collect::<Vec<_>>()
                        .join(" AND "),
                )
            }
            CohortMode::Exists => {
                let parts = self.seeker_predicates("js2", binder);
                Some(format!(
                    "EXISTS (SELECT 1 FROM job_applications ja2 \
                     JOIN job_seekers js2 ON js2.job_seeker_id = ja2.job_seeker_id \
                     WHERE ja2.jobpost_id = jp.jobpost_id AND {})",
                    parts.join(" AND ")
                ))
            }
        }
    }

    /// `EXISTS` keyed to the seeker of the outer application row `ja`.
    pub fn seeker_exists(&self, binder: &mut Binder) -> Option<String> {
        if !self.is_present() {
            return None;
        }
        let parts = self.seeker_predicates("js2", binder);
        Some(format!(
            "EXISTS (SELECT 1 FROM job_seekers js2 \
             WHERE js2.job_seeker_id = ja.job_seeker_id AND {})",
            parts.join(" AND ")
        ))
    }

    fn seeker_predicates(&self, seeker: &str, binder: &mut Binder) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(gender) = self.gender {
            let bucket = gender_bucket_sql(&format!("{seeker}.gender"));
            parts.push(format!("({bucket}) = {}", binder.append(gender.as_str())));
        }
        if self.has_age_bounds() {
            // Unknown birth dates never satisfy an age bound.
            let mut age = vec![format!("{seeker}.birth_date IS NOT NULL")];
            if let Some(min) = self.age_min {
                age.push(format!("{} >= {}", age_years_sql(seeker), binder.append(min)));
            }
            if let Some(max) = self.age_max {
                age.push(format!("{} <= {}", age_years_sql(seeker), binder.append(max)));
            }
            parts.push(age.join(" AND "));
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobdash_core::SqlValue;

    #[test]
    fn absent_cohort_emits_nothing() {
        let mut binder = Binder::new();
        assert_eq!(Cohort::default().predicate(CohortMode::Exists, &mut binder), None);
        assert!(binder.is_empty());
    }

    #[test]
    fn exists_mode_correlates_on_outer_post() {
        let mut binder = Binder::new();
        binder.append(3_i64);
        let cohort = Cohort {
            gender: Some(GenderBucket::Female),
            age_min: Some(20),
            age_max: None,
        };
        let sql = cohort.predicate(CohortMode::Exists, &mut binder).unwrap();

        assert!(sql.starts_with("EXISTS (SELECT 1 FROM job_applications ja2"));
        assert!(sql.contains("ja2.jobpost_id = jp.jobpost_id"));
        assert!(sql.contains(") = $2"));
        assert!(sql.contains("js2.birth_date IS NOT NULL"));
        assert!(sql.contains(">= $3"));
        assert_eq!(
            binder.values(),
            &[SqlValue::Int(3), SqlValue::Text("female".into()), SqlValue::Int(20)]
        );
    }

    #[test]
    fn inline_mode_targets_caller_alias() {
        let mut binder = Binder::new();
        let cohort = Cohort {
            gender: None,
            age_min: Some(20),
            age_max: Some(30),
        };
        let sql = cohort
            .predicate(CohortMode::Inline { seeker: "js" }, &mut binder)
            .unwrap();

        assert!(!sql.contains("EXISTS"));
        assert_eq!(
            sql,
            "(js.birth_date IS NOT NULL \
             AND DATE_PART('year', AGE(CURRENT_DATE, js.birth_date))::int >= $1 \
             AND DATE_PART('year', AGE(CURRENT_DATE, js.birth_date))::int <= $2)"
        );
    }

    #[test]
    fn bucket_sql_lists_every_spelling() {
        let sql = gender_bucket_sql("js.gender");
        for term in GenderBucket::MALE_TERMS.iter().chain(GenderBucket::FEMALE_TERMS) {
            assert!(sql.contains(&format!("'{term}'")), "missing {term}");
        }
        assert!(sql.contains("lower(trim(COALESCE(js.gender, '')))"));
    }

    #[test]
    fn seeker_exists_keys_on_application_seeker() {
        let mut binder = Binder::new();
        let cohort = Cohort {
            gender: Some(GenderBucket::Male),
            ..Cohort::default()
        };
        let sql = cohort.seeker_exists(&mut binder).unwrap();
        assert!(sql.contains("js2.job_seeker_id = ja.job_seeker_id"));
        assert_eq!(binder.values(), &[SqlValue::Text("male".into())]);
    }
}
