//! Local facet filtering applied to pages already fetched from the CMS.

use crate::{FacetKind, FilterState, Job, MatchRule};

/// Whether the keyword was already handled by the CMS search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeywordMode {
    #[default]
    Remote,
    Local,
}

/// Narrows `jobs` by every facet group except the keyword. Order is preserved.
pub fn apply(jobs: &[Job], filters: &FilterState) -> Vec<Job> {
    apply_with(jobs, filters, KeywordMode::Remote)
}

pub fn apply_with(jobs: &[Job], filters: &FilterState, keyword: KeywordMode) -> Vec<Job> {
    jobs.iter()
        .filter(|job| matches(job, filters, keyword))
        .cloned()
        .collect()
}

pub fn matches(job: &Job, filters: &FilterState, keyword: KeywordMode) -> bool {
    if !filters.province.is_empty() && !contains_ci(&job.province, &filters.province) {
        return false;
    }

    if keyword == KeywordMode::Local {
        let needle = filters.keyword.trim();
        if !needle.is_empty()
            && !contains_ci(&job.title, needle)
            && !contains_ci(&job.company_name, needle)
        {
            return false;
        }
    }

    FacetKind::ALL.iter().all(|kind| {
        let selected = filters.facets.values(*kind);
        if selected.is_empty() {
            return true;
        }
        let field = kind.job_field(job);
        match kind.rule() {
            MatchRule::Exact => selected.iter().any(|v| v == field),
            MatchRule::Substring => selected.iter().any(|v| contains_ci(field, v)),
        }
    })
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Stable sort by creation time, newest first; undated jobs sink to the end.
pub fn sort_newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FacetBag;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn job(id: &str) -> Job {
        Job {
            id: id.to_string(),
            slug: format!("job-{id}"),
            title: format!("Job {id}"),
            content: String::new(),
            company_name: "PT Contoh".into(),
            category: String::new(),
            province: String::new(),
            city: String::new(),
            job_type: "Full Time".into(),
            education: String::new(),
            industry: String::new(),
            experience: String::new(),
            tag: String::new(),
            gender: String::new(),
            salary: "Negosiasi".into(),
            work_policy: String::new(),
            link: "#".into(),
            source: "Nexjob".into(),
            created_at: None,
            seo_title: None,
            seo_description: None,
        }
    }

    fn with_category(id: &str, category: &str) -> Job {
        Job {
            category: category.into(),
            ..job(id)
        }
    }

    fn ids(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(|j| j.id.as_str()).collect()
    }

    #[test]
    fn category_matches_by_substring() {
        let jobs = vec![
            with_category("1", "Software Engineer"),
            with_category("2", "Sales"),
        ];
        let filters = FilterState {
            facets: FacetBag {
                categories: vec!["Software".into()],
                ..FacetBag::default()
            },
            ..FilterState::default()
        };
        assert_eq!(ids(&apply(&jobs, &filters)), vec!["1"]);
    }

    #[test]
    fn job_type_requires_exact_value() {
        let mut part = job("2");
        part.job_type = "Part Time".into();
        let jobs = vec![job("1"), part];
        let mut filters = FilterState::default();
        filters.facets.job_types = vec!["Time".into()];
        assert!(apply(&jobs, &filters).is_empty());
        filters.facets.job_types = vec!["Part Time".into(), "Contract".into()];
        assert_eq!(ids(&apply(&jobs, &filters)), vec!["2"]);
    }

    #[test]
    fn province_and_city_are_case_insensitive() {
        let mut a = job("1");
        a.province = "DKI Jakarta".into();
        a.city = "Jakarta Selatan".into();
        let mut b = job("2");
        b.province = "Jawa Barat".into();
        b.city = "Bandung".into();
        let jobs = vec![a, b];

        let mut filters = FilterState {
            province: "jakarta".into(),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply(&jobs, &filters)), vec!["1"]);

        filters.province.clear();
        filters.facets.cities = vec!["selatan".into(), "BANDUNG".into()];
        assert_eq!(ids(&apply(&jobs, &filters)), vec!["1", "2"]);
    }

    #[test]
    fn groups_combine_with_and() {
        let mut a = with_category("1", "Sales");
        a.work_policy = "Remote Working".into();
        let mut b = with_category("2", "Sales");
        b.work_policy = "On-site Working".into();
        let jobs = vec![a, b];
        let mut filters = FilterState::default();
        filters.facets.categories = vec!["Sales".into()];
        filters.facets.work_policies = vec!["Remote Working".into()];
        assert_eq!(ids(&apply(&jobs, &filters)), vec!["1"]);
    }

    #[test]
    fn keyword_only_applies_locally_when_asked() {
        let mut a = job("1");
        a.title = "Frontend Developer".into();
        let b = job("2");
        let jobs = vec![a, b];
        let filters = FilterState {
            keyword: "frontend".into(),
            ..FilterState::default()
        };
        assert_eq!(apply(&jobs, &filters).len(), 2);
        assert_eq!(
            ids(&apply_with(&jobs, &filters, KeywordMode::Local)),
            vec!["1"]
        );
    }

    #[test]
    fn newest_first_keeps_undated_last() {
        let mut old = job("old");
        old.created_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single();
        let mut new = job("new");
        new.created_at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single();
        let mut jobs = vec![job("undated"), old, new];
        sort_newest_first(&mut jobs);
        assert_eq!(ids(&jobs), vec!["new", "old", "undated"]);
    }

    const CATEGORIES: [&str; 4] = ["Software Engineer", "Sales", "Akuntansi", "Healthcare"];
    const TYPES: [&str; 3] = ["Full Time", "Part Time", "Contract"];
    const CITIES: [&str; 4] = ["Jakarta Selatan", "Bandung", "Surabaya", "Denpasar"];

    fn arb_job() -> impl Strategy<Value = Job> {
        (0u32..1000, 0usize..4, 0usize..3, 0usize..4).prop_map(|(id, c, t, city)| Job {
            category: CATEGORIES[c].into(),
            job_type: TYPES[t].into(),
            city: CITIES[city].into(),
            ..job(&id.to_string())
        })
    }

    fn arb_facets() -> impl Strategy<Value = FacetBag> {
        (
            proptest::sample::subsequence(CATEGORIES.to_vec(), 0..=2),
            proptest::sample::subsequence(TYPES.to_vec(), 0..=2),
            proptest::sample::subsequence(CITIES.to_vec(), 0..=2),
        )
            .prop_map(|(cats, types, cities)| FacetBag {
                categories: cats.into_iter().map(String::from).collect(),
                job_types: types.into_iter().map(String::from).collect(),
                cities: cities.into_iter().map(String::from).collect(),
                ..FacetBag::default()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn output_is_subset_and_idempotent(
            jobs in proptest::collection::vec(arb_job(), 0..24),
            facets in arb_facets(),
        ) {
            let filters = FilterState { facets, ..FilterState::default() };
            let once = apply(&jobs, &filters);
            prop_assert!(once.iter().all(|j| jobs.contains(j)));
            prop_assert_eq!(apply(&once, &filters), once.clone());
        }

        #[test]
        fn constraining_an_empty_group_never_grows_results(
            jobs in proptest::collection::vec(arb_job(), 0..24),
            facets in arb_facets(),
            policy in 0usize..3,
        ) {
            let mut filters = FilterState { facets, ..FilterState::default() };
            let before = apply(&jobs, &filters).len();
            let policies = ["On-site Working", "Remote Working", "Hybrid Working"];
            filters.facets.work_policies = vec![policies[policy].to_string()];
            prop_assert!(apply(&jobs, &filters).len() <= before);
        }

        #[test]
        fn empty_filter_keeps_everything(jobs in proptest::collection::vec(arb_job(), 0..24)) {
            prop_assert_eq!(apply(&jobs, &FilterState::default()), jobs);
        }
    }
}
