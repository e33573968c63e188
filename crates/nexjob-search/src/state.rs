//! Merges route locks, query parameters, and user edits into one filter state.

use nexjob_core::{FacetKind, FilterState, LocationType, SortOrder};
use serde::{Deserialize, Serialize};

/// Facets baked into the route (`/kategori/{slug}/`, `/lokasi/{slug}/`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RouteLock {
    pub category: Option<String>,
    pub location: Option<(String, LocationType)>,
}

impl RouteLock {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn category(name: impl Into<String>) -> Self {
        Self {
            category: Some(name.into()),
            location: None,
        }
    }

    pub fn location(name: impl Into<String>, kind: LocationType) -> Self {
        Self {
            category: None,
            location: Some((name.into(), kind)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.category.is_some() || self.location.is_some()
    }

    pub fn locked_province(&self) -> &str {
        match &self.location {
            Some((name, LocationType::Province)) => name,
            _ => "",
        }
    }

    pub fn locked_city(&self) -> Option<&str> {
        match &self.location {
            Some((name, LocationType::City)) => Some(name),
            _ => None,
        }
    }

    pub fn is_locked(&self, kind: FacetKind, value: &str) -> bool {
        match kind {
            FacetKind::Category => self.category.as_deref() == Some(value),
            FacetKind::City => self.locked_city() == Some(value),
            _ => false,
        }
    }

    /// The filter state a page shows before any user edit.
    pub fn defaults(&self) -> FilterState {
        let mut state = FilterState {
            province: self.locked_province().to_string(),
            ..FilterState::default()
        };
        if let Some(city) = self.locked_city() {
            state.facets.cities.push(city.to_string());
        }
        if let Some(category) = &self.category {
            state.facets.categories.push(category.clone());
        }
        state
    }
}

/// Query string accepted by the listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListingQuery {
    pub search: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterTarget {
    Keyword,
    Province,
    Facet { kind: FacetKind, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEdit {
    SetKeyword(String),
    SetProvince(String),
    ToggleFacet {
        kind: FacetKind,
        value: String,
        selected: bool,
    },
    RemoveFilter(FilterTarget),
    ClearAll,
    SetSort(SortOrder),
}

/// Removable badge for one active user filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChip {
    pub target: FilterTarget,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchStateSync {
    lock: RouteLock,
    state: FilterState,
}

impl SearchStateSync {
    pub fn new(lock: RouteLock) -> Self {
        let state = lock.defaults();
        Self { lock, state }
    }

    /// Initial state from the URL; locked dimensions ignore their query parameter.
    pub fn hydrate(lock: RouteLock, query: &ListingQuery) -> Self {
        let mut sync = Self::new(lock);
        if let Some(search) = query.search.as_deref() {
            sync.state.keyword = search.to_string();
        }
        if sync.lock.location.is_none() {
            if let Some(location) = query.location.as_deref().filter(|l| !l.is_empty()) {
                sync.state.province = location.to_string();
            }
        }
        if sync.lock.category.is_none() {
            if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
                sync.state
                    .facets
                    .set_selected(FacetKind::Category, category, true);
            }
        }
        sync
    }

    pub fn lock(&self) -> &RouteLock {
        &self.lock
    }

    /// The filter every fetch uses; locked values are always present.
    pub fn effective(&self) -> &FilterState {
        &self.state
    }

    /// Applies one user edit. Returns whether the effective filter changed.
    pub fn apply(&mut self, edit: SearchEdit) -> bool {
        let before = self.state.clone();
        match edit {
            SearchEdit::SetKeyword(keyword) => self.state.keyword = keyword,
            SearchEdit::SetProvince(province) => {
                if self.lock.location.is_none() {
                    self.state.province = province;
                }
            }
            SearchEdit::ToggleFacet {
                kind,
                value,
                selected,
            } => {
                if selected || !self.lock.is_locked(kind, &value) {
                    self.state.facets.set_selected(kind, &value, selected);
                }
            }
            SearchEdit::RemoveFilter(FilterTarget::Keyword) => self.state.keyword.clear(),
            SearchEdit::RemoveFilter(FilterTarget::Province) => {
                let defaults = self.lock.defaults();
                self.state.province = defaults.province;
                self.state.facets.cities = defaults.facets.cities;
            }
            SearchEdit::RemoveFilter(FilterTarget::Facet { kind, value }) => {
                if !self.lock.is_locked(kind, &value) {
                    self.state.facets.set_selected(kind, &value, false);
                }
            }
            SearchEdit::ClearAll => {
                let sort = self.state.sort;
                self.state = self.lock.defaults();
                self.state.sort = sort;
            }
            SearchEdit::SetSort(sort) => self.state.sort = sort,
        }
        self.state != before
    }

    fn province_is_user_set(&self) -> bool {
        !self.state.province.is_empty() && self.state.province != self.lock.locked_province()
    }

    /// Count of user-applied filters; route-locked values do not count.
    pub fn active_filter_count(&self) -> usize {
        self.chips().len()
    }

    pub fn chips(&self) -> Vec<FilterChip> {
        let mut chips = Vec::new();
        let keyword = self.state.keyword.trim();
        if !keyword.is_empty() {
            chips.push(FilterChip {
                target: FilterTarget::Keyword,
                label: format!("\"{keyword}\""),
            });
        }
        if self.province_is_user_set() {
            chips.push(FilterChip {
                target: FilterTarget::Province,
                label: self.state.province.clone(),
            });
        }
        for kind in FacetKind::ALL {
            for value in self.state.facets.values(kind) {
                if self.lock.is_locked(kind, value) {
                    continue;
                }
                chips.push(FilterChip {
                    target: FilterTarget::Facet {
                        kind,
                        value: value.clone(),
                    },
                    label: value.clone(),
                });
            }
        }
        chips
    }

    /// The in-place URL for the current state; `None` on route-locked pages.
    pub fn url_sync(&self) -> Option<String> {
        if self.lock.is_active() {
            return None;
        }
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        let keyword = self.state.keyword.trim();
        if !keyword.is_empty() {
            query.append_pair("search", keyword);
        }
        if !self.state.province.is_empty() {
            query.append_pair("location", &self.state.province);
        }
        let query = query.finish();
        Some(if query.is_empty() {
            "/lowongan-kerja/".to_string()
        } else {
            format!("/lowongan-kerja/?{query}")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggle(kind: FacetKind, value: &str, selected: bool) -> SearchEdit {
        SearchEdit::ToggleFacet {
            kind,
            value: value.into(),
            selected,
        }
    }

    #[test]
    fn query_hydrates_unlocked_dimensions() {
        let query = ListingQuery {
            search: Some("kasir".into()),
            location: Some("Bali".into()),
            category: Some("Sales".into()),
        };
        let sync = SearchStateSync::hydrate(RouteLock::none(), &query);
        assert_eq!(sync.effective().keyword, "kasir");
        assert_eq!(sync.effective().province, "Bali");
        assert_eq!(sync.effective().facets.categories, vec!["Sales"]);
        assert_eq!(sync.active_filter_count(), 3);
    }

    #[test]
    fn locked_dimensions_ignore_query() {
        let query = ListingQuery {
            search: None,
            location: Some("Bali".into()),
            category: Some("Sales".into()),
        };
        let lock = RouteLock {
            category: Some("Akuntansi".into()),
            location: Some(("Jawa Barat".into(), LocationType::Province)),
        };
        let sync = SearchStateSync::hydrate(lock, &query);
        assert_eq!(sync.effective().province, "Jawa Barat");
        assert_eq!(sync.effective().facets.categories, vec!["Akuntansi"]);
        assert_eq!(sync.active_filter_count(), 0);
    }

    #[test]
    fn locked_category_cannot_be_removed() {
        let mut sync = SearchStateSync::new(RouteLock::category("Sales"));
        assert!(!sync.apply(SearchEdit::RemoveFilter(FilterTarget::Facet {
            kind: FacetKind::Category,
            value: "Sales".into(),
        })));
        assert!(!sync.apply(toggle(FacetKind::Category, "Sales", false)));
        assert_eq!(sync.effective().facets.categories, vec!["Sales"]);

        assert!(sync.apply(toggle(FacetKind::Category, "Akuntansi", true)));
        assert_eq!(sync.active_filter_count(), 1);
        assert!(sync.apply(SearchEdit::ClearAll));
        assert_eq!(sync.effective().facets.categories, vec!["Sales"]);
    }

    #[test]
    fn removing_province_restores_locked_city() {
        let mut sync = SearchStateSync::new(RouteLock::location("Bandung", LocationType::City));
        sync.apply(toggle(FacetKind::City, "Bekasi", true));
        assert_eq!(sync.effective().facets.cities, vec!["Bandung", "Bekasi"]);
        assert_eq!(sync.active_filter_count(), 1);

        sync.apply(SearchEdit::RemoveFilter(FilterTarget::Province));
        assert_eq!(sync.effective().facets.cities, vec!["Bandung"]);
        assert_eq!(sync.active_filter_count(), 0);
    }

    #[test]
    fn province_lock_blocks_province_edits() {
        let mut sync = SearchStateSync::new(RouteLock::location("Bali", LocationType::Province));
        assert!(!sync.apply(SearchEdit::SetProvince("Jawa Timur".into())));
        assert_eq!(sync.effective().province, "Bali");
        assert!(sync.chips().is_empty());
    }

    #[test]
    fn clear_all_keeps_sort_and_resets_filters() {
        let mut sync = SearchStateSync::new(RouteLock::none());
        sync.apply(SearchEdit::SetKeyword("react".into()));
        sync.apply(SearchEdit::SetProvince("DKI Jakarta".into()));
        sync.apply(toggle(FacetKind::JobType, "Full Time", true));
        sync.apply(SearchEdit::SetSort(SortOrder::Relevant));
        assert_eq!(sync.active_filter_count(), 3);

        sync.apply(SearchEdit::ClearAll);
        assert_eq!(sync.active_filter_count(), 0);
        assert_eq!(sync.effective().sort, SortOrder::Relevant);
        assert!(sync.effective().facets.is_empty());
    }

    #[test]
    fn url_sync_only_on_unlocked_pages() {
        let mut sync = SearchStateSync::new(RouteLock::none());
        assert_eq!(sync.url_sync().as_deref(), Some("/lowongan-kerja/"));
        sync.apply(SearchEdit::SetKeyword("data analyst".into()));
        sync.apply(SearchEdit::SetProvince("DKI Jakarta".into()));
        sync.apply(toggle(FacetKind::JobType, "Full Time", true));
        assert_eq!(
            sync.url_sync().as_deref(),
            Some("/lowongan-kerja/?search=data+analyst&location=DKI+Jakarta")
        );

        let locked = SearchStateSync::new(RouteLock::category("Sales"));
        assert_eq!(locked.url_sync(), None);
    }

    #[test]
    fn repeated_edits_report_no_change() {
        let mut sync = SearchStateSync::new(RouteLock::none());
        assert!(sync.apply(toggle(FacetKind::Education, "S1", true)));
        assert!(!sync.apply(toggle(FacetKind::Education, "S1", true)));
        assert!(!sync.apply(SearchEdit::SetSort(SortOrder::Newest)));
    }
}
