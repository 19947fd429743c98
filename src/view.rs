//! Paged, filtered view over one immutable dataset snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::facets::{facet_values, Facet, FilterState};
use crate::model::{InventoryRecord, MergedDataset};
use crate::normalization::{estimate_weight, WeightEstimate};

/// One displayed row; the weight is estimated only for rows on the current page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRow {
    #[serde(flatten)]
    pub record: InventoryRecord,
    pub weight: Option<WeightEstimate>,
    pub weight_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub rows: Vec<ViewRow>,
    pub matched: usize,
    pub total: usize,
    /// 1-based.
    pub page: usize,
    pub total_pages: usize,
    pub rows_per_page: usize,
    pub filters_active: bool,
    pub filters: FilterState,
    pub facets: BTreeMap<Facet, Vec<String>>,
    pub diagnostic: bool,
}

impl ViewSnapshot {
    pub fn showing(&self) -> String {
        format!("Showing {} of {}", self.matched, self.total)
    }
}

pub struct InventoryView {
    dataset: Arc<MergedDataset>,
    filters: FilterState,
    facets: BTreeMap<Facet, Vec<String>>,
    /// Indices into `dataset.records` passing `filters`.
    matches: Vec<usize>,
    page: usize,
    rows_per_page: usize,
}

impl InventoryView {
    pub fn new(dataset: Arc<MergedDataset>, rows_per_page: usize) -> Self {
        let mut view = Self {
            dataset,
            filters: FilterState::new(),
            facets: BTreeMap::new(),
            matches: Vec::new(),
            page: 1,
            rows_per_page: rows_per_page.max(1),
        };
        view.rebuild_facets();
        view.refilter();
        view
    }

    pub fn dataset(&self) -> &Arc<MergedDataset> {
        &self.dataset
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    /// Swap in a new snapshot; selections survive, the page is clamped.
    pub fn set_dataset(&mut self, dataset: Arc<MergedDataset>) {
        self.dataset = dataset;
        self.rebuild_facets();
        self.refilter();
        self.page = self.page.clamp(1, self.total_pages());
    }

    pub fn set_facet(&mut self, facet: Facet, value: &str) {
        self.filters.set(facet, value);
        self.refilter();
        self.page = 1;
    }

    pub fn set_query(&mut self, text: &str) {
        self.filters.set_query(text);
        self.refilter();
        self.page = 1;
    }

    pub fn reset_filters(&mut self) {
        self.filters.clear();
        self.refilter();
        self.page = 1;
    }

    /// Jump to `page`, clamped into `1..=total_pages`.
    pub fn set_page(&mut self, page: usize) {
        self.page = page.clamp(1, self.total_pages());
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn matched(&self) -> usize {
        self.matches.len()
    }

    pub fn total_pages(&self) -> usize {
        self.matches.len().div_ceil(self.rows_per_page).max(1)
    }

    pub fn facet_values(&self, facet: Facet) -> &[String] {
        self.facets.get(&facet).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn find(&self, product_code: &str) -> Option<&InventoryRecord> {
        self.dataset.find_by_code(product_code)
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let start = (self.page - 1) * self.rows_per_page;
        let rows = self
            .matches
            .iter()
            .skip(start)
            .take(self.rows_per_page)
            .map(|&idx| {
                let record = &self.dataset.records[idx];
                let weight = estimate_weight(record);
                ViewRow {
                    weight_label: weight.map(|w| w.label()),
                    weight,
                    record: record.clone(),
                }
            })
            .collect();

        ViewSnapshot {
            rows,
            matched: self.matches.len(),
            total: self.dataset.len(),
            page: self.page,
            total_pages: self.total_pages(),
            rows_per_page: self.rows_per_page,
            filters_active: self.filters.is_active(),
            filters: self.filters.clone(),
            facets: self.facets.clone(),
            diagnostic: self.dataset.diagnostic,
        }
    }

    fn rebuild_facets(&mut self) {
        self.facets = Facet::ALL
            .iter()
            .map(|&facet| (facet, facet_values(&self.dataset.records, facet)))
            .collect();
    }

    fn refilter(&mut self) {
        self.matches = self
            .dataset
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| self.filters.matches(r))
            .map(|(idx, _)| idx)
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dataset(n: usize) -> Arc<MergedDataset> {
        let records = (0..n)
            .map(|i| InventoryRecord {
                product_code: format!("EP-{i}"),
                color: if i % 2 == 0 { "Blue Pearl" } else { "India Black" }.into(),
                size: "36 x 8 x 24".into(),
                location: "Elberton".into(),
                weight: (i == 0).then_some(812.5),
                ..InventoryRecord::default()
            })
            .collect();
        Arc::new(MergedDataset::new(records, Utc::now()))
    }

    #[test]
    fn pages_rows_and_reports_counts() {
        let mut view = InventoryView::new(dataset(120), 50);
        let snap = view.snapshot();
        assert_eq!(snap.rows.len(), 50);
        assert_eq!(snap.total_pages, 3);
        assert_eq!(snap.showing(), "Showing 120 of 120");
        assert!(!snap.filters_active);

        view.set_page(3);
        assert_eq!(view.snapshot().rows.len(), 20);
        view.set_page(99);
        assert_eq!(view.page(), 3);
        view.set_page(0);
        assert_eq!(view.page(), 1);
    }

    #[test]
    fn facet_change_resets_to_first_page_without_touching_the_dataset() {
        let data = dataset(120);
        let mut view = InventoryView::new(data.clone(), 50);
        view.set_page(2);
        view.set_facet(Facet::Color, "blue pearl");

        let snap = view.snapshot();
        assert_eq!(snap.page, 1);
        assert_eq!(snap.matched, 60);
        assert_eq!(snap.total, 120);
        assert!(snap.filters_active);
        assert!(Arc::ptr_eq(view.dataset(), &data));
    }

    #[test]
    fn reset_restores_the_unfiltered_view() {
        let mut view = InventoryView::new(dataset(10), 50);
        let before = view.snapshot();
        view.set_facet(Facet::Color, "India Black");
        view.set_query("EP-3");
        assert_eq!(view.matched(), 1);

        view.reset_filters();
        assert_eq!(view.snapshot(), before);
    }

    #[test]
    fn weights_are_labelled_by_source() {
        let view = InventoryView::new(dataset(2), 50);
        let snap = view.snapshot();
        assert_eq!(snap.rows[0].weight, Some(WeightEstimate::Authoritative(812.5)));
        assert_eq!(snap.rows[0].weight_label.as_deref(), Some("812.5 lbs"));
        assert!(snap.rows[1].weight.unwrap().is_estimated());
        assert_eq!(snap.rows[1].weight_label.as_deref(), Some("~340 lbs (estimated)"));
    }

    #[test]
    fn empty_match_set_still_has_one_page() {
        let mut view = InventoryView::new(dataset(5), 50);
        view.set_query("no such stone");
        let snap = view.snapshot();
        assert_eq!(snap.total_pages, 1);
        assert!(snap.rows.is_empty());
        assert_eq!(snap.showing(), "Showing 0 of 5");
    }
}
