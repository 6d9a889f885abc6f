// Query pipeline - filter, search, sort, paginate over one dataset snapshot.

use crate::codec::Row;
use crate::error::Result;
use crate::filter::{CompiledFilter, FilterPredicate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Parameters for one read. Predicates are conjunctive: a row must satisfy
/// all of them. `search` is a case-insensitive substring test across every
/// field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    pub predicates: Vec<FilterPredicate>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub offset: usize,
    pub limit: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        QueryParams {
            predicates: Vec::new(),
            search: None,
            sort_by: None,
            sort_order: SortOrder::Asc,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// A bounded slice of the filtered, sorted row sequence. `total` counts the
/// whole filtered set so the caller can compute navigation links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub total: usize,
    pub rows: Vec<Row>,
    pub offset: usize,
    pub limit: usize,
}

/// Run the pipeline over a decoded snapshot. Predicates are compiled first
/// so a malformed one fails the query before any row is visited; the slice
/// is clamped to `max_page_size`. An offset past the filtered count yields
/// an empty slice with the correct total.
pub fn run(rows: Vec<Row>, params: &QueryParams, max_page_size: usize) -> Result<Page> {
    let filters = params
        .predicates
        .iter()
        .map(CompiledFilter::compile)
        .collect::<Result<Vec<_>>>()?;

    let mut filtered: Vec<Row> = rows
        .into_iter()
        .filter(|row| filters.iter().all(|f| f.matches(row)))
        .collect();

    if let Some(search) = params.search.as_deref().filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        filtered.retain(|row| {
            row.values()
                .any(|value| value.to_lowercase().contains(&needle))
        });
    }

    let total = filtered.len();

    if let Some(sort_by) = params.sort_by.as_deref() {
        sort_rows(&mut filtered, sort_by, params.sort_order);
    }

    let limit = params.limit.min(max_page_size);
    let start = params.offset.min(total);
    let rows: Vec<Row> = filtered.into_iter().skip(start).take(limit).collect();

    Ok(Page {
        total,
        rows,
        offset: params.offset,
        limit,
    })
}

/// Stable sort by one field. Missing values sort as empty strings. When
/// every value in the set parses as a number the comparison is numeric,
/// otherwise lexicographic.
fn sort_rows(rows: &mut [Row], field: &str, order: SortOrder) {
    let numeric = !rows.is_empty()
        && rows.iter().all(|row| {
            row.get(field)
                .map_or(false, |value| value.trim().parse::<f64>().is_ok())
        });

    rows.sort_by(|a, b| {
        let left = a.get(field).map(String::as_str).unwrap_or("");
        let right = b.get(field).map(String::as_str).unwrap_or("");
        let ordering = if numeric {
            left.trim()
                .parse::<f64>()
                .ok()
                .zip(right.trim().parse::<f64>().ok())
                .and_then(|(l, r)| l.partial_cmp(&r))
                .unwrap_or(Ordering::Equal)
        } else {
            left.cmp(right)
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}
