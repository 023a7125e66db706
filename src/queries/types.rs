//! Response types for the query surface.

use chrono::NaiveDate;
use serde::Serialize;

use crate::store::ScanBounds;

pub const DEFAULT_PER_PAGE: u64 = 10;
pub const MAX_PER_PAGE: u64 = 100;

/// Validated pagination input.
///
/// Out-of-range values fall back to defaults rather than erroring:
/// `page < 1` becomes 1, and `per_page` outside `1..=100` becomes 10.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Page {
    pub page: u64,
    pub per_page: u64,
}

impl Page {
    pub fn new(page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        let per_page = if per_page < 1 || per_page > MAX_PER_PAGE {
            DEFAULT_PER_PAGE
        } else {
            per_page
        };
        Page { page, per_page }
    }

    /// Skip/limit bounds for the source document scan.
    pub fn bounds(&self) -> ScanBounds {
        ScanBounds {
            skip: (self.page - 1) * self.per_page,
            limit: self.per_page,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Trip count for one calendar day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyTripCount {
    pub date: NaiveDate,
    pub total_trips: u64,
}

/// Average fare for one geographic cell.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HeatmapCell {
    pub cell_token: String,
    pub average_fare: f64,
}

/// Echoed pagination metadata.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageMeta {
    pub page: u64,
    pub per_page: u64,
}

/// Fare heatmap response for one scanned page of source documents.
#[derive(Debug, Clone, Serialize)]
pub struct HeatmapPage {
    pub data: Vec<HeatmapCell>,
    pub meta: PageMeta,
}

/// Average speed response, km/h at two-decimal precision.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpeedSummary {
    pub average_speed: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_sanitizes_out_of_range_input() {
        assert_eq!(Page::new(0, 50).page, 1);
        assert_eq!(Page::new(3, 0).per_page, DEFAULT_PER_PAGE);
        assert_eq!(Page::new(3, 101).per_page, DEFAULT_PER_PAGE);
        assert_eq!(Page::new(3, 100).per_page, 100);
    }

    #[test]
    fn test_page_bounds() {
        let b = Page::new(3, 25).bounds();
        assert_eq!(b.skip, 50);
        assert_eq!(b.limit, 25);
    }
}
