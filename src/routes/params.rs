use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::entity::sea_orm_active_enums::OrderStatus;

// Query strings are decoded by serde_urlencoded, which cannot parse numbers
// through `#[serde(flatten)]`, so every query struct carries its own paging fields.

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// A normalized page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
    pub offset: i64,
}

impl Page {
    pub fn limit(&self) -> u64 {
        self.per_page as u64
    }

    pub fn offset(&self) -> u64 {
        self.offset as u64
    }
}

impl Pagination {
    pub fn normalize(&self) -> Page {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        Page {
            page,
            per_page,
            offset,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortBy {
    #[default]
    CreatedAt,
    Price,
    Name,
    Stock,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub q: Option<String>,
    pub category_id: Option<i64>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
    pub sort_by: Option<ProductSortBy>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<OrderStatus>,
    pub payment_type: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SearchQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct NotificationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub unread_only: Option<bool>,
}

macro_rules! impl_paged {
    ($($ty:ty),*) => {
        $(impl $ty {
            pub fn page(&self) -> Page {
                Pagination {
                    page: self.page,
                    per_page: self.per_page,
                }
                .normalize()
            }
        })*
    };
}

impl_paged!(ProductQuery, OrderListQuery, SearchQuery, NotificationQuery);

/// Trimmed, non-empty search text.
pub fn search_term(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_to_first_page() {
        let page = Pagination::default().normalize();
        assert_eq!(
            page,
            Page {
                page: 1,
                per_page: 20,
                offset: 0
            }
        );
    }

    #[test]
    fn pagination_clamps_out_of_range_values() {
        let page = Pagination {
            page: Some(-3),
            per_page: Some(1000),
        }
        .normalize();
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 100);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn huge_page_numbers_saturate_instead_of_overflowing() {
        let page = ProductQuery {
            page: Some(i64::MAX),
            per_page: Some(20),
            ..Default::default()
        }
        .page();
        assert_eq!(page.page, i64::MAX);
        assert_eq!(page.offset, i64::MAX);
        assert_eq!(page.offset(), i64::MAX as u64);
    }

    #[test]
    fn query_structs_share_paging() {
        let query = OrderListQuery {
            page: Some(3),
            per_page: Some(10),
            ..Default::default()
        };
        let page = query.page();
        assert_eq!(page.offset(), 20);
        assert_eq!(page.limit(), 10);
    }

    #[test]
    fn search_term_ignores_blank_input() {
        assert_eq!(search_term(Some(&"  ".to_string())), None);
        assert_eq!(search_term(Some(&" mug ".to_string())), Some("mug"));
        assert_eq!(search_term(None), None);
    }
}
