//! List pagination parsed from query parameters.
//!
//! `page` and `limit` enable pagination; when neither is present the full
//! filtered set is returned (the collection still carries `total_count`).
//! Invalid values count as "not provided". Ordering is always by `id`,
//! ascending unless `sort=desc`.

use crate::admin::resource::QueryParams;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 100;
pub const DEFAULT_PAGE: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_query_params(params: &QueryParams) -> Self {
        match params.get("sort").map(String::as_str) {
            Some("desc") => Self::Desc,
            _ => Self::Asc,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    limit: i64,
    page: i64,
}

impl Pagination {
    pub fn new(limit: i64, page: i64) -> Self {
        Self { limit, page }
    }

    /// None when neither `page` nor `limit` is provided: pagination is
    /// disabled and the whole set is returned.
    pub fn from_query_params(params: &QueryParams) -> Option<Self> {
        let limit = int_param(params, "limit");
        let page = int_param(params, "page");

        if limit == 0 && page == 0 {
            return None;
        }

        Some(Self::new(limit, page))
    }

    pub fn limit(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_LIMIT
        } else {
            self.limit.min(MAX_LIMIT)
        }
    }

    pub fn page(&self) -> i64 {
        if self.page <= 0 { DEFAULT_PAGE } else { self.page }
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}

fn int_param(params: &QueryParams, key: &str) -> i64 {
    params
        .get(key)
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_disabled_without_page_and_limit() {
        assert_eq!(Pagination::from_query_params(&params(&[])), None);
        assert_eq!(
            Pagination::from_query_params(&params(&[("sort", "desc")])),
            None
        );
        // Invalid numbers are treated as not provided.
        assert_eq!(
            Pagination::from_query_params(&params(&[("page", "abc")])),
            None
        );
    }

    #[test]
    fn test_defaults() {
        let p = Pagination::from_query_params(&params(&[("page", "1")])).unwrap();
        assert_eq!(p.limit(), DEFAULT_LIMIT);
        assert_eq!(p.page(), 1);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_offset_math() {
        let p = Pagination::new(25, 4);
        assert_eq!(p.offset(), 75);
    }

    #[test]
    fn test_limit_is_capped() {
        let p = Pagination::from_query_params(&params(&[("limit", "5000")])).unwrap();
        assert_eq!(p.limit(), MAX_LIMIT);
    }

    #[test]
    fn test_sort_order() {
        assert_eq!(
            SortOrder::from_query_params(&params(&[])),
            SortOrder::Asc
        );
        assert_eq!(
            SortOrder::from_query_params(&params(&[("sort", "desc")])),
            SortOrder::Desc
        );
        assert_eq!(
            SortOrder::from_query_params(&params(&[("sort", "upside-down")])),
            SortOrder::Asc
        );
    }
}
