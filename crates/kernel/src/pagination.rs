//! Offset pagination with allow-listed sorting.
//!
//! User input never reaches a query string directly: the sort token is checked
//! against a safelist, then resolved into a [`SortColumn`] value whose SQL
//! identifier is a `&'static str` chosen by the implementing type.

use serde::Serialize;

use crate::validator::{permitted_value, Validator};

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Closed set of columns a listing may be ordered by.
pub trait SortColumn: Copy + Default {
    /// Parse a bare column name (no `-` prefix).
    fn parse(name: &str) -> Option<Self>;

    /// SQL identifier for ORDER BY.
    fn as_sql(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Pagination and sorting inputs taken from the query string.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    /// Resolves the sort token to a column, falling back to the default
    /// column for anything outside the safelist.
    pub fn sort_column<C: SortColumn>(&self) -> C {
        if !permitted_value(self.sort.as_str(), self.sort_safelist) {
            return C::default();
        }

        C::parse(self.sort.trim_start_matches('-')).unwrap_or_default()
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

pub fn validate_filters(v: &mut Validator, f: &Filters) {
    v.check(f.page > 0, "page", "must be greater than zero");
    v.check(f.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(f.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        f.page_size <= MAX_PAGE_SIZE,
        "page_size",
        "must be a maximum of 100",
    );
    v.check(
        permitted_value(f.sort.as_str(), f.sort_safelist),
        "sort",
        "invalid sort value",
    );
}

/// Page bookkeeping returned next to a listing. All zero (and serialized as
/// `{}`) when there are no records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size <= 0 {
            return Metadata::default();
        }

        Metadata {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFELIST: &[&str] = &["id", "name", "-id", "-name"];

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    enum Column {
        #[default]
        Id,
        Name,
    }

    impl SortColumn for Column {
        fn parse(name: &str) -> Option<Self> {
            match name {
                "id" => Some(Column::Id),
                "name" => Some(Column::Name),
                _ => None,
            }
        }

        fn as_sql(&self) -> &'static str {
            match self {
                Column::Id => "id",
                Column::Name => "name",
            }
        }
    }

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters {
            page,
            page_size,
            sort: sort.to_string(),
            sort_safelist: SAFELIST,
        }
    }

    #[test]
    fn descending_prefix_resolves_column_and_direction() {
        let f = filters(1, 20, "-name");
        assert_eq!(f.sort_column::<Column>(), Column::Name);
        assert_eq!(f.sort_direction(), SortDirection::Descending);
        assert_eq!(f.sort_column::<Column>().as_sql(), "name");
    }

    #[test]
    fn unknown_sort_falls_back_to_default_column() {
        let f = filters(1, 20, "password");
        assert_eq!(f.sort_column::<Column>(), Column::Id);
        assert_eq!(f.sort_direction(), SortDirection::Ascending);
    }

    #[test]
    fn limit_and_offset_follow_page() {
        let f = filters(3, 10, "id");
        assert_eq!(f.limit(), 10);
        assert_eq!(f.offset(), 20);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut v = Validator::new();
        validate_filters(&mut v, &filters(0, 101, "foo"));

        let errors = v.errors();
        assert_eq!(errors["page"], "must be greater than zero");
        assert_eq!(errors["page_size"], "must be a maximum of 100");
        assert_eq!(errors["sort"], "invalid sort value");
    }

    #[test]
    fn validation_caps_page_number() {
        let mut v = Validator::new();
        validate_filters(&mut v, &filters(MAX_PAGE + 1, 20, "id"));
        assert_eq!(v.errors()["page"], "must be a maximum of 10 million");

        let mut v = Validator::new();
        validate_filters(&mut v, &filters(MAX_PAGE, MAX_PAGE_SIZE, "-name"));
        assert!(v.valid());
    }

    #[test]
    fn metadata_rounds_last_page_up() {
        let metadata = Metadata::calculate(25, 2, 10);
        assert_eq!(
            metadata,
            Metadata {
                current_page: 2,
                page_size: 10,
                first_page: 1,
                last_page: 3,
                total_records: 25,
            }
        );
    }

    #[test]
    fn metadata_is_empty_without_records() {
        let metadata = Metadata::calculate(0, 7, 10);
        assert_eq!(metadata, Metadata::default());
        assert_eq!(serde_json::to_string(&metadata).unwrap(), "{}");
    }
}
