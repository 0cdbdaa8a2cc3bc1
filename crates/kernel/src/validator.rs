//! Field-level validation that collects every failure before reporting.

use std::collections::BTreeMap;

/// Accumulates `field -> message` errors. The first failure recorded for a
/// field is the one reported; later failures for the same field are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no errors have been recorded.
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(key.into())
            .or_insert_with(|| message.into());
    }

    /// Records `message` under `key` when `ok` is false.
    ///
    /// ```
    /// use shelf_kernel::Validator;
    ///
    /// let mut v = Validator::new();
    /// v.check(!"".is_empty(), "title", "must be provided");
    /// v.check(false, "title", "must not be more than 255 characters long");
    /// assert_eq!(v.errors()["title"], "must be provided");
    /// ```
    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn into_errors(self) -> BTreeMap<String, String> {
        self.errors
    }
}

/// Returns true if `value` is one of `list`.
pub fn permitted_value<T: PartialEq + ?Sized>(value: &T, list: &[&T]) -> bool {
    list.iter().any(|item| *item == value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validator_is_valid() {
        assert!(Validator::new().valid());
    }

    #[test]
    fn first_failure_per_field_wins() {
        let mut v = Validator::new();
        v.check(false, "isbn", "must be provided");
        v.check(false, "isbn", "must be exactly 13 characters long");

        assert!(!v.valid());
        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors()["isbn"], "must be provided");
    }

    #[test]
    fn passing_checks_record_nothing() {
        let mut v = Validator::new();
        v.check(true, "title", "must be provided");
        assert!(v.valid());
    }

    #[test]
    fn collects_failures_across_fields() {
        let mut v = Validator::new();
        v.check(false, "title", "must be provided");
        v.check(false, "publisher", "must be provided");
        v.check(true, "minimum_age", "must not be negative");

        let errors = v.into_errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains_key("title"));
        assert!(errors.contains_key("publisher"));
    }

    #[test]
    fn permitted_value_matches_exact_entries() {
        let safelist = ["book_id", "-book_id"];
        assert!(permitted_value("-book_id", &safelist));
        assert!(!permitted_value("book", &safelist));
    }
}
