use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelf_kernel::{Patch, SortColumn, Validator};

/// Latest publication year a book may carry.
pub const MAX_PUBLICATION_YEAR: i32 = 2026;

/// Sort tokens accepted by the listing endpoint.
pub const SORT_SAFELIST: &[&str] = &[
    "book_id",
    "title",
    "publication_year",
    "-book_id",
    "-title",
    "-publication_year",
];

/// A persisted book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    /// Store-assigned identifier
    #[serde(rename = "book_id")]
    pub id: i64,
    pub title: String,
    /// 13-character ISBN, unique across the catalogue
    pub isbn: String,
    pub publisher: String,
    pub publication_year: i32,
    /// Minimum recommended reader age
    pub minimum_age: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Overwrite every client-editable field with `input`.
    pub fn apply(&mut self, input: BookInput) {
        self.title = input.title;
        self.isbn = input.isbn;
        self.publisher = input.publisher;
        self.publication_year = input.publication_year;
        self.minimum_age = input.minimum_age;
        self.description = input.description;
    }
}

/// Request body for creating or fully replacing a book.
///
/// Absent keys decode to empty values so that the validator, not the decoder,
/// reports missing fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookInput {
    pub title: String,
    pub isbn: String,
    pub publisher: String,
    pub publication_year: i32,
    pub minimum_age: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Book> for BookInput {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            isbn: book.isbn.clone(),
            publisher: book.publisher.clone(),
            publication_year: book.publication_year,
            minimum_age: book.minimum_age,
            description: book.description.clone(),
        }
    }
}

/// Request body for a partial update. Only keys present in the body are
/// applied; `"description": null` clears the description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookPatch {
    pub title: Patch<String>,
    pub isbn: Patch<String>,
    pub publisher: Patch<String>,
    pub publication_year: Patch<i32>,
    pub minimum_age: Patch<i32>,
    pub description: Patch<Option<String>>,
}

impl BookPatch {
    pub fn apply(self, input: &mut BookInput) {
        self.title.apply_to(&mut input.title);
        self.isbn.apply_to(&mut input.isbn);
        self.publisher.apply_to(&mut input.publisher);
        self.publication_year.apply_to(&mut input.publication_year);
        self.minimum_age.apply_to(&mut input.minimum_age);
        self.description.apply_to(&mut input.description);
    }
}

pub fn validate_book(v: &mut Validator, input: &BookInput) {
    v.check(!input.title.is_empty(), "title", "must be provided");
    v.check(
        input.title.chars().count() <= 255,
        "title",
        "must not be more than 255 characters long",
    );

    v.check(!input.isbn.is_empty(), "isbn", "must be provided");
    v.check(
        input.isbn.chars().count() == 13,
        "isbn",
        "must be exactly 13 characters long",
    );

    v.check(!input.publisher.is_empty(), "publisher", "must be provided");

    v.check(
        input.publication_year != 0,
        "publication_year",
        "must be provided",
    );
    v.check(
        input.publication_year > 0,
        "publication_year",
        "must be a positive integer",
    );
    v.check(
        input.publication_year <= MAX_PUBLICATION_YEAR,
        "publication_year",
        "must not be later than 2026",
    );

    v.check(input.minimum_age >= 0, "minimum_age", "must not be negative");
}

/// Columns a book listing may be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BookSort {
    #[default]
    BookId,
    Title,
    PublicationYear,
}

impl SortColumn for BookSort {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "book_id" => Some(BookSort::BookId),
            "title" => Some(BookSort::Title),
            "publication_year" => Some(BookSort::PublicationYear),
            _ => None,
        }
    }

    fn as_sql(&self) -> &'static str {
        match self {
            BookSort::BookId => "id",
            BookSort::Title => "title",
            BookSort::PublicationYear => "publication_year",
        }
    }
}
