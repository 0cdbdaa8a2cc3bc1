//! Book persistence.
//!
//! Handlers talk to a [`BookStore`]; [`PgBookStore`] backs it with
//! PostgreSQL and [`super::memory::MemoryBookStore`] keeps everything in
//! process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Row};
use thiserror::Error;
use tracing::{debug, instrument};

use shelf_http::AppError;
use shelf_kernel::{Filters, Metadata, SortColumn};

use super::models::{Book, BookInput, BookSort};

const BOOK_COLUMNS: &str =
    "id, title, isbn, publisher, publication_year, minimum_age, description, created_at, updated_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("a book with this isbn already exists")]
    DuplicateIsbn,

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::DuplicateIsbn,
            other => StoreError::Database(other),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::DuplicateIsbn => {
                let mut errors = BTreeMap::new();
                errors.insert(
                    "isbn".to_string(),
                    "a book with this isbn already exists".to_string(),
                );
                AppError::failed_validation(errors)
            }
            StoreError::Database(db) => AppError::Internal(db.into()),
        }
    }
}

/// Storage operations for books. Ids below 1 never reach storage and are
/// reported as [`StoreError::NotFound`].
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Persist a new book; the store assigns id and timestamps.
    async fn insert(&self, input: &BookInput) -> Result<Book, StoreError>;

    async fn get(&self, id: i64) -> Result<Book, StoreError>;

    /// One page of books plus the page metadata for the whole result set.
    async fn list(&self, filters: &Filters) -> Result<(Vec<Book>, Metadata), StoreError>;

    /// Overwrite the stored fields of `book.id` and refresh `updated_at`.
    async fn update(&self, book: &Book) -> Result<Book, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// PostgreSQL implementation of [`BookStore`].
pub struct PgBookStore {
    pool: PgPool,
}

impl PgBookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    #[instrument(skip(self, input), fields(isbn = %input.isbn))]
    async fn insert(&self, input: &BookInput) -> Result<Book, StoreError> {
        let query = format!(
            "INSERT INTO books (title, isbn, publisher, publication_year, minimum_age, description)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {BOOK_COLUMNS}"
        );

        let book = sqlx::query_as::<_, Book>(&query)
            .bind(&input.title)
            .bind(&input.isbn)
            .bind(&input.publisher)
            .bind(input.publication_year)
            .bind(input.minimum_age)
            .bind(&input.description)
            .fetch_one(&self.pool)
            .await?;

        debug!(book_id = book.id, "book inserted");
        Ok(book)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<Book, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1");
        sqlx::query_as::<_, Book>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(page = filters.page, page_size = filters.page_size, sort = %filters.sort))]
    async fn list(&self, filters: &Filters) -> Result<(Vec<Book>, Metadata), StoreError> {
        let column: BookSort = filters.sort_column();
        let query = format!(
            "SELECT count(*) OVER() AS total_records, {BOOK_COLUMNS}
             FROM books
             ORDER BY {} {}, id ASC
             LIMIT $1 OFFSET $2",
            column.as_sql(),
            filters.sort_direction().as_sql(),
        );

        let rows = sqlx::query(&query)
            .bind(filters.limit())
            .bind(filters.offset())
            .fetch_all(&self.pool)
            .await?;

        let mut total_records = 0;
        let mut books = Vec::with_capacity(rows.len());
        for row in &rows {
            total_records = row.try_get("total_records")?;
            books.push(Book::from_row(row)?);
        }

        let metadata = Metadata::calculate(total_records, filters.page, filters.page_size);
        Ok((books, metadata))
    }

    #[instrument(skip(self, book), fields(book_id = book.id))]
    async fn update(&self, book: &Book) -> Result<Book, StoreError> {
        if book.id < 1 {
            return Err(StoreError::NotFound);
        }

        let query = format!(
            "UPDATE books
             SET title = $1, isbn = $2, publisher = $3, publication_year = $4,
                 minimum_age = $5, description = $6, updated_at = now()
             WHERE id = $7
             RETURNING {BOOK_COLUMNS}"
        );

        sqlx::query_as::<_, Book>(&query)
            .bind(&book.title)
            .bind(&book.isbn)
            .bind(&book.publisher)
            .bind(book.publication_year)
            .bind(book.minimum_age)
            .bind(&book.description)
            .bind(book.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
