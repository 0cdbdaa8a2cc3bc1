//! In-process [`BookStore`] with the same semantics as the PostgreSQL store.

use std::{cmp::Ordering, collections::BTreeMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use shelf_kernel::{Filters, Metadata, SortDirection};

use super::{
    models::{Book, BookInput, BookSort},
    store::{BookStore, StoreError},
};

#[derive(Default)]
struct State {
    last_id: i64,
    books: BTreeMap<i64, Book>,
}

impl State {
    fn isbn_taken(&self, isbn: &str, except: i64) -> bool {
        self.books
            .values()
            .any(|book| book.id != except && book.isbn == isbn)
    }
}

#[derive(Default)]
pub struct MemoryBookStore {
    state: Mutex<State>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare(column: BookSort, a: &Book, b: &Book) -> Ordering {
    match column {
        BookSort::BookId => a.id.cmp(&b.id),
        BookSort::Title => a.title.cmp(&b.title),
        BookSort::PublicationYear => a.publication_year.cmp(&b.publication_year),
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn insert(&self, input: &BookInput) -> Result<Book, StoreError> {
        let mut state = self.state.lock();
        if state.isbn_taken(&input.isbn, 0) {
            return Err(StoreError::DuplicateIsbn);
        }

        state.last_id += 1;
        let now = Utc::now();
        let book = Book {
            id: state.last_id,
            title: input.title.clone(),
            isbn: input.isbn.clone(),
            publisher: input.publisher.clone(),
            publication_year: input.publication_year,
            minimum_age: input.minimum_age,
            description: input.description.clone(),
            created_at: now,
            updated_at: now,
        };
        state.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn get(&self, id: i64) -> Result<Book, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        self.state
            .lock()
            .books
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, filters: &Filters) -> Result<(Vec<Book>, Metadata), StoreError> {
        let column: BookSort = filters.sort_column();
        let direction = filters.sort_direction();

        let mut books: Vec<Book> = self.state.lock().books.values().cloned().collect();
        books.sort_by(|a, b| {
            let primary = match direction {
                SortDirection::Ascending => compare(column, a, b),
                SortDirection::Descending => compare(column, b, a),
            };
            primary.then(a.id.cmp(&b.id))
        });

        let total_records = books.len() as i64;
        let offset = usize::try_from(filters.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(filters.limit()).unwrap_or(0);
        let page: Vec<Book> = books.into_iter().skip(offset).take(limit).collect();

        // Postgres reports the windowed total only on returned rows.
        let total_records = if page.is_empty() { 0 } else { total_records };
        let metadata = Metadata::calculate(total_records, filters.page, filters.page_size);
        Ok((page, metadata))
    }

    async fn update(&self, book: &Book) -> Result<Book, StoreError> {
        if book.id < 1 {
            return Err(StoreError::NotFound);
        }

        let mut state = self.state.lock();
        if !state.books.contains_key(&book.id) {
            return Err(StoreError::NotFound);
        }
        if state.isbn_taken(&book.isbn, book.id) {
            return Err(StoreError::DuplicateIsbn);
        }

        let stored = state
            .books
            .get_mut(&book.id)
            .ok_or(StoreError::NotFound)?;
        stored.apply(BookInput::from(book));
        stored.updated_at = Utc::now().max(stored.created_at);
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        self.state
            .lock()
            .books
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
