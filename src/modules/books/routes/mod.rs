//! HTTP handlers for `/v1/books`.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde_json::json;

use shelf_http::{
    envelope,
    extract::{read_int, read_string, IdParam, StrictJson},
    AppError,
};
use shelf_kernel::{pagination::validate_filters, Filters, Validator};

use super::{
    models::{validate_book, BookInput, BookPatch, SORT_SAFELIST},
    store::BookStore,
};

pub type SharedStore = Arc<dyn BookStore>;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route(
            "/{id}",
            get(show_book)
                .put(replace_book)
                .patch(patch_book)
                .delete(delete_book),
        )
        .with_state(store)
}

fn ensure_valid(input: &BookInput) -> Result<(), AppError> {
    let mut v = Validator::new();
    validate_book(&mut v, input);
    if v.valid() {
        Ok(())
    } else {
        Err(AppError::failed_validation(v.into_errors()))
    }
}

async fn create_book(
    State(store): State<SharedStore>,
    StrictJson(input): StrictJson<BookInput>,
) -> Result<Response, AppError> {
    ensure_valid(&input)?;

    let book = store.insert(&input).await?;
    tracing::info!(book_id = book.id, "book created");

    let location = HeaderValue::try_from(format!("/v1/books/{}", book.id))
        .context("book location is not a valid header value")?;
    let mut response = envelope(StatusCode::CREATED, &json!({ "book": book }));
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

async fn show_book(
    State(store): State<SharedStore>,
    IdParam(id): IdParam,
) -> Result<Response, AppError> {
    let book = store.get(id).await?;
    Ok(envelope(StatusCode::OK, &json!({ "book": book })))
}

async fn list_books(
    State(store): State<SharedStore>,
    Query(qs): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let mut v = Validator::new();
    let filters = Filters {
        page: read_int(&qs, "page", 1, &mut v),
        page_size: read_int(&qs, "page_size", 20, &mut v),
        sort: read_string(&qs, "sort", "book_id"),
        sort_safelist: SORT_SAFELIST,
    };

    validate_filters(&mut v, &filters);
    if !v.valid() {
        return Err(AppError::failed_validation(v.into_errors()));
    }

    let (books, metadata) = store.list(&filters).await?;
    Ok(envelope(
        StatusCode::OK,
        &json!({ "books": books, "metadata": metadata }),
    ))
}

async fn replace_book(
    State(store): State<SharedStore>,
    IdParam(id): IdParam,
    StrictJson(input): StrictJson<BookInput>,
) -> Result<Response, AppError> {
    ensure_valid(&input)?;

    let mut book = store.get(id).await?;
    book.apply(input);

    let book = store.update(&book).await?;
    tracing::info!(book_id = book.id, "book replaced");
    Ok(envelope(StatusCode::OK, &json!({ "book": book })))
}

async fn patch_book(
    State(store): State<SharedStore>,
    IdParam(id): IdParam,
    StrictJson(patch): StrictJson<BookPatch>,
) -> Result<Response, AppError> {
    let mut book = store.get(id).await?;

    let mut merged = BookInput::from(&book);
    patch.apply(&mut merged);
    ensure_valid(&merged)?;
    book.apply(merged);

    let book = store.update(&book).await?;
    tracing::info!(book_id = book.id, "book updated");
    Ok(envelope(StatusCode::OK, &json!({ "book": book })))
}

async fn delete_book(
    State(store): State<SharedStore>,
    IdParam(id): IdParam,
) -> Result<Response, AppError> {
    store.delete(id).await?;
    tracing::info!(book_id = id, "book deleted");
    Ok(envelope(
        StatusCode::OK,
        &json!({ "message": "book successfully deleted" }),
    ))
}
