//! Request extractors that answer failures with the shelf error envelope.

use std::collections::HashMap;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
};
use http_body_util::LengthLimitError;
use serde::{
    de::{DeserializeOwned, IgnoredAny},
    Deserialize,
};
use serde_json::error::Category;

use shelf_kernel::Validator;

use crate::error::AppError;

/// Largest request body accepted by [`StrictJson`].
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// JSON body extractor that caps the body at [`MAX_BODY_BYTES`], rejects
/// trailing content after the first value and turns serde failures into
/// client-readable 400 messages. Unknown keys are rejected by targets that
/// use `#[serde(deny_unknown_fields)]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictJson<T>(pub T);

impl<T, S> FromRequest<S> for StrictJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|err| {
                if exceeded_length_limit(&err) {
                    AppError::bad_request(format!(
                        "body must not be larger than {MAX_BODY_BYTES} bytes"
                    ))
                } else {
                    AppError::bad_request("unable to read request body")
                }
            })?;

        decode(&bytes).map(StrictJson)
    }
}

fn exceeded_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if current.is::<LengthLimitError>() {
            return true;
        }
        source = current.source();
    }
    false
}

/// Decode exactly one JSON object from `bytes`.
///
/// Any other top-level value is rejected before `T` sees it; derived struct
/// deserializers would otherwise accept an array and bind its elements to
/// fields by position.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AppError> {
    let Some(first) = bytes.iter().find(|byte| !byte.is_ascii_whitespace()) else {
        return Err(AppError::bad_request("body must not be empty"));
    };

    if *first != b'{' {
        // Syntax errors still win over the type complaint.
        let mut deserializer = serde_json::Deserializer::from_slice(bytes);
        IgnoredAny::deserialize(&mut deserializer).map_err(describe)?;
        return Err(AppError::bad_request(
            "body contains incorrect JSON type: expected a JSON object",
        ));
    }

    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let value = T::deserialize(&mut deserializer).map_err(describe)?;

    deserializer
        .end()
        .map_err(|_| AppError::bad_request("body must only contain a single JSON value"))?;

    Ok(value)
}

fn describe(err: serde_json::Error) -> AppError {
    let message = match err.classify() {
        Category::Syntax => format!(
            "body contains badly-formed JSON (at line {} column {})",
            err.line(),
            err.column()
        ),
        Category::Eof => "body contains badly-formed JSON".to_string(),
        Category::Data => {
            let text = err.to_string();
            match unknown_key(&text) {
                Some(key) => format!("body contains unknown key \"{key}\""),
                None => format!("body contains incorrect JSON type: {text}"),
            }
        }
        Category::Io => "unable to read request body".to_string(),
    };

    AppError::BadRequest(message)
}

/// Key name from serde's "unknown field `key`, expected ..." message. The name
/// ends at the backtick serde places before its list of expected fields.
fn unknown_key(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("unknown field `")?;
    ["`, expected", "`, there are no fields"]
        .iter()
        .find_map(|suffix| rest.find(suffix))
        .or_else(|| rest.rfind('`'))
        .map(|end| &rest[..end])
}

/// Positive integer `{id}` path parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParam(pub i64);

impl<S> FromRequestParts<S> for IdParam
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let invalid = || AppError::bad_request("invalid id parameter");

        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| invalid())?;

        match raw.parse::<i64>() {
            Ok(id) if id >= 1 => Ok(IdParam(id)),
            _ => Err(invalid()),
        }
    }
}

/// Query-string value or `default` when absent or empty.
pub fn read_string(qs: &HashMap<String, String>, key: &str, default: &str) -> String {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => default.to_string(),
    }
}

/// Query-string integer or `default` when absent. A value that is not an
/// integer records a validation error and yields `default`.
pub fn read_int(
    qs: &HashMap<String, String>,
    key: &str,
    default: i64,
    v: &mut Validator,
) -> i64 {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Input {
        title: String,
        #[serde(default)]
        year: i32,
    }

    fn message(err: AppError) -> String {
        match err {
            AppError::BadRequest(message) => message,
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn decodes_a_single_value() {
        let input: Input = decode(br#"{"title": "Dune", "year": 1965}"#).unwrap();
        assert_eq!(
            input,
            Input {
                title: "Dune".to_string(),
                year: 1965
            }
        );
    }

    #[test]
    fn rejects_empty_bodies() {
        let err = decode::<Input>(b"  \n").unwrap_err();
        assert_eq!(message(err), "body must not be empty");
    }

    #[test]
    fn rejects_trailing_values() {
        let err = decode::<Input>(br#"{"title": "a"}{"title": "b"}"#).unwrap_err();
        assert_eq!(message(err), "body must only contain a single JSON value");
    }

    #[test]
    fn rejects_unknown_keys_by_name() {
        let err = decode::<Input>(br#"{"title": "a", "rating": 5}"#).unwrap_err();
        assert_eq!(message(err), "body contains unknown key \"rating\"");
    }

    #[test]
    fn reports_syntax_errors_with_position() {
        let err = decode::<Input>(br#"{"title": }"#).unwrap_err();
        assert!(message(err).starts_with("body contains badly-formed JSON (at line 1"));
    }

    #[test]
    fn reports_type_mismatches() {
        let err = decode::<Input>(br#"{"title": "a", "year": "soon"}"#).unwrap_err();
        assert!(message(err).starts_with("body contains incorrect JSON type"));
    }

    #[test]
    fn read_int_flags_non_integers() {
        let mut qs = HashMap::new();
        qs.insert("page".to_string(), "two".to_string());
        qs.insert("page_size".to_string(), "15".to_string());

        let mut v = Validator::new();
        assert_eq!(read_int(&qs, "page", 1, &mut v), 1);
        assert_eq!(read_int(&qs, "page_size", 20, &mut v), 15);
        assert_eq!(read_int(&qs, "missing", 7, &mut v), 7);
        assert_eq!(v.errors()["page"], "must be an integer value");
        assert_eq!(v.errors().len(), 1);
    }

    #[test]
    fn read_string_defaults_when_blank() {
        let mut qs = HashMap::new();
        qs.insert("sort".to_string(), String::new());
        assert_eq!(read_string(&qs, "sort", "book_id"), "book_id");
    }

    #[test]
    fn rejects_top_level_values_that_are_not_objects() {
        let bodies: [&[u8]; 5] = [b"[]", br#"["T", 1965]"#, b"42", br#""Dune""#, b"null"];
        for body in bodies {
            let err = decode::<Input>(body).unwrap_err();
            assert_eq!(
                message(err),
                "body contains incorrect JSON type: expected a JSON object"
            );
        }
    }

    #[test]
    fn malformed_non_objects_are_syntax_errors() {
        let err = decode::<Input>(b"[1,").unwrap_err();
        assert_eq!(message(err), "body contains badly-formed JSON");

        let err = decode::<Input>(b"nope").unwrap_err();
        assert!(message(err).starts_with("body contains badly-formed JSON (at line 1"));
    }

    #[test]
    fn unknown_key_keeps_commas_in_the_name() {
        let err = decode::<Input>(br#"{"title": "a", "a,b": 1}"#).unwrap_err();
        assert_eq!(message(err), "body contains unknown key \"a,b\"");
    }
}
