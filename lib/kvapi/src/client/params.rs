//! Request parameters and body encoding.

use mime::Mime;
use serde_json::Value;
use url::Url;

use super::error::Error;

/// Parameters for an API call.
///
/// One value serves both roles the HTTP method dictates: for `GET`/`HEAD` a
/// [`Params::Json`] mapping is encoded into the URL query string; for other
/// methods it becomes a JSON body, and [`Params::Multipart`] is sent as
/// `multipart/form-data` without any re-encoding.
#[derive(Debug, Clone)]
pub enum Params {
    /// No parameters.
    Empty,
    /// A JSON mapping (query string or JSON body, depending on the method).
    Json(Value),
    /// Multipart form parts, sent unmodified.
    Multipart(Vec<Part>),
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<Vec<Part>> for Params {
    fn from(parts: Vec<Part>) -> Self {
        Self::Multipart(parts)
    }
}

/// One part of a multipart payload.
///
/// Parts are owned data (not a built form) so the dispatcher can rebuild the
/// body when a request is retried after a token refresh.
#[derive(Debug, Clone)]
pub struct Part {
    pub(crate) name: String,
    pub(crate) value: PartValue,
}

#[derive(Debug, Clone)]
pub(crate) enum PartValue {
    Text(String),
    File {
        filename: String,
        content_type: Option<Mime>,
        bytes: Vec<u8>,
    },
}

impl Part {
    /// A plain text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: PartValue::Text(value.into()),
        }
    }

    /// A file field with raw bytes.
    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            value: PartValue::File {
                filename: filename.into(),
                content_type: None,
                bytes: bytes.into(),
            },
        }
    }

    /// Sets the content type of a file part; ignored for text parts.
    #[must_use]
    pub fn with_content_type(mut self, mime: Mime) -> Self {
        if let PartValue::File { content_type, .. } = &mut self.value {
            *content_type = Some(mime);
        }
        self
    }
}

/// Rebuilds a `reqwest` multipart form from owned parts.
pub(crate) fn multipart_form(parts: &[Part]) -> Result<reqwest::multipart::Form, Error> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        form = match &part.value {
            PartValue::Text(text) => form.text(part.name.clone(), text.clone()),
            PartValue::File {
                filename,
                content_type,
                bytes,
            } => {
                let mut file = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(filename.clone());
                if let Some(mime) = content_type {
                    file = file.mime_str(mime.as_ref())?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}

/// Encodes a JSON mapping into the URL query string.
///
/// Booleans become `1`/`0`, arrays repeat the key as `key[]`, and nested
/// objects are carried as JSON text.
pub(crate) fn append_query(url: &mut Url, params: &Value) {
    let Value::Object(entries) = params else {
        return;
    };
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (key, value) in entries {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((format!("{key}[]"), query_value(item)));
                }
            }
            other => pairs.push((key.clone(), query_value(other))),
        }
    }
    if pairs.is_empty() {
        return;
    }
    let mut serializer = url.query_pairs_mut();
    for (key, value) in &pairs {
        serializer.append_pair(key, value);
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_owned(),
        Value::Bool(false) => "0".to_owned(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn base_url() -> Url {
        Url::parse("http://localhost/api/v2/contacts").unwrap()
    }

    #[test]
    fn should_encode_scalars() {
        let mut url = base_url();
        append_query(&mut url, &json!({ "page": 2, "q": "smith & co" }));
        assert_eq!(url.query(), Some("page=2&q=smith+%26+co"));
    }

    #[test]
    fn should_encode_booleans_as_numbers() {
        let mut url = base_url();
        append_query(&mut url, &json!({ "active": true, "archived": false }));
        assert_eq!(url.query(), Some("active=1&archived=0"));
    }

    #[test]
    fn should_repeat_array_keys() {
        let mut url = base_url();
        append_query(&mut url, &json!({ "tags": ["a", "b"] }));
        assert_eq!(url.query(), Some("tags%5B%5D=a&tags%5B%5D=b"));
    }

    #[test]
    fn should_carry_nested_objects_as_json() {
        let mut url = base_url();
        append_query(&mut url, &json!({ "filter": { "name": "x" } }));
        assert_eq!(url.query(), Some("filter=%7B%22name%22%3A%22x%22%7D"));
    }

    #[test]
    fn should_skip_null_values_and_empty_maps() {
        let mut url = base_url();
        append_query(&mut url, &json!({ "gone": null }));
        append_query(&mut url, &json!({}));
        append_query(&mut url, &json!([1, 2]));
        assert_eq!(url.query(), None);
    }

    #[test]
    fn should_build_multipart_form_from_owned_parts() {
        let parts = vec![
            Part::text("note", "hello"),
            Part::file("attachment", "report.pdf", vec![1, 2, 3])
                .with_content_type(mime::APPLICATION_PDF),
        ];
        // parts stay reusable after a form is built
        assert!(multipart_form(&parts).is_ok());
        assert!(multipart_form(&parts).is_ok());
    }
}
