//! CAPTCHA token extraction.
//!
//! Lookup order: POST form field (urlencoded or multipart), query parameter,
//! JSON body field. Bodies are read up to the limit, sized or streamed, and
//! put back afterwards so the wrapped handler still sees them.

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{FromRequest, Multipart};
use axum::http::{Method, Request, header, request::Parts};
use futures::{StreamExt, stream};

use hoptcha_common::constants::TOKEN_FIELD;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Find the CAPTCHA token carried by a request
pub async fn extract(parts: &Parts, body: &mut Body, body_limit: usize) -> Option<String> {
    let content_type = media_type(parts);

    if parts.method == Method::POST {
        let token = match content_type.as_deref() {
            Some(FORM_CONTENT_TYPE) => buffer(body, body_limit).await.and_then(|b| from_form(&b)),
            Some(MULTIPART_CONTENT_TYPE) => match buffer(body, body_limit).await {
                Some(bytes) => from_multipart(raw_content_type(parts)?, bytes).await,
                None => None,
            },
            _ => None,
        };
        if token.is_some() {
            return token;
        }
    }

    if let Some(token) = parts.uri.query().and_then(from_query) {
        return Some(token);
    }

    if content_type.as_deref() == Some(JSON_CONTENT_TYPE) {
        return buffer(body, body_limit).await.and_then(|b| from_json(&b));
    }

    None
}

/// Token from an urlencoded form body
pub fn from_form(body: &[u8]) -> Option<String> {
    find_pair(body)
}

/// Token from a multipart form body.
///
/// `content_type` is the full header value, boundary included. File parts
/// named like the token field are skipped.
pub async fn from_multipart(content_type: &str, body: Bytes) -> Option<String> {
    let request = Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .ok()?;

    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unreadable multipart body");
            return None;
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed multipart body");
                return None;
            }
        };

        if field.name() != Some(TOKEN_FIELD) || field.file_name().is_some() {
            continue;
        }

        match field.text().await {
            Ok(token) if !token.is_empty() => return Some(token),
            _ => {}
        }
    }
}

/// Token from a raw query string
pub fn from_query(query: &str) -> Option<String> {
    find_pair(query.as_bytes())
}

/// Token from a JSON object body.
///
/// Malformed JSON, non-objects and non-string values all mean "no token".
pub fn from_json(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed JSON body");
            return None;
        }
    };

    value
        .get(TOKEN_FIELD)
        .and_then(serde_json::Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn find_pair(input: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(key, value)| key == TOKEN_FIELD && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

fn raw_content_type(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

// Content type without parameters, lowercased
fn media_type(parts: &Parts) -> Option<String> {
    raw_content_type(parts)
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
}

/// Read the whole body if it fits in `limit` bytes.
///
/// Whatever was read goes back in front of the rest of the stream, so the
/// handler sees the original body when this gives up. A stream error is
/// handed on to the handler too.
async fn buffer(body: &mut Body, limit: usize) -> Option<Bytes> {
    if body.size_hint().lower() > limit as u64 {
        tracing::debug!(size = body.size_hint().lower(), limit, "Body too large, skipping token lookup");
        return None;
    }

    let mut rest = std::mem::take(body).into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = rest.next().await {
        match chunk {
            Ok(chunk) => {
                total += chunk.len();
                chunks.push(chunk);
                if total > limit {
                    tracing::debug!(limit, "Streamed body too large, skipping token lookup");
                    *body = Body::from_stream(stream::iter(chunks.into_iter().map(Ok)).chain(rest));
                    return None;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read request body");
                *body = Body::from_stream(
                    stream::iter(chunks.into_iter().map(Ok)).chain(stream::once(async move { Err(e) })),
                );
                return None;
            }
        }
    }

    let bytes = Bytes::from(chunks.concat());
    *body = Body::from(bytes.clone());
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn request(method: &str, uri: &str, content_type: Option<&str>, body: &str) -> (Parts, Body) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        builder.body(Body::from(body.to_string())).unwrap().into_parts()
    }

    async fn body_string(body: Body) -> String {
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_from_query() {
        assert_eq!(from_query("a=1&captcha_token=abc").as_deref(), Some("abc"));
        assert_eq!(from_query("captcha_token=a%20b").as_deref(), Some("a b"));
        assert_eq!(from_query("captcha_token=").as_deref(), None);
        assert_eq!(from_query("token=abc").as_deref(), None);
    }

    #[test]
    fn test_from_json() {
        assert_eq!(from_json(br#"{"captcha_token":"abc"}"#).as_deref(), Some("abc"));
        assert_eq!(from_json(br#"{"captcha_token":42}"#), None);
        assert_eq!(from_json(br#"{"captcha_token":""}"#), None);
        assert_eq!(from_json(br#"["captcha_token"]"#), None);
        assert_eq!(from_json(b"{not json"), None);
        assert_eq!(from_json(b""), None);
    }

    #[tokio::test]
    async fn test_form_field_wins_over_query() {
        let (parts, mut body) = request(
            "POST",
            "/submit/?captcha_token=from-query",
            Some("application/x-www-form-urlencoded"),
            "name=x&captcha_token=from-form",
        );

        let token = extract(&parts, &mut body, 1024).await;
        assert_eq!(token.as_deref(), Some("from-form"));
        assert_eq!(body_string(body).await, "name=x&captcha_token=from-form");
    }

    const MULTIPART: &str = "multipart/form-data; boundary=XX";

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, file_name, value) in parts {
            body.push_str("--XX\r\n");
            match file_name {
                Some(file) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file}\"\r\n"
                )),
                None => body.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n")),
            }
            body.push_str(&format!("\r\n{value}\r\n"));
        }
        body.push_str("--XX--\r\n");
        body
    }

    fn streamed(chunks: Vec<Result<&'static str, io::Error>>) -> Body {
        Body::from_stream(futures::stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_multipart_field_wins_over_query() {
        let raw = multipart_body(&[("name", None, "Ada"), ("captcha_token", None, "from-form")]);
        let (parts, mut body) = request("POST", "/submit/?captcha_token=from-query", Some(MULTIPART), &raw);

        let token = extract(&parts, &mut body, 1024).await;
        assert_eq!(token.as_deref(), Some("from-form"));
        assert_eq!(body_string(body).await, raw);
    }

    #[tokio::test]
    async fn test_multipart_skips_files_and_empty_values() {
        let raw = multipart_body(&[
            ("captcha_token", Some("token.txt"), "from-file"),
            ("captcha_token", None, ""),
            ("captcha_token", None, "tok"),
        ]);
        let (parts, mut body) = request("POST", "/submit/", Some(MULTIPART), &raw);
        assert_eq!(extract(&parts, &mut body, 1024).await.as_deref(), Some("tok"));

        let raw = multipart_body(&[("name", None, "Ada")]);
        let (parts, mut body) = request("POST", "/submit/?captcha_token=q", Some(MULTIPART), &raw);
        assert_eq!(extract(&parts, &mut body, 1024).await.as_deref(), Some("q"));
    }

    #[tokio::test]
    async fn test_malformed_multipart_is_no_token() {
        let (parts, mut body) = request("POST", "/submit/", Some(MULTIPART), "not multipart at all");
        assert_eq!(extract(&parts, &mut body, 1024).await, None);
        assert_eq!(body_string(body).await, "not multipart at all");
    }

    #[tokio::test]
    async fn test_streamed_json_body() {
        let (parts, _) = request("POST", "/submit/", Some("application/json"), "");
        let mut body = streamed(vec![Ok(r#"{"captcha_token""#), Ok(r#":"tok"}"#)]);

        assert_eq!(extract(&parts, &mut body, 1024).await.as_deref(), Some("tok"));
        assert_eq!(body_string(body).await, r#"{"captcha_token":"tok"}"#);
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_is_put_back() {
        let (parts, _) = request("POST", "/submit/", Some("application/json"), "");
        let mut body = streamed(vec![
            Ok(r#"{"captcha_token":"tok","#),
            Ok(r#""pad":"xxxxxxxxxxxxxxxx","#),
            Ok(r#""more":1}"#),
        ]);

        assert_eq!(extract(&parts, &mut body, 30).await, None);
        assert_eq!(
            body_string(body).await,
            r#"{"captcha_token":"tok","pad":"xxxxxxxxxxxxxxxx","more":1}"#
        );
    }

    #[tokio::test]
    async fn test_body_read_error_reaches_handler() {
        let (parts, _) = request("POST", "/submit/", Some("application/json"), "");
        let mut body = streamed(vec![
            Ok(r#"{"captcha_token":"#),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);

        assert_eq!(extract(&parts, &mut body, 1024).await, None);
        assert!(axum::body::to_bytes(body, usize::MAX).await.is_err());
    }

    #[tokio::test]
    async fn test_query_wins_over_json() {
        let (parts, mut body) = request(
            "POST",
            "/submit/?captcha_token=from-query",
            Some("application/json"),
            r#"{"captcha_token":"from-json"}"#,
        );

        let token = extract(&parts, &mut body, 1024).await;
        assert_eq!(token.as_deref(), Some("from-query"));
    }

    #[tokio::test]
    async fn test_json_body_restored() {
        let raw = r#"{"name":"Ada","captcha_token":"tok"}"#;
        let (parts, mut body) = request(
            "POST",
            "/submit/",
            Some("application/json; charset=utf-8"),
            raw,
        );

        let token = extract(&parts, &mut body, 1024).await;
        assert_eq!(token.as_deref(), Some("tok"));
        assert_eq!(body_string(body).await, raw);
    }

    #[tokio::test]
    async fn test_malformed_json_is_no_token() {
        let (parts, mut body) = request("POST", "/submit/", Some("application/json"), "{oops");
        assert_eq!(extract(&parts, &mut body, 1024).await, None);
        assert_eq!(body_string(body).await, "{oops");
    }

    #[tokio::test]
    async fn test_json_ignored_without_content_type() {
        let (parts, mut body) = request("POST", "/submit/", None, r#"{"captcha_token":"tok"}"#);
        assert_eq!(extract(&parts, &mut body, 1024).await, None);
    }

    #[tokio::test]
    async fn test_form_only_read_on_post() {
        let (parts, mut body) = request(
            "PUT",
            "/submit/",
            Some("application/x-www-form-urlencoded"),
            "captcha_token=tok",
        );
        assert_eq!(extract(&parts, &mut body, 1024).await, None);
    }

    #[tokio::test]
    async fn test_oversized_body_left_alone() {
        let raw = format!(r#"{{"captcha_token":"tok","pad":"{}"}}"#, "x".repeat(64));
        let (parts, mut body) = request("POST", "/submit/", Some("application/json"), &raw);

        assert_eq!(extract(&parts, &mut body, 16).await, None);
        assert_eq!(body_string(body).await, raw);
    }
}
