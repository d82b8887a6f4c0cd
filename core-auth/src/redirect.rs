//! Classification of authorization redirects.

use url::{form_urlencoded, Url};

const UNKNOWN_ERROR: &str = "unknown";

/// What an authorization redirect carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRedirect {
    Success { code: String, state: String },
    Error { error: String, description: String },
}

impl ParsedRedirect {
    fn unknown() -> Self {
        ParsedRedirect::Error {
            error: UNKNOWN_ERROR.to_string(),
            description: String::new(),
        }
    }
}

/// Classify `uri`.
///
/// A query with both `code` and `state` is a success. Otherwise an error is
/// read from the fragment (`error`, `error_description`). Anything else,
/// including URIs that do not parse, degrades to `Error("unknown", "")`.
pub fn parse(uri: &str) -> ParsedRedirect {
    let url = match Url::parse(uri) {
        Ok(url) => url,
        Err(_) => return ParsedRedirect::unknown(),
    };

    if url.query().is_some() {
        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }
        if let (Some(code), Some(state)) = (code, state) {
            return ParsedRedirect::Success { code, state };
        }
    }

    match url.fragment() {
        Some(fragment) => {
            let mut error = None;
            let mut description = None;
            for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
                match key.as_ref() {
                    "error" => error = Some(value.into_owned()),
                    "error_description" => description = Some(value.into_owned()),
                    _ => {}
                }
            }
            ParsedRedirect::Error {
                error: error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
                description: description.unwrap_or_default(),
            }
        }
        None => ParsedRedirect::unknown(),
    }
}
