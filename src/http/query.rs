//! Query string, form body and cookie decoding
//!
//! All three produce flat `String -> String` maps where a repeated key keeps
//! the last value seen.

use std::collections::HashMap;
use url::form_urlencoded;

/// Decodes `key=value&key=value` pairs.
///
/// Pairs without `=` are dropped, the value is everything after the first
/// `=`. Keys and values are percent-decoded exactly once (`+` decodes to a
/// space, invalid UTF-8 is replaced with `U+FFFD`).
pub(crate) fn parse_form(src: &str) -> HashMap<String, String> {
    src.split('&')
        .filter(|pair| pair.contains('='))
        // A single pair never contains `&`, so the parser yields exactly one item.
        .filter_map(|pair| form_urlencoded::parse(pair.as_bytes()).next())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Builds the cookie map out of every `Cookie` header value.
///
/// Each value is split on `;`, each piece on its first `=`. Names and values
/// are trimmed but not decoded. Pieces without `=` are dropped.
pub(crate) fn parse_cookies<'a, I>(values: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .flat_map(|value| value.split(';'))
        .filter_map(|piece| piece.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}
