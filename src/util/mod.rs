//! Small helpers for URL encoding, JSON field extraction and version ordering.
//!
//! The functions here are dependency-light and shared by the registry
//! client, the snapshot model and the CLI.

use std::cmp::Ordering;
use std::fmt::Write;

use serde_json::Value;

/// What: Percent-encode a string for use in URL path segments (RFC 3986).
///
/// Inputs:
/// - `input`: String to encode.
///
/// Output:
/// - Percent-encoded string.
///
/// Details:
/// - Unreserved characters (`A-Z`, `a-z`, `0-9`, `-`, `.`, `_`, `~`) are left as-is.
/// - Every other byte becomes `%XX` with uppercase hex digits.
#[must_use]
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                let _ = write!(out, "{b:02X}");
            }
        }
    }
    out
}

/// What: Extract a string value from a JSON object by key, defaulting to empty string.
///
/// Inputs:
/// - `v`: JSON value to extract from.
/// - `key`: Key to look up.
///
/// Output:
/// - The string value, or `""` when missing or not a string.
#[must_use]
pub fn s(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// One piece of a version string: a number or a lowercase tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VersionToken<'a> {
    /// Run of digits.
    Num(u64),
    /// Run of letters.
    Tag(&'a str),
}

/// Split a version into digit and letter runs; `.`, `-`, `_`, `+` and `!` only separate.
fn version_tokens(v: &str) -> Vec<VersionToken<'_>> {
    let v = v.trim();
    let v = v.strip_prefix(['v', 'V']).unwrap_or(v);
    let mut tokens = Vec::new();
    let mut rest = v;
    while let Some(c) = rest.chars().next() {
        let len = if c.is_ascii_digit() {
            rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len())
        } else if c.is_ascii_alphabetic() {
            rest.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(rest.len())
        } else {
            c.len_utf8()
        };
        let (head, tail) = rest.split_at(len);
        if c.is_ascii_digit() {
            tokens.push(VersionToken::Num(head.parse().unwrap_or(u64::MAX)));
        } else if c.is_ascii_alphabetic() {
            tokens.push(VersionToken::Tag(head));
        }
        rest = tail;
    }
    tokens
}

/// Rank of a tag; below 4 marks a pre-release.
fn tag_rank(tag: &str) -> u8 {
    match tag.to_ascii_lowercase().as_str() {
        "dev" => 0,
        "a" | "alpha" => 1,
        "b" | "beta" => 2,
        "rc" | "c" | "pre" | "preview" => 3,
        _ => 4,
    }
}

/// What: Compare version strings the way package indexes order releases.
///
/// Inputs:
/// - `a`: Left-hand version.
/// - `b`: Right-hand version.
///
/// Output:
/// - `Ordering` indicating which version is greater.
///
/// Details:
/// - Digit runs compare numerically, so `1.10` is above `1.9a`.
/// - `dev`, `a`, `b` and `rc` tags mark pre-releases: `2.0.0rc1` is below
///   `2.0.0`. Other tags (`post`, `r`) sort above the bare release but
///   below the next release number.
/// - Missing trailing numbers count as `0`, so `1.9` equals `1.9.0`.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    use VersionToken::{Num, Tag};

    let a_tokens = version_tokens(a);
    let b_tokens = version_tokens(b);
    for idx in 0..a_tokens.len().max(b_tokens.len()) {
        let ord = match (a_tokens.get(idx), b_tokens.get(idx)) {
            (Some(Num(x)), Some(Num(y))) => x.cmp(y),
            (Some(Num(x)), None) => x.cmp(&0),
            (None, Some(Num(y))) => 0.cmp(y),
            (Some(Tag(_)), Some(Num(_))) => Ordering::Less,
            (Some(Num(_)), Some(Tag(_))) => Ordering::Greater,
            (Some(Tag(t)), None) => tag_rank(t).cmp(&4).then(Ordering::Greater),
            (None, Some(Tag(t))) => 4.cmp(&tag_rank(t)).then(Ordering::Less),
            (Some(Tag(x)), Some(Tag(y))) => tag_rank(x)
                .cmp(&tag_rank(y))
                .then_with(|| x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase())),
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// What: Remove a leading `http://` or `https://` from an image reference.
///
/// Inputs:
/// - `image`: Image reference as published by the registry.
///
/// Output:
/// - Reference usable by the container engine.
#[must_use]
pub fn strip_url_scheme(image: &str) -> &str {
    image
        .strip_prefix("https://")
        .or_else(|| image.strip_prefix("http://"))
        .unwrap_or(image)
}
