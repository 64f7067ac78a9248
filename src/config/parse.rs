//! Parsing for `settings.conf` (`key = value` lines).

use tracing::warn;

use super::Settings;

/// What: Check if a line should be skipped (empty or comment).
///
/// Inputs:
/// - `line`: Line to check
///
/// Output:
/// - `true` if the line should be skipped, `false` otherwise
///
/// Details:
/// - Skips empty lines and lines starting with `#`, `//`, or `;`
#[must_use]
pub fn skip_comment_or_empty(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("//")
        || trimmed.starts_with(';')
}

/// What: Parse a key-value pair from a line.
///
/// Inputs:
/// - `line`: Line containing key=value format
///
/// Output:
/// - `Some((key, value))` if parsing succeeds, `None` otherwise
///
/// Details:
/// - Splits on the first `=` character
/// - Trims whitespace from both key and value
#[must_use]
pub fn parse_key_value(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if !trimmed.contains('=') {
        return None;
    }
    let mut parts = trimmed.splitn(2, '=');
    let key = parts.next()?.trim().to_string();
    let value = parts.next()?.trim().to_string();
    Some((key, value))
}

/// What: Remove a trailing ` # comment` or ` // comment` from a value.
///
/// Details:
/// - Only strips markers preceded by whitespace so URLs (`https://`) survive.
fn strip_inline_comment(s: &str) -> &str {
    let mut end = s.len();
    for marker in [" #", "\t#", " //", "\t//"] {
        if let Some(i) = s.find(marker) {
            end = end.min(i);
        }
    }
    s[..end].trim()
}

/// What: Parse a positive integer, treating `0`, `none` and `auto` as "unset".
fn parse_optional_count(val: &str) -> Result<Option<usize>, ()> {
    let lv = val.to_ascii_lowercase();
    if lv == "none" || lv == "auto" || lv.is_empty() {
        return Ok(None);
    }
    match lv.parse::<usize>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(()),
    }
}

/// What: Split a comma-separated list into trimmed, non-empty entries.
fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// What: Populate `settings` from the content of a `settings.conf` file.
///
/// Inputs:
/// - `content`: File content.
/// - `settings`: Settings to update in place; unset keys keep their defaults.
///
/// Output:
/// - Names of keys that were not recognised or had unusable values.
///
/// Details:
/// - Keys are normalised (lowercase, `.`/`-`/space become `_`).
/// - Bad values are logged and ignored rather than failing the whole file.
pub fn parse_settings(content: &str, settings: &mut Settings) -> Vec<String> {
    let mut rejected = Vec::new();
    for line in content.lines() {
        if skip_comment_or_empty(line) {
            continue;
        }
        let Some((raw_key, raw_val)) = parse_key_value(line) else {
            continue;
        };
        let key = raw_key.to_lowercase().replace(['.', '-', ' '], "_");
        let val = strip_inline_comment(&raw_val);
        let accepted = match key.as_str() {
            "processes" | "workers" => parse_optional_count(val)
                .map(|v| settings.processes = v)
                .is_ok(),
            "max_tasks" | "max_tasks_per_worker" => parse_optional_count(val)
                .map(|v| settings.max_tasks = v)
                .is_ok(),
            "ready_timeout_secs" => val
                .parse::<u64>()
                .map(|v| settings.ready_timeout_secs = v)
                .is_ok(),
            "ready_poll_interval_ms" => val
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .map(|v| settings.ready_poll_interval_ms = v)
                .is_some(),
            "binary_timeout_secs" => val
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .map(|v| settings.binary_timeout_secs = v)
                .is_some(),
            "registry_url" => {
                settings.registry_url = val.trim_end_matches('/').to_string();
                true
            }
            "pypi_url" => {
                settings.pypi_url = val.trim_end_matches('/').to_string();
                true
            }
            "engine_package" => {
                settings.engine_package = val.to_string();
                true
            }
            "parser_command" => {
                let words: Vec<String> = val.split_whitespace().map(ToString::to_string).collect();
                let ok = !words.is_empty();
                if ok {
                    settings.parser_command = words;
                }
                ok
            }
            "converter_command" => {
                settings.converter_command =
                    val.split_whitespace().map(ToString::to_string).collect();
                true
            }
            "wrapper_formats" => {
                settings.wrapper_formats = parse_list(val);
                true
            }
            "docker_binary" | "docker" => {
                let ok = !val.is_empty();
                if ok {
                    settings.docker_binary = val.to_string();
                }
                ok
            }
            "conda_prefix" => {
                settings.conda_prefix = val.trim_end_matches('/').to_string();
                true
            }
            _ => false,
        };
        if !accepted {
            warn!(key = %raw_key, value = %val, "[Config] Ignoring unknown key or bad value");
            rejected.push(raw_key);
        }
    }
    rejected
}
