//! BioContainers TRS and PyPI queries.
//!
//! Network access lives in [`RegistryClient`]; the response handling is in
//! pure functions over `serde_json::Value` so it can be tested offline.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::model::WorkUnit;
use crate::util::{compare_versions, percent_encode, s};

/// Failure talking to the registry or reading its answer.
#[derive(Debug)]
pub enum RegistryError {
    /// Transport failure or non-success HTTP status.
    Http(String),
    /// The body was not the expected JSON shape.
    Format(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(msg) => write!(f, "registry request failed: {msg}"),
            Self::Format(msg) => write!(f, "unexpected registry response: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<reqwest::Error> for RegistryError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

/// What: Source of container image references for a unit.
///
/// Details:
/// - Candidates are returned most recently updated first.
pub trait ImageSource: Send + Sync {
    /// Image references that provide `unit`.
    fn image_candidates<'a>(
        &'a self,
        unit: &'a WorkUnit,
    ) -> BoxFuture<'a, Result<Vec<String>, RegistryError>>;
}

/// HTTP client for the TRS registry and PyPI.
#[derive(Clone, Debug)]
pub struct RegistryClient {
    /// Shared connection pool.
    client: reqwest::Client,
    /// TRS base URL without trailing slash.
    base_url: String,
    /// PyPI JSON API base URL without trailing slash.
    pypi_url: String,
}

impl RegistryClient {
    /// What: Build a client for the given endpoints.
    ///
    /// Details:
    /// - Requests time out after 30 seconds; if the configured client cannot
    ///   be built, reqwest's default client is used.
    pub fn new(base_url: &str, pypi_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("helpsweep/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            pypi_url: pypi_url.trim_end_matches('/').to_string(),
        }
    }

    /// GET `url` and decode the JSON body.
    async fn get_json(&self, url: &str) -> Result<Value, RegistryError> {
        tracing::debug!(url, "registry request");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::Http(format!(
                "{url} returned status {}",
                response.status()
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| RegistryError::Format(e.to_string()))
    }

    /// What: Latest version of every Docker tool in the registry.
    ///
    /// Inputs:
    /// - `filter_r`: Drop `r-*` and `bioconductor-*` tools.
    /// - `filter_types`: Keep only these tool classes; empty keeps all.
    ///
    /// # Errors
    /// - `RegistryError` on transport or format problems.
    pub async fn latest_tools(
        &self,
        filter_r: bool,
        filter_types: &[String],
    ) -> Result<Vec<WorkUnit>, RegistryError> {
        let url = format!("{}/tools?toolClass=Docker&limit=10000", self.base_url);
        let body = self.get_json(&url).await?;
        select_latest_tools(&body, filter_r, filter_types)
    }

    /// What: Current release of `package` on PyPI.
    ///
    /// # Errors
    /// - `RegistryError` on transport problems or when `info.version` is missing.
    pub async fn latest_engine_version(&self, package: &str) -> Result<String, RegistryError> {
        let url = format!("{}/{}/json", self.pypi_url, percent_encode(package));
        let body = self.get_json(&url).await?;
        let version = body.get("info").map(|info| s(info, "version")).unwrap_or_default();
        if version.is_empty() {
            return Err(RegistryError::Format(format!("{url}: no info.version")));
        }
        Ok(version)
    }
}

impl ImageSource for RegistryClient {
    fn image_candidates<'a>(
        &'a self,
        unit: &'a WorkUnit,
    ) -> BoxFuture<'a, Result<Vec<String>, RegistryError>> {
        async move {
            let name = percent_encode(&unit.name);
            let url = format!(
                "{}/tools/{name}/versions/{name}-{}",
                self.base_url,
                percent_encode(&unit.version)
            );
            let body = self.get_json(&url).await?;
            rank_images(&body)
        }
        .boxed()
    }
}

/// What: Reduce a TRS tool listing to one unit per tool.
///
/// Inputs:
/// - `tools`: JSON array of tool records (`name`, `toolclass.name`,
///   `versions[].meta_version`).
/// - `filter_r`, `filter_types`: As in [`RegistryClient::latest_tools`].
///
/// Output:
/// - Sorted units, each with the greatest `meta_version` of its tool.
///
/// # Errors
/// - `RegistryError::Format` when `tools` is not an array.
///
/// Details:
/// - Tools without a name or without any version are skipped.
pub fn select_latest_tools(
    tools: &Value,
    filter_r: bool,
    filter_types: &[String],
) -> Result<Vec<WorkUnit>, RegistryError> {
    let list = tools
        .as_array()
        .ok_or_else(|| RegistryError::Format("tool listing is not an array".to_string()))?;
    let mut units = Vec::new();
    for tool in list {
        let name = s(tool, "name");
        if name.is_empty() {
            continue;
        }
        if filter_r && (name.starts_with("r-") || name.starts_with("bioconductor-")) {
            continue;
        }
        if !filter_types.is_empty() {
            let class = tool.get("toolclass").map(|c| s(c, "name")).unwrap_or_default();
            if !filter_types.iter().any(|t| *t == class) {
                continue;
            }
        }
        let latest = tool
            .get("versions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|v| s(v, "meta_version"))
            .filter(|v| !v.is_empty())
            .max_by(|a, b| compare_versions(a, b));
        if let Some(version) = latest {
            match WorkUnit::try_new(&name, &version) {
                Ok(unit) => units.push(unit),
                Err(e) => tracing::warn!(error = %e, "[Registry] skipping tool"),
            }
        }
    }
    units.sort();
    units.dedup();
    Ok(units)
}

/// What: Docker image references from a TRS version record, newest first.
///
/// Inputs:
/// - `version`: JSON object with an `images` array.
///
/// Output:
/// - `image_name` of every `image_type == "Docker"` entry, sorted by
///   `updated` descending; entries with an unreadable date sort last.
///
/// # Errors
/// - `RegistryError::Format` when `images` is missing.
pub fn rank_images(version: &Value) -> Result<Vec<String>, RegistryError> {
    let images = version
        .get("images")
        .and_then(Value::as_array)
        .ok_or_else(|| RegistryError::Format("version record has no images".to_string()))?;
    let mut ranked: Vec<(Option<NaiveDateTime>, String)> = images
        .iter()
        .filter(|img| s(img, "image_type") == "Docker")
        .map(|img| (parse_updated(&s(img, "updated")), s(img, "image_name")))
        .filter(|(_, name)| !name.is_empty())
        .collect();
    // Stable: equal dates keep registry order.
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(ranked.into_iter().map(|(_, name)| name).collect())
}

/// Parse an ISO 8601 timestamp with or without a zone suffix.
fn parse_updated(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    /// What: Tool selection filters by name prefix and class and keeps the newest version.
    ///
    /// Inputs:
    /// - A command line tool whose versions include pre-releases and
    ///   lettered suffixes, an R package, a service, a versionless entry and
    ///   a path-like name.
    ///
    /// Output:
    /// - With both filters only `samtools=1.10`; without filters the R package
    ///   and the service too. The path-like name is never selected.
    fn registry_selects_latest_versions() {
        let tools = json!([
            {"name": "samtools", "toolclass": {"name": "CommandLineTool"},
             "versions": [{"meta_version": "1.9"}, {"meta_version": "1.10"}, {"meta_version": "1.9a"},
                          {"meta_version": "1.10rc1"}, {"meta_version": "1.2"}]},
            {"name": "r-base", "toolclass": {"name": "CommandLineTool"},
             "versions": [{"meta_version": "4.0.2"}]},
            {"name": "galaxy", "toolclass": {"name": "Service"},
             "versions": [{"meta_version": "1"}]},
            {"name": "empty", "toolclass": {"name": "CommandLineTool"}, "versions": []},
            {"name": "../escape", "toolclass": {"name": "CommandLineTool"},
             "versions": [{"meta_version": "1"}]}
        ]);
        let filtered =
            select_latest_tools(&tools, true, &["CommandLineTool".to_string()]).expect("array");
        assert_eq!(filtered, vec![WorkUnit::new("samtools", "1.10")]);

        let all = select_latest_tools(&tools, false, &[]).expect("array");
        assert_eq!(all.len(), 3);
        assert!(all.contains(&WorkUnit::new("r-base", "4.0.2")));
    }

    #[test]
    /// What: Images are ordered newest first and non-Docker entries dropped.
    ///
    /// Inputs:
    /// - Three Docker images (one with a `Z` suffix) and one Conda entry.
    ///
    /// Output:
    /// - Docker names in descending `updated` order.
    fn registry_ranks_images_by_update_time() {
        let version = json!({"images": [
            {"image_name": "quay.io/biocontainers/bwa:0.7.17--h84994c4_4",
             "image_type": "Docker", "updated": "2019-07-11T15:22:42"},
            {"image_name": "bwa", "image_type": "Conda", "updated": "2021-01-01T00:00:00Z"},
            {"image_name": "https://quay.io/biocontainers/bwa:0.7.17--hed695b0_7",
             "image_type": "Docker", "updated": "2020-03-01T10:00:00.123Z"},
            {"image_name": "quay.io/biocontainers/bwa:0.7.17--h84994c4_5",
             "image_type": "Docker", "updated": "2019-12-01T00:00:00Z"}
        ]});
        assert_eq!(
            rank_images(&version).expect("images"),
            vec![
                "https://quay.io/biocontainers/bwa:0.7.17--hed695b0_7",
                "quay.io/biocontainers/bwa:0.7.17--h84994c4_5",
                "quay.io/biocontainers/bwa:0.7.17--h84994c4_4",
            ]
        );
    }

    #[test]
    /// What: Malformed bodies are format errors.
    fn registry_rejects_malformed_bodies() {
        assert!(matches!(
            select_latest_tools(&json!({"tools": []}), false, &[]),
            Err(RegistryError::Format(_))
        ));
        assert!(matches!(rank_images(&json!({})), Err(RegistryError::Format(_))));
    }
}
