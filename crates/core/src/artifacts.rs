//! Artifact naming, lookup, and metadata.
//!
//! Job scripts write their result to `<prefix>_<sanitized key>.json` inside
//! the artifact directory. Both the launcher and the locator derive that
//! name from [`sanitize_key`], so they cannot drift apart.
//!
//! Kinds that always write one file (the trending collector) use a fixed
//! path instead; [`ArtifactTarget`] covers both shapes.
//!
//! Older data may still sit under the raw (unsanitized) key. Lookup falls
//! back to those names while `legacy_lookup` is enabled;
//! [`ArtifactStore::migrate_legacy`] renames them once so the fallback can
//! be switched off.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;

use crate::types::Timestamp;

/// Any character that is not a word character, whitespace, or hyphen.
static DISALLOWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Artifact file extension.
const ARTIFACT_EXT: &str = "json";

/// Strip disallowed characters and collapse whitespace runs to one space.
///
/// This is the form handed to scripts on the command line.
pub fn clean_key(key: &str) -> String {
    let stripped = DISALLOWED_RE.replace_all(key, "");
    WHITESPACE_RE
        .replace_all(stripped.trim(), " ")
        .into_owned()
}

/// Canonical filename fragment for a logical key.
///
/// `"machine learning"` becomes `machine_learning`; shell metacharacters,
/// path separators and dots are removed entirely.
///
/// # Examples
///
/// ```
/// use trending_core::artifacts::sanitize_key;
///
/// assert_eq!(sanitize_key("vue"), "vue");
/// assert_eq!(sanitize_key("machine   learning"), "machine_learning");
/// assert_eq!(sanitize_key("rm; ls | cat `x` $HOME"), "rm_ls_cat_x_HOME");
/// ```
pub fn sanitize_key(key: &str) -> String {
    clean_key(key).replace(' ', "_")
}

/// Filename for an artifact: `<prefix>_<sanitized key>.json`.
pub fn artifact_filename(prefix: &str, key: &str) -> String {
    format!("{prefix}_{}.{ARTIFACT_EXT}", sanitize_key(key))
}

/// A raw key is only probed as a legacy filename if it cannot escape the
/// artifact directory.
fn is_safe_legacy_fragment(fragment: &str) -> bool {
    !fragment.is_empty()
        && !fragment.contains(['/', '\\', '\0'])
        && !fragment.contains("..")
}

/// Existence and metadata for one artifact, as reported by the status route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactStatus {
    pub exists: bool,
    pub artifact_path: Option<String>,
    pub last_modified: Option<Timestamp>,
    pub size_bytes: Option<u64>,
    /// `lastUpdated` field from the artifact body, if present.
    pub last_updated: Option<Value>,
    /// `metadata` field from the artifact body, if present.
    pub metadata: Option<Value>,
}

impl ArtifactStatus {
    fn missing() -> Self {
        Self {
            exists: false,
            artifact_path: None,
            last_modified: None,
            size_bytes: None,
            last_updated: None,
            metadata: None,
        }
    }
}

/// One legacy file renamed to its canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactMigration {
    pub from: String,
    pub to: String,
}

/// Outcome of a legacy-name migration pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub migrated: Vec<ArtifactMigration>,
    /// Legacy files left in place because the canonical name already exists
    /// or the key sanitizes to nothing.
    pub skipped: Vec<String>,
}

/// Where one job's result lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactTarget {
    /// `<prefix>_<sanitized key>.json` in the artifact directory.
    Keyed { prefix: &'static str, key: String },
    /// A single file the script always overwrites.
    Fixed(PathBuf),
}

impl ArtifactTarget {
    /// Identity of the file this target resolves to.
    ///
    /// Two jobs with the same slot write the same file and must not run
    /// at the same time.
    pub fn slot(&self) -> String {
        match self {
            Self::Keyed { prefix, key } => artifact_filename(prefix, key),
            Self::Fixed(path) => path.display().to_string(),
        }
    }
}

/// Read-only view of the artifact directory, plus the one-time migration.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    legacy_lookup: bool,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, legacy_lookup: bool) -> Self {
        Self {
            root: root.into(),
            legacy_lookup,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical path for a key, or `None` if the key sanitizes to nothing.
    pub fn canonical_path(&self, prefix: &str, key: &str) -> Option<PathBuf> {
        if sanitize_key(key).is_empty() {
            return None;
        }
        Some(self.root.join(artifact_filename(prefix, key)))
    }

    /// Paths probed by [`locate`](Self::locate), in order, without duplicates.
    ///
    /// Canonical first; then, with legacy lookup enabled, the raw key and the
    /// raw key with whitespace runs replaced by `_`.
    pub fn candidate_paths(&self, prefix: &str, key: &str) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.canonical_path(prefix, key).into_iter().collect();

        if self.legacy_lookup {
            let underscored = WHITESPACE_RE.replace_all(key, "_").into_owned();
            for fragment in [key.to_string(), underscored] {
                if !is_safe_legacy_fragment(&fragment) {
                    continue;
                }
                let path = self.root.join(format!("{prefix}_{fragment}.{ARTIFACT_EXT}"));
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }

        paths
    }

    /// First existing artifact path for `key`, or `None`.
    pub async fn locate(&self, prefix: &str, key: &str) -> Option<PathBuf> {
        for path in self.candidate_paths(prefix, key) {
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    /// First existing path for `target`, or `None`.
    pub async fn locate_target(&self, target: &ArtifactTarget) -> Option<PathBuf> {
        match target {
            ArtifactTarget::Keyed { prefix, key } => self.locate(prefix, key).await,
            ArtifactTarget::Fixed(path) => fs::try_exists(path)
                .await
                .unwrap_or(false)
                .then(|| path.clone()),
        }
    }

    /// Existence, mtime, size, and parsed metadata of the artifact for `key`.
    ///
    /// An artifact that exists but is not valid JSON still reports
    /// `exists: true`, with the parsed fields left empty.
    pub async fn status(&self, prefix: &str, key: &str) -> std::io::Result<ArtifactStatus> {
        match self.locate(prefix, key).await {
            Some(path) => read_status(&path).await,
            None => Ok(ArtifactStatus::missing()),
        }
    }

    /// [`status`](Self::status) for either target shape.
    pub async fn status_target(&self, target: &ArtifactTarget) -> std::io::Result<ArtifactStatus> {
        match self.locate_target(target).await {
            Some(path) => read_status(&path).await,
            None => Ok(ArtifactStatus::missing()),
        }
    }

    /// Rename every `<prefix>_*.json` whose key is not in canonical form.
    ///
    /// Existing canonical files are never overwritten. Running the pass
    /// twice is a no-op.
    pub async fn migrate_legacy(&self, prefix: &str) -> std::io::Result<MigrationReport> {
        let mut report = MigrationReport::default();

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };

        let head = format!("{prefix}_");
        let tail = format!(".{ARTIFACT_EXT}");

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(raw_key) = name
                .strip_prefix(&head)
                .and_then(|rest| rest.strip_suffix(&tail))
            else {
                continue;
            };

            let canonical = artifact_filename(prefix, raw_key);
            if canonical == name {
                continue;
            }
            if sanitize_key(raw_key).is_empty() {
                report.skipped.push(name);
                continue;
            }

            let from = entry.path();
            let to = self.root.join(&canonical);
            if fs::try_exists(&to).await? {
                tracing::warn!(from = %from.display(), to = %to.display(), "Canonical artifact exists, legacy file left in place");
                report.skipped.push(name);
                continue;
            }

            fs::rename(&from, &to).await?;
            tracing::info!(from = %from.display(), to = %to.display(), "Migrated legacy artifact");
            report.migrated.push(ArtifactMigration {
                from: name,
                to: canonical,
            });
        }

        report.migrated.sort_by(|a, b| a.from.cmp(&b.from));
        report.skipped.sort();
        Ok(report)
    }
}

async fn read_status(path: &Path) -> std::io::Result<ArtifactStatus> {
    let meta = fs::metadata(path).await?;
    let last_modified = meta.modified().ok().map(Timestamp::from);

    let body = fs::read(path).await?;
    let parsed: Option<Value> = serde_json::from_slice(&body).ok();
    if parsed.is_none() {
        tracing::warn!(path = %path.display(), "Artifact is not valid JSON");
    }
    let field = |name: &str| parsed.as_ref().and_then(|v| v.get(name)).cloned();

    Ok(ArtifactStatus {
        exists: true,
        artifact_path: Some(path.display().to_string()),
        last_modified,
        size_bytes: Some(meta.len()),
        last_updated: field("lastUpdated"),
        metadata: field("metadata"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
