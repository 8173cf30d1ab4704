//! Placement entries: the canonical shape of one placeable asset.
//!
//! Entries arrive from several places (a browser card's data attributes, a raw
//! JSON record, an entry saved by a previous session). `normalize` turns any of
//! them into a `PlacementEntry` and derives the identity key used to dedupe the
//! pool and to match prefetch completions. Normalization is pure and
//! idempotent; nothing here touches UI state.

#[cfg(test)]
#[path = "entry_test.rs"]
mod entry_test;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Where an asset lives before it is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetSource {
    /// Already on the local file server.
    #[default]
    Local,
    /// Hosted remotely; must be downloaded before use.
    Cloud,
}

/// Licensing tier of a cloud asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetTier {
    #[default]
    Free,
    /// Requires an authenticated account to download.
    Premium,
}

/// One placeable asset candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementEntry {
    pub source: AssetSource,
    pub tier: AssetTier,
    pub filename: String,
    pub folder_path: String,
    pub full_path: String,
    /// Local path once the asset is available; empty until resolved.
    pub cached_local_path: String,
    pub display_name: String,
    pub grid_width: f64,
    pub grid_height: f64,
    pub scale: f64,
    pub color_variant: Option<String>,
    pub variant_group_key: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Lowercase dedupe key derived from the most specific path available.
    pub identity_key: String,
}

impl PlacementEntry {
    /// Whether the asset can be placed without downloading first.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !self.cached_local_path.is_empty()
    }
}

/// Loosely-shaped entry input. Every field is optional and both snake_case
/// and camelCase keys are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEntry {
    pub source: Option<String>,
    pub tier: Option<String>,
    pub filename: Option<String>,
    #[serde(alias = "folderPath", alias = "path")]
    pub folder_path: Option<String>,
    #[serde(alias = "fullPath")]
    pub full_path: Option<String>,
    #[serde(alias = "cachedLocalPath", alias = "localPath")]
    pub cached_local_path: Option<String>,
    #[serde(alias = "displayName", alias = "name")]
    pub display_name: Option<String>,
    #[serde(alias = "gridWidth")]
    pub grid_width: Option<f64>,
    #[serde(alias = "gridHeight")]
    pub grid_height: Option<f64>,
    pub scale: Option<f64>,
    #[serde(alias = "colorVariant")]
    pub color_variant: Option<String>,
    #[serde(alias = "variantGroupKey")]
    pub variant_group_key: Option<String>,
    #[serde(alias = "thumbnailUrl", alias = "thumbnail")]
    pub thumbnail_url: Option<String>,
}

impl RawEntry {
    /// Build from a UI card's data attributes (`data-full-path`, `data-source`, ...).
    ///
    /// The `data-` prefix is optional; keys are matched case-insensitively.
    #[must_use]
    pub fn from_attributes(attrs: &HashMap<String, String>) -> Self {
        let lookup: HashMap<String, &String> = attrs
            .iter()
            .map(|(k, v)| {
                let key = k.trim_start_matches("data-").replace('-', "_").to_lowercase();
                (key, v)
            })
            .collect();
        let get = |key: &str| lookup.get(key).map(|v| (*v).clone());
        let num = |key: &str| lookup.get(key).and_then(|v| parse_f64(v));

        Self {
            source: get("source"),
            tier: get("tier"),
            filename: get("filename"),
            folder_path: get("folder_path").or_else(|| get("path")),
            full_path: get("full_path"),
            cached_local_path: get("cached_local_path").or_else(|| get("local_path")),
            display_name: get("display_name").or_else(|| get("name")),
            grid_width: num("grid_width"),
            grid_height: num("grid_height"),
            scale: num("scale"),
            color_variant: get("color_variant"),
            variant_group_key: get("variant_group_key"),
            thumbnail_url: get("thumbnail_url").or_else(|| get("thumbnail")),
        }
    }
}

impl From<&PlacementEntry> for RawEntry {
    fn from(entry: &PlacementEntry) -> Self {
        let source = match entry.source {
            AssetSource::Local => "local",
            AssetSource::Cloud => "cloud",
        };
        let tier = match entry.tier {
            AssetTier::Free => "free",
            AssetTier::Premium => "premium",
        };
        Self {
            source: Some(source.into()),
            tier: Some(tier.into()),
            filename: Some(entry.filename.clone()),
            folder_path: Some(entry.folder_path.clone()),
            full_path: Some(entry.full_path.clone()),
            cached_local_path: Some(entry.cached_local_path.clone()),
            display_name: Some(entry.display_name.clone()),
            grid_width: Some(entry.grid_width),
            grid_height: Some(entry.grid_height),
            scale: Some(entry.scale),
            color_variant: entry.color_variant.clone(),
            variant_group_key: entry.variant_group_key.clone(),
            thumbnail_url: entry.thumbnail_url.clone(),
        }
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Convert a raw descriptor into the canonical entry shape.
#[must_use]
pub fn normalize(raw: &RawEntry) -> PlacementEntry {
    let source = match clean(raw.source.as_deref()).to_lowercase().as_str() {
        "cloud" | "remote" => AssetSource::Cloud,
        _ => AssetSource::Local,
    };
    let tier = match clean(raw.tier.as_deref()).to_lowercase().as_str() {
        "premium" => AssetTier::Premium,
        _ => AssetTier::Free,
    };

    let explicit_full = clean(raw.full_path.as_deref());
    let mut folder_path = clean(raw.folder_path.as_deref()).trim_end_matches('/').to_string();
    let mut filename = clean(raw.filename.as_deref());

    if !explicit_full.is_empty() {
        let (parent, leaf) = split_path(&explicit_full);
        if filename.is_empty() {
            filename = leaf.to_string();
        }
        if folder_path.is_empty() {
            folder_path = parent.to_string();
        }
    }

    let full_path = if !explicit_full.is_empty() {
        explicit_full
    } else if folder_path.is_empty() {
        filename.clone()
    } else if filename.is_empty() {
        String::new()
    } else {
        format!("{folder_path}/{filename}")
    };

    let mut cached_local_path = clean(raw.cached_local_path.as_deref());
    if cached_local_path.is_empty() && source == AssetSource::Local && !full_path.is_empty() {
        cached_local_path.clone_from(&full_path);
    }

    let display_name = {
        let given = clean(raw.display_name.as_deref());
        if given.is_empty() { display_name_from_filename(&filename) } else { given }
    };

    let identity_key = identity_key(&full_path, &folder_path, &filename, &display_name);

    PlacementEntry {
        source,
        tier,
        filename,
        folder_path,
        full_path,
        cached_local_path,
        display_name,
        grid_width: positive_or_one(raw.grid_width),
        grid_height: positive_or_one(raw.grid_height),
        scale: positive_or_one(raw.scale),
        color_variant: non_empty(raw.color_variant.as_deref()),
        variant_group_key: non_empty(raw.variant_group_key.as_deref()),
        thumbnail_url: non_empty(raw.thumbnail_url.as_deref()),
        identity_key,
    }
}

/// Normalize a JSON record. Non-object values yield an empty descriptor.
#[must_use]
pub fn normalize_value(value: &serde_json::Value) -> PlacementEntry {
    let raw = serde_json::from_value::<RawEntry>(value.clone()).unwrap_or_default();
    normalize(&raw)
}

/// Normalize a pool, dropping entries without identity and collapsing
/// duplicates (first occurrence wins).
#[must_use]
pub fn normalize_pool(raws: &[RawEntry]) -> Vec<PlacementEntry> {
    dedupe(raws.iter().map(normalize))
}

/// Collapse duplicate identities, keeping the first.
pub fn dedupe(entries: impl IntoIterator<Item = PlacementEntry>) -> Vec<PlacementEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| !e.identity_key.is_empty() && seen.insert(e.identity_key.clone()))
        .collect()
}

/// Derive the identity key: first non-empty of full path, folder, filename, name.
#[must_use]
pub fn identity_key(full_path: &str, folder_path: &str, filename: &str, display_name: &str) -> String {
    [full_path, folder_path, filename, display_name]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_lowercase()
}

// =============================================================================
// HELPERS
// =============================================================================

fn clean(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    let v = clean(value);
    if v.is_empty() { None } else { Some(v) }
}

fn parse_f64(value: &str) -> Option<f64> {
    match value.trim().parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => None,
    }
}

fn positive_or_one(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 1.0,
    }
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// `goblin_archer-01.webp` -> `goblin archer 01`.
fn display_name_from_filename(filename: &str) -> String {
    let stem = match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    };
    stem.split(['_', '-', ' '])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
