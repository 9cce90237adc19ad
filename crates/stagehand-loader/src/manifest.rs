//! Package manifest types.
//!
//! A manifest (`manifest.json` at the package root) declares the package's
//! identity, the host and dependency versions it needs, and the assets each
//! stage hands to which loader. Manifests are immutable once parsed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::stage::Stage;
use crate::{LoaderError, LoaderResult};

/// Manifest file name at a package root.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

static GUID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._]+$").expect("invalid regex"));
static LOADER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._-]+$").expect("invalid regex"));

/// Whether `guid` is a valid package guid.
#[must_use]
pub fn is_valid_guid(guid: &str) -> bool {
    GUID.is_match(guid)
}

/// Whether `name` is a valid loader name.
#[must_use]
pub fn is_valid_loader_name(name: &str) -> bool {
    LOADER_NAME.is_match(name)
}

/// A loader identifier, written `guid:name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoaderId {
    owner: String,
    name: String,
}

impl LoaderId {
    /// Build an id from its parts.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::InvalidLoaderId` if either part is invalid.
    pub fn new(owner: &str, name: &str) -> LoaderResult<Self> {
        if is_valid_guid(owner) && is_valid_loader_name(name) {
            Ok(Self {
                owner: owner.to_owned(),
                name: name.to_owned(),
            })
        } else {
            Err(LoaderError::InvalidLoaderId(format!("{owner}:{name}")))
        }
    }

    /// Guid of the package that owns the loader.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Loader name within its package.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for LoaderId {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, name) = s
            .split_once(':')
            .ok_or_else(|| LoaderError::InvalidLoaderId(s.to_owned()))?;
        Self::new(owner, name)
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.name)
    }
}

impl Serialize for LoaderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LoaderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// One asset declaration: a glob relative to the package root and the loader
/// that receives each match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Glob selecting handles below the package root.
    pub path: String,
    /// Loader invoked once per matched handle.
    pub loader: LoaderId,
}

/// Asset declarations per stage, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    /// Assets loaded in the Patch stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch: Vec<AssetEntry>,
    /// Assets loaded in the Setup stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<AssetEntry>,
    /// Assets loaded in the Runtime stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtime: Vec<AssetEntry>,
}

impl Assets {
    /// Entries for `stage`.
    #[must_use]
    pub fn for_stage(&self, stage: Stage) -> &[AssetEntry] {
        match stage {
            Stage::Patch => &self.patch,
            Stage::Setup => &self.setup,
            Stage::Runtime => &self.runtime,
        }
    }

    /// Every entry across all stages.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &AssetEntry)> {
        Stage::ALL
            .into_iter()
            .flat_map(move |stage| self.for_stage(stage).iter().map(move |e| (stage, e)))
    }
}

/// A parsed `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Unique package identifier.
    pub guid: String,
    /// Package version.
    #[serde(with = "lenient_version")]
    pub version: Version,
    /// Host version the package was built against.
    #[serde(with = "lenient_version")]
    pub require: Version,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Package authors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Where the package is published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Dependency guid to the version it was built against.
    #[serde(default, with = "lenient_version_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Version>,
    /// Assets per stage.
    #[serde(default)]
    pub assets: Assets,
}

impl Manifest {
    /// Parse and validate a manifest. `origin` names the source in errors.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::Manifest` for malformed JSON, bad versions or
    /// bad loader ids, and `LoaderError::InvalidGuid` for an invalid package
    /// or dependency guid.
    pub fn from_json(bytes: &[u8], origin: &str) -> LoaderResult<Self> {
        let manifest: Self =
            serde_json::from_slice(bytes).map_err(|e| LoaderError::manifest(origin, e))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Encode as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::Manifest` if encoding fails.
    pub fn to_json(&self) -> LoaderResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| LoaderError::manifest(&self.guid, e))
    }

    /// Check the identifier rules serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::InvalidGuid` for the first invalid guid.
    pub fn validate(&self) -> LoaderResult<()> {
        if !is_valid_guid(&self.guid) {
            return Err(LoaderError::InvalidGuid(self.guid.clone()));
        }
        if let Some(dep) = self.dependencies.keys().find(|g| !is_valid_guid(g)) {
            return Err(LoaderError::InvalidGuid(dep.clone()));
        }
        Ok(())
    }

    /// Display name, falling back to the guid.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.guid)
    }
}

/// Parse a manifest version, accepting `major.minor`.
///
/// # Errors
///
/// Returns `LoaderError::InvalidVersion` if `text` is not a version.
pub fn parse_version(text: &str) -> LoaderResult<Version> {
    let text = text.trim();
    Version::parse(text)
        .or_else(|first| {
            if text.matches('.').count() == 1 {
                Version::parse(&format!("{text}.0")).map_err(|_| first)
            } else {
                Err(first)
            }
        })
        .map_err(|e| LoaderError::InvalidVersion {
            value: text.to_owned(),
            message: e.to_string(),
        })
}

mod lenient_version {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(v: &Version, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Version, D::Error> {
        let text = String::deserialize(d)?;
        super::parse_version(&text).map_err(serde::de::Error::custom)
    }
}

mod lenient_version_map {
    use std::collections::BTreeMap;

    use semver::Version;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        map: &BTreeMap<String, Version>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = s.serialize_map(Some(map.len()))?;
        for (guid, version) in map {
            out.serialize_entry(guid, &version.to_string())?;
        }
        out.end()
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, Version>, D::Error> {
        BTreeMap::<String, String>::deserialize(d)?
            .into_iter()
            .map(|(guid, text)| {
                super::parse_version(&text)
                    .map(|v| (guid, v))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "guid": "example.core",
        "version": "1.2.3",
        "require": "0.4",
        "name": "Example Core",
        "description": "Shared pieces",
        "authors": ["someone"],
        "source_url": "https://github.com/example/core",
        "dependencies": { "example.base": "1.0" },
        "assets": {
            "patch": [{ "path": "bin/*.wasm", "loader": "stagehand:binary" }],
            "runtime": [{ "path": "version.json", "loader": "stagehand:version" }]
        }
    }"#;

    #[test]
    fn parses_full_manifest() {
        let m = Manifest::from_json(FULL.as_bytes(), "test").unwrap();
        assert_eq!(m.guid, "example.core");
        assert_eq!(m.require, Version::new(0, 4, 0));
        assert_eq!(m.dependencies["example.base"], Version::new(1, 0, 0));
        assert_eq!(m.assets.patch[0].loader.owner(), "stagehand");
        assert_eq!(m.assets.patch[0].loader.name(), "binary");
        assert!(m.assets.setup.is_empty());
        assert_eq!(m.assets.iter().count(), 2);
        assert_eq!(m.display_name(), "Example Core");
    }

    #[test]
    fn round_trip_is_field_for_field_equal() {
        let m = Manifest::from_json(FULL.as_bytes(), "test").unwrap();
        let json = m.to_json().unwrap();
        let back = Manifest::from_json(json.as_bytes(), "round-trip").unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn guids_are_restricted() {
        let bad = FULL.replace("example.core", "Example-Core");
        assert!(matches!(
            Manifest::from_json(bad.as_bytes(), "test"),
            Err(LoaderError::InvalidGuid(g)) if g == "Example-Core"
        ));

        let bad_dep = FULL.replace("example.base", "../base");
        assert!(matches!(
            Manifest::from_json(bad_dep.as_bytes(), "test"),
            Err(LoaderError::InvalidGuid(_))
        ));
    }

    #[test]
    fn loader_ids_are_validated() {
        assert!("stagehand:binary".parse::<LoaderId>().is_ok());
        assert!("pkg.one:load-things_2".parse::<LoaderId>().is_ok());
        assert!("nocolon".parse::<LoaderId>().is_err());
        assert!("pkg:Bad Name".parse::<LoaderId>().is_err());
        assert!("PKG:name".parse::<LoaderId>().is_err());

        let bad = FULL.replace("stagehand:binary", "stagehand:Binary");
        assert!(matches!(
            Manifest::from_json(bad.as_bytes(), "test"),
            Err(LoaderError::Manifest { .. })
        ));
    }

    #[test]
    fn versions_are_lenient_but_checked() {
        assert_eq!(parse_version("2.1").unwrap(), Version::new(2, 1, 0));
        assert!(parse_version("2").is_err());
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn minimal_manifest() {
        let m = Manifest::from_json(
            br#"{"guid":"a","version":"1.0.0","require":"1.0.0"}"#,
            "test",
        )
        .unwrap();
        assert!(m.dependencies.is_empty());
        assert_eq!(m.assets, Assets::default());
        assert_eq!(m.display_name(), "a");
    }
}
