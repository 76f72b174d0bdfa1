use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::AirError;
use crate::store::ItemMeta;

static AIR_URN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^urn:air:(?P<ecosystem>[a-z0-9]+):(?P<type>[a-z0-9]+):(?P<source>[a-z0-9]+):(?P<id>\d+)(?:@(?P<version>\d+))?(?:\.(?P<format>[A-Za-z0-9]+))?$",
    )
    .expect("AIR URN pattern is valid")
});

/// A parsed `urn:air:<ecosystem>:<type>:<source>:<id>[@<version>][.<format>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AirUrn {
    pub ecosystem: String,
    pub asset_type: String,
    pub source: String,
    pub id: String,
    pub version: Option<String>,
    pub format: Option<String>,
}

impl AirUrn {
    pub fn classification(&self) -> Classification {
        Classification {
            asset_type: self.asset_type.to_lowercase(),
            ecosystem: self.ecosystem.to_lowercase(),
        }
    }
}

impl fmt::Display for AirUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "urn:air:{}:{}:{}:{}",
            self.ecosystem, self.asset_type, self.source, self.id
        )?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        if let Some(format) = &self.format {
            write!(f, ".{format}")?;
        }
        Ok(())
    }
}

impl FromStr for AirUrn {
    type Err = AirError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = AIR_URN_RE
            .captures(value.trim())
            .ok_or_else(|| AirError::InvalidAirUrn(value.to_string()))?;
        let group = |name: &str| captures.name(name).map(|m| m.as_str().to_string());
        Ok(Self {
            ecosystem: group("ecosystem").unwrap_or_default(),
            asset_type: group("type").unwrap_or_default(),
            source: group("source").unwrap_or_default(),
            id: group("id").unwrap_or_default(),
            version: group("version"),
            format: group("format"),
        })
    }
}

/// Routing key of an asset: `type` picks the directory, `ecosystem` prefixes the file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Classification {
    pub asset_type: String,
    pub ecosystem: String,
}

impl Classification {
    /// `Ok(None)` when `copiedMessage` is missing, blank or not a string.
    /// A present but malformed identifier is an `InvalidAirUrn` error that
    /// callers are expected to downgrade to "unclassified".
    pub fn from_meta(meta: &ItemMeta) -> Result<Option<Self>, AirError> {
        let Some(raw) = meta.copied_message() else {
            return Ok(None);
        };
        let urn: AirUrn = raw.parse()?;
        Ok(Some(urn.classification()))
    }
}
