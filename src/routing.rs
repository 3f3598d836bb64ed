//! Tag-suffix routing: maps the part of a riot id after `#` onto the regional
//! cluster (account/match endpoints) and platform (summoner/league endpoints)
//! that serve it.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Korea,
    Americas,
    Europe,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Korea, Region::Americas, Region::Europe];

    /// Regional routing host used by account and match endpoints.
    pub fn cluster(self) -> &'static str {
        match self {
            Region::Korea => "asia",
            Region::Americas => "americas",
            Region::Europe => "europe",
        }
    }

    /// Platform routing host used by summoner and league endpoints.
    pub fn platform(self) -> &'static str {
        match self {
            Region::Korea => "kr",
            Region::Americas => "na1",
            Region::Europe => "euw1",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Region::Korea => "korea",
            Region::Americas => "americas",
            Region::Europe => "europe",
        };
        f.write_str(label)
    }
}

impl FromStr for Region {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "korea" | "kr" | "asia" => Ok(Region::Korea),
            "americas" | "na" | "na1" => Ok(Region::Americas),
            "europe" | "eu" | "euw" | "euw1" => Ok(Region::Europe),
            other => anyhow::bail!("unknown region {other:?}"),
        }
    }
}

const SUFFIX_CLASSES: &[(&str, Region)] = &[
    ("KR", Region::Korea),
    ("NA", Region::Americas),
    ("EUW", Region::Europe),
    ("EUNE", Region::Europe),
    ("EU", Region::Europe),
];

/// Routes tag suffixes to regions. Without a fallback, unmatched suffixes are
/// rejected with [`ExtractError::RegionUnresolvable`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionRouter {
    fallback: Option<Region>,
}

impl RegionRouter {
    pub fn strict() -> Self {
        Self { fallback: None }
    }

    pub fn with_fallback(fallback: Region) -> Self {
        Self {
            fallback: Some(fallback),
        }
    }

    pub fn fallback(&self) -> Option<Region> {
        self.fallback
    }

    pub fn route(&self, tag: &str) -> Result<Region, ExtractError> {
        match route_tag(tag) {
            Ok(region) => Ok(region),
            Err(err) => self.fallback.ok_or(err),
        }
    }
}

/// Maps a tag suffix (`KR1`, `na1`, `EUW`, ...) to its region.
pub fn route_tag(tag: &str) -> Result<Region, ExtractError> {
    let normalized = tag.trim().to_ascii_uppercase();
    if !normalized.is_empty() {
        for (prefix, region) in SUFFIX_CLASSES {
            if normalized.starts_with(prefix) {
                return Ok(*region);
            }
        }
    }

    Err(ExtractError::RegionUnresolvable {
        tag: tag.to_owned(),
    })
}
