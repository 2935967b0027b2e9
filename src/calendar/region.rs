//! Supported regions and their aliases.
//!
//! Each region has its own school calendar. Regions are matched
//! case-insensitively against the canonical English name and the local name.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::Serialize;

use crate::calendar::error::QueryError;

bitflags! {
    /// Per-day school vacation flags, one bit per region.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegionFlags: u8 {
        /// Flemish community (Belgium).
        const FLANDERS = 1 << 0;
        /// French community (Belgium).
        const WALLONIA = 1 << 1;
        /// Netherlands, northern school zone.
        const NORTH_NETHERLANDS = 1 << 2;
        /// Netherlands, middle school zone.
        const MIDDLE_NETHERLANDS = 1 << 3;
        /// Netherlands, southern school zone.
        const SOUTH_NETHERLANDS = 1 << 4;
        /// Grand Duchy of Luxembourg.
        const LUXEMBOURG = 1 << 5;
    }
}

/// A region with an independent school vacation calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    /// Flanders (`vlaanderen`).
    Flanders,
    /// Wallonia (`wallonië`).
    Wallonia,
    /// Northern Netherlands (`noord-nederland`).
    NorthNetherlands,
    /// Middle Netherlands (`midden-nederland`).
    MiddleNetherlands,
    /// Southern Netherlands (`zuid-nederland`).
    SouthNetherlands,
    /// Luxembourg (`luxemburg`).
    Luxembourg,
}

impl Region {
    /// All regions, in their fixed presentation order.
    pub const ALL: [Self; 6] = [
        Self::Flanders,
        Self::Wallonia,
        Self::NorthNetherlands,
        Self::MiddleNetherlands,
        Self::SouthNetherlands,
        Self::Luxembourg,
    ];

    /// Returns the canonical identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flanders => "flanders",
            Self::Wallonia => "wallonia",
            Self::NorthNetherlands => "north-netherlands",
            Self::MiddleNetherlands => "middle-netherlands",
            Self::SouthNetherlands => "south-netherlands",
            Self::Luxembourg => "luxembourg",
        }
    }

    /// Returns every accepted spelling, canonical name first.
    #[must_use]
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Flanders => &["flanders", "vlaanderen"],
            Self::Wallonia => &["wallonia", "wallonië", "wallonie"],
            Self::NorthNetherlands => &["north-netherlands", "noord-nederland"],
            Self::MiddleNetherlands => &["middle-netherlands", "midden-nederland"],
            Self::SouthNetherlands => &["south-netherlands", "zuid-nederland"],
            Self::Luxembourg => &["luxembourg", "luxemburg"],
        }
    }

    /// Returns the vacation flag bit for this region.
    #[must_use]
    pub const fn flag(self) -> RegionFlags {
        match self {
            Self::Flanders => RegionFlags::FLANDERS,
            Self::Wallonia => RegionFlags::WALLONIA,
            Self::NorthNetherlands => RegionFlags::NORTH_NETHERLANDS,
            Self::MiddleNetherlands => RegionFlags::MIDDLE_NETHERLANDS,
            Self::SouthNetherlands => RegionFlags::SOUTH_NETHERLANDS,
            Self::Luxembourg => RegionFlags::LUXEMBOURG,
        }
    }

    /// Resolves a user-supplied region name or alias.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownRegion`] naming the input if nothing matches.
    pub fn resolve(input: &str) -> Result<Self, QueryError> {
        let needle = input.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|region| region.aliases().contains(&needle.as_str()))
            .ok_or_else(|| QueryError::unknown_region(input))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_canonical_names() {
        for region in Region::ALL {
            assert_eq!(Region::resolve(region.as_str()), Ok(region));
        }
    }

    #[test]
    fn resolves_local_aliases_case_insensitively() {
        assert_eq!(Region::resolve("Vlaanderen"), Ok(Region::Flanders));
        assert_eq!(Region::resolve("WALLONIË"), Ok(Region::Wallonia));
        assert_eq!(Region::resolve("noord-nederland"), Ok(Region::NorthNetherlands));
        assert_eq!(Region::resolve("Midden-Nederland"), Ok(Region::MiddleNetherlands));
        assert_eq!(Region::resolve("zuid-NEDERLAND"), Ok(Region::SouthNetherlands));
        assert_eq!(Region::resolve("Luxemburg"), Ok(Region::Luxembourg));
    }

    #[test]
    fn rejects_unknown_region() {
        let err = Region::resolve("Brussels").unwrap_err();
        assert_eq!(err, QueryError::unknown_region("Brussels"));
    }

    #[test]
    fn rejects_partial_and_padded_names() {
        assert!(Region::resolve("flander").is_err());
        assert!(Region::resolve(" flanders").is_err());
        assert!(Region::resolve("").is_err());
    }

    #[test]
    fn flags_are_distinct() {
        let all = Region::ALL
            .iter()
            .fold(RegionFlags::empty(), |acc, r| acc | r.flag());
        assert_eq!(all, RegionFlags::all());
    }

    #[test]
    fn serialises_as_canonical_name() {
        let json = serde_json::to_string(&Region::MiddleNetherlands).unwrap();
        assert_eq!(json, r#""middle-netherlands""#);
    }
}
