//! Taxonomic ranks and their numeric sort order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Taxonomic rank with a stable numeric id for sorting.
///
/// Ids increase from kingdom towards infraspecific ranks, with gaps left
/// for intermediate ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Rank {
    Kingdom,
    Subkingdom,
    Phylum,
    Subphylum,
    Class,
    Subclass,
    Order,
    Suborder,
    Infraorder,
    Superfamily,
    Family,
    Subfamily,
    Tribe,
    Subtribe,
    /// Unranked name above genus; also the fallback for unknown rank strings.
    Suprageneric,
    Genus,
    Subgenus,
    Section,
    Series,
    Species,
    Subspecies,
    Variety,
    Form,
    Cultivar,
}

impl Rank {
    /// Rank used when a stored rank string is not recognised.
    pub const DEFAULT: Self = Self::Suprageneric;

    const ALL: [Self; 24] = [
        Self::Kingdom,
        Self::Subkingdom,
        Self::Phylum,
        Self::Subphylum,
        Self::Class,
        Self::Subclass,
        Self::Order,
        Self::Suborder,
        Self::Infraorder,
        Self::Superfamily,
        Self::Family,
        Self::Subfamily,
        Self::Tribe,
        Self::Subtribe,
        Self::Suprageneric,
        Self::Genus,
        Self::Subgenus,
        Self::Section,
        Self::Series,
        Self::Species,
        Self::Subspecies,
        Self::Variety,
        Self::Form,
        Self::Cultivar,
    ];

    /// Numeric sort key.
    #[must_use]
    pub const fn id(self) -> u64 {
        match self {
            Self::Kingdom => 1000,
            Self::Subkingdom => 1200,
            Self::Phylum => 2000,
            Self::Subphylum => 2200,
            Self::Class => 3000,
            Self::Subclass => 3200,
            Self::Order => 4000,
            Self::Suborder => 4200,
            Self::Infraorder => 4350,
            Self::Superfamily => 4500,
            Self::Family => 5000,
            Self::Subfamily => 5500,
            Self::Tribe => 5600,
            Self::Subtribe => 5700,
            Self::Suprageneric => 5999,
            Self::Genus => 6000,
            Self::Subgenus => 6500,
            Self::Section => 6600,
            Self::Series => 6700,
            Self::Species => 7000,
            Self::Subspecies => 8000,
            Self::Variety => 8010,
            Self::Form => 8020,
            Self::Cultivar => 8050,
        }
    }

    /// Canonical lowercase name, as indexed.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Kingdom => "kingdom",
            Self::Subkingdom => "subkingdom",
            Self::Phylum => "phylum",
            Self::Subphylum => "subphylum",
            Self::Class => "class",
            Self::Subclass => "subclass",
            Self::Order => "order",
            Self::Suborder => "suborder",
            Self::Infraorder => "infraorder",
            Self::Superfamily => "superfamily",
            Self::Family => "family",
            Self::Subfamily => "subfamily",
            Self::Tribe => "tribe",
            Self::Subtribe => "subtribe",
            Self::Suprageneric => "suprageneric",
            Self::Genus => "genus",
            Self::Subgenus => "subgenus",
            Self::Section => "section",
            Self::Series => "series",
            Self::Species => "species",
            Self::Subspecies => "subspecies",
            Self::Variety => "variety",
            Self::Form => "form",
            Self::Cultivar => "cultivar",
        }
    }

    /// Looks up a rank by name or common abbreviation, ignoring case.
    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        let key = raw.trim().trim_end_matches('.').to_lowercase();
        let alias = match key.as_str() {
            "regnum" => Some(Self::Kingdom),
            "phyl" | "division" | "divisio" => Some(Self::Phylum),
            "classis" => Some(Self::Class),
            "ordo" | "ord" => Some(Self::Order),
            "fam" | "familia" => Some(Self::Family),
            "subfam" => Some(Self::Subfamily),
            "gen" => Some(Self::Genus),
            "subgen" => Some(Self::Subgenus),
            "sect" => Some(Self::Section),
            "sp" => Some(Self::Species),
            "ssp" | "subsp" => Some(Self::Subspecies),
            "var" => Some(Self::Variety),
            "f" | "forma" => Some(Self::Form),
            "cv" => Some(Self::Cultivar),
            "supragenericname" | "taxsupragen" => Some(Self::Suprageneric),
            _ => None,
        };
        alias.or_else(|| Self::ALL.into_iter().find(|r| r.name() == key))
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown rank string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown rank: {0}")]
pub struct UnknownRank(pub String);

impl FromStr for Rank {
    type Err = UnknownRank;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownRank(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive_and_handles_aliases() {
        assert_eq!(Rank::from_name("Species"), Some(Rank::Species));
        assert_eq!(Rank::from_name(" GENUS "), Some(Rank::Genus));
        assert_eq!(Rank::from_name("subsp."), Some(Rank::Subspecies));
        assert_eq!(Rank::from_name("Regnum"), Some(Rank::Kingdom));
        assert_eq!(Rank::from_name("clade"), None);
        assert!("nonsense".parse::<Rank>().is_err());
    }

    #[test]
    fn test_ids_are_unique_and_follow_hierarchy() {
        let mut ids: Vec<u64> = Rank::ALL.iter().map(|r| r.id()).collect();
        let sorted = {
            let mut s = ids.clone();
            s.sort_unstable();
            s
        };
        assert_eq!(ids, sorted, "declaration order follows id order");
        ids.dedup();
        assert_eq!(ids.len(), Rank::ALL.len());
        assert!(Rank::Kingdom.id() < Rank::Family.id());
        assert!(Rank::DEFAULT.id() < Rank::Genus.id());
    }

    #[test]
    fn test_names_roundtrip() {
        for rank in Rank::ALL {
            assert_eq!(Rank::from_name(rank.name()), Some(rank));
        }
    }
}
