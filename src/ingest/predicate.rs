//! Predicate vocabulary and taxonomic hierarchy classification.

use crate::ingest::triple::Triple;
use crate::rank::Rank;
use crate::repository::predicate_fragment;
use crate::resolver::NameQuery;

/// Recognised predicates. Anything else is [`Predicate::Other`] and is kept
/// as a free-text property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// `hasKingdom`
    Kingdom,
    /// `hasOrder`
    Order,
    /// `hasFamily`
    Family,
    /// `hasGenus`
    Genus,
    /// `hasSpecies`
    Species,
    /// `hasSpecificEpithet`
    SpecificEpithet,
    /// `hasScientificName`
    ScientificName,
    /// `hasCommonName`
    CommonName,
    /// `hasConservationStatus`
    ConservationStatus,
    /// `hasPestStatus`
    PestStatus,
    /// `hasImagePageUrl`; images come from the document MIME type instead.
    ImagePageUrl,
    /// Unrecognised predicate.
    Other,
}

const SUFFIXES: [(&str, Predicate); 11] = [
    ("hasKingdom", Predicate::Kingdom),
    ("hasOrder", Predicate::Order),
    ("hasFamily", Predicate::Family),
    ("hasGenus", Predicate::Genus),
    ("hasSpecies", Predicate::Species),
    ("hasSpecificEpithet", Predicate::SpecificEpithet),
    ("hasScientificName", Predicate::ScientificName),
    ("hasCommonName", Predicate::CommonName),
    ("hasConservationStatus", Predicate::ConservationStatus),
    ("hasPestStatus", Predicate::PestStatus),
    ("hasImagePageUrl", Predicate::ImagePageUrl),
];

impl Predicate {
    /// Classifies a predicate by case-sensitive suffix match on its fragment.
    #[must_use]
    pub fn parse(predicate: &str) -> Self {
        let fragment = predicate_fragment(predicate.trim());
        SUFFIXES
            .iter()
            .find(|(suffix, _)| fragment.ends_with(suffix))
            .map_or(Self::Other, |(_, p)| *p)
    }
}

/// Higher classification found in one triple batch. The last value for a
/// rank wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    /// Kingdom.
    pub kingdom: Option<String>,
    /// Order.
    pub order: Option<String>,
    /// Family.
    pub family: Option<String>,
    /// Genus.
    pub genus: Option<String>,
    /// Full species name.
    pub species: Option<String>,
    /// Specific epithet.
    pub specific_epithet: Option<String>,
    /// Explicit scientific name.
    pub scientific_name: Option<String>,
}

impl Hierarchy {
    /// Collects hierarchy values from `triples`, ignoring blank objects.
    #[must_use]
    pub fn from_triples(triples: &[Triple]) -> Self {
        let mut h = Self::default();
        for triple in triples.iter().filter(|t| !t.is_blank()) {
            let slot = match Predicate::parse(&triple.predicate) {
                Predicate::Kingdom => &mut h.kingdom,
                Predicate::Order => &mut h.order,
                Predicate::Family => &mut h.family,
                Predicate::Genus => &mut h.genus,
                Predicate::Species => &mut h.species,
                Predicate::SpecificEpithet => &mut h.specific_epithet,
                Predicate::ScientificName => &mut h.scientific_name,
                _ => continue,
            };
            *slot = Some(triple.object.trim().to_string());
        }
        h
    }

    /// True when any rank below kingdom (or an explicit name) was found.
    #[must_use]
    pub const fn has_identifying_rank(&self) -> bool {
        self.scientific_name.is_some()
            || self.species.is_some()
            || self.genus.is_some()
            || self.family.is_some()
            || self.order.is_some()
            || self.specific_epithet.is_some()
    }

    fn binomial(&self) -> Option<String> {
        match (&self.genus, &self.specific_epithet) {
            (Some(genus), Some(epithet)) => Some(format!("{genus} {epithet}")),
            _ => None,
        }
    }

    fn primary(&self) -> Option<(String, Option<Rank>)> {
        if let Some(name) = &self.scientific_name {
            return Some((name.clone(), None));
        }
        if let Some(species) = &self.species {
            return Some((species.clone(), Some(Rank::Species)));
        }
        if let Some(binomial) = self.binomial() {
            return Some((binomial, Some(Rank::Species)));
        }
        [
            (&self.genus, Rank::Genus),
            (&self.family, Rank::Family),
            (&self.order, Rank::Order),
            (&self.kingdom, Rank::Kingdom),
        ]
        .into_iter()
        .find_map(|(name, rank)| name.clone().map(|n| (n, Some(rank))))
    }

    /// Resolution attempts in order: the synthesised primary name, then the
    /// bare species name, then genus plus epithet. Repeats are dropped.
    /// Empty when nothing usable was found.
    #[must_use]
    pub fn candidates(&self) -> Vec<NameQuery> {
        let Some(primary) = self.primary() else {
            return Vec::new();
        };
        let retries = [
            self.species.clone().map(|s| (s, Some(Rank::Species))),
            self.binomial().map(|b| (b, Some(Rank::Species))),
        ];

        let mut queries: Vec<NameQuery> = Vec::new();
        for (name, rank) in std::iter::once(primary).chain(retries.into_iter().flatten()) {
            let query = NameQuery {
                scientific_name: name,
                genus: self.genus.clone(),
                kingdom: self.kingdom.clone(),
                rank,
            };
            if !queries.contains(&query) {
                queries.push(query);
            }
        }
        queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triples(pairs: &[(&str, &str)]) -> Vec<Triple> {
        pairs.iter().map(|(p, o)| Triple::new(*p, *o)).collect()
    }

    #[test]
    fn test_predicate_parsing() {
        assert_eq!(
            Predicate::parse("http://rs.tdwg.org/ontology/voc/TaxonConcept#hasGenus"),
            Predicate::Genus
        );
        assert_eq!(Predicate::parse("tc#hasSpecies"), Predicate::Species);
        assert_eq!(Predicate::parse("hasSpecificEpithet"), Predicate::SpecificEpithet);
        assert_eq!(Predicate::parse("ala#hasImagePageUrl"), Predicate::ImagePageUrl);
        assert_eq!(Predicate::parse("ala#hasHabitatText"), Predicate::Other);
        // case-sensitive
        assert_eq!(Predicate::parse("tc#hasgenus"), Predicate::Other);
    }

    #[test]
    fn test_genus_and_epithet_synthesise_species() {
        let h = Hierarchy::from_triples(&triples(&[
            ("tc#hasGenus", "Canis"),
            ("tc#hasSpecificEpithet", "lupus"),
            ("tc#hasCommonName", "Wolf"),
        ]));
        assert!(h.has_identifying_rank());
        let candidates = h.candidates();
        assert_eq!(candidates.len(), 1, "genus+epithet retry duplicates the primary");
        assert_eq!(candidates[0].scientific_name, "Canis lupus");
        assert_eq!(candidates[0].rank, Some(Rank::Species));
        assert_eq!(candidates[0].genus.as_deref(), Some("Canis"));
    }

    #[test]
    fn test_explicit_name_then_retries() {
        let h = Hierarchy::from_triples(&triples(&[
            ("tc#hasScientificName", "Canis lupus dingo"),
            ("tc#hasSpecies", "Canis lupus"),
            ("tc#hasGenus", "Canis"),
            ("tc#hasSpecificEpithet", "familiaris"),
            ("tc#hasKingdom", "Animalia"),
        ]));
        let names: Vec<(String, Option<Rank>)> = h
            .candidates()
            .into_iter()
            .map(|q| (q.scientific_name, q.rank))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Canis lupus dingo".to_string(), None),
                ("Canis lupus".to_string(), Some(Rank::Species)),
                ("Canis familiaris".to_string(), Some(Rank::Species)),
            ]
        );
    }

    #[test]
    fn test_priority_falls_back_through_ranks() {
        let h = Hierarchy::from_triples(&triples(&[("tc#hasFamily", "Canidae"), ("tc#hasOrder", "Carnivora")]));
        let q = &h.candidates()[0];
        assert_eq!(q.scientific_name, "Canidae");
        assert_eq!(q.rank, Some(Rank::Family));

        let h = Hierarchy::from_triples(&triples(&[("tc#hasGenus", "Canis")]));
        assert_eq!(h.candidates()[0].rank, Some(Rank::Genus));
    }

    #[test]
    fn test_kingdom_alone_is_not_identifying() {
        let h = Hierarchy::from_triples(&triples(&[("tc#hasKingdom", "Animalia")]));
        assert!(!h.has_identifying_rank());

        let h = Hierarchy::from_triples(&triples(&[("ala#hasHabitatText", "Forest")]));
        assert!(!h.has_identifying_rank());
        assert!(h.candidates().is_empty());
    }

    #[test]
    fn test_epithet_without_genus_has_no_candidate() {
        let h = Hierarchy::from_triples(&triples(&[("tc#hasSpecificEpithet", "lupus")]));
        assert!(h.has_identifying_rank());
        assert!(h.candidates().is_empty());
    }
}
