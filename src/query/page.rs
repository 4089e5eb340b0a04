//! Paging, sorting and result types.

use std::fmt;

use serde::Serialize;
use tracing::warn;

/// Field a result page is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SortField {
    /// Relevance.
    #[default]
    #[serde(rename = "score")]
    Score,
    /// Scientific name, case-insensitive.
    #[serde(rename = "scientificNameRaw")]
    ScientificName,
    /// Joined common names.
    #[serde(rename = "commonNameSort")]
    CommonName,
    /// Numeric rank.
    #[serde(rename = "rankId")]
    Rank,
    /// Concept GUID.
    #[serde(rename = "guid")]
    Guid,
}

impl SortField {
    /// Parses a sort field name. Blank means relevance; unknown names fall
    /// back to relevance with a warning.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::Score;
        };
        match raw {
            "score" => Self::Score,
            "scientificName" | "scientificNameRaw" | "nameString" => Self::ScientificName,
            "commonName" | "commonNameSort" => Self::CommonName,
            "rank" | "rankId" => Self::Rank,
            "guid" => Self::Guid,
            other => {
                warn!(sort_field = other, "unsupported sort field, using relevance");
                Self::Score
            }
        }
    }

    /// Canonical name, echoed in result pages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::ScientificName => "scientificNameRaw",
            Self::CommonName => "commonNameSort",
            Self::Rank => "rankId",
            Self::Guid => "guid",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// `"desc"` in any case is descending; anything else ascending.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.trim().eq_ignore_ascii_case("desc") => Self::Desc,
            _ => Self::Asc,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Which slice of the results to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Offset of the first item.
    pub start: usize,
    /// Maximum items returned.
    pub page_size: usize,
    /// Ordering.
    pub sort_field: SortField,
    /// Direction; ignored for relevance ordering.
    pub sort_direction: SortDirection,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 10)
    }
}

impl PageRequest {
    /// Page ordered by relevance.
    #[must_use]
    pub const fn new(start: usize, page_size: usize) -> Self {
        Self {
            start,
            page_size,
            sort_field: SortField::Score,
            sort_direction: SortDirection::Asc,
        }
    }

    /// Sets ordering from caller-supplied strings.
    #[must_use]
    pub fn sorted_by(mut self, field: Option<&str>, direction: Option<&str>) -> Self {
        self.sort_field = SortField::parse(field);
        self.sort_direction = SortDirection::parse(direction);
        self
    }
}

/// Page status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchStatus {
    /// Query ran against a live index.
    #[serde(rename = "OK")]
    Ok,
    /// No index generation has been built yet.
    #[serde(rename = "INDEX_NOT_READY")]
    IndexNotReady,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTaxonConcept {
    /// Concept GUID (the accepted concept for synonym hits).
    pub guid: String,
    /// Parent GUID.
    pub parent_guid: Option<String>,
    /// Matched name.
    pub name_string: Option<String>,
    /// Accepted name, for synonym hits.
    pub accepted_concept_name: Option<String>,
    /// Display common names.
    pub common_name: Option<String>,
    /// Whether the concept has children.
    pub has_children: bool,
    /// Relevance score.
    pub score: f32,
    /// Rank name.
    pub rank: Option<String>,
    /// Numeric rank.
    pub rank_id: Option<u64>,
    /// First matched pest status term.
    pub pest_status: Option<String>,
    /// First matched conservation status term.
    pub conservation_status: Option<String>,
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Hits in this page.
    pub items: Vec<SearchTaxonConcept>,
    /// Total matches across all pages.
    pub total_count: usize,
    /// Offset of the first item.
    pub start_index: usize,
    /// Ordering applied.
    pub sort_field: SortField,
    /// Direction applied.
    pub sort_direction: SortDirection,
    /// Query as supplied by the caller.
    pub query: String,
    /// Page status.
    pub status: SearchStatus,
}

impl SearchResults {
    pub(crate) fn new(
        items: Vec<SearchTaxonConcept>,
        total_count: usize,
        query: &str,
        page: &PageRequest,
    ) -> Self {
        Self {
            items,
            total_count,
            start_index: page.start,
            sort_field: page.sort_field,
            sort_direction: page.sort_direction,
            query: query.to_string(),
            status: SearchStatus::Ok,
        }
    }

    /// Well-formed page with no hits.
    #[must_use]
    pub fn empty(query: &str, page: &PageRequest) -> Self {
        Self::new(Vec::new(), 0, query, page)
    }

    pub(crate) fn not_ready(query: &str, page: &PageRequest) -> Self {
        Self {
            status: SearchStatus::IndexNotReady,
            ..Self::empty(query, page)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parsing() {
        assert_eq!(SortField::parse(None), SortField::Score);
        assert_eq!(SortField::parse(Some("")), SortField::Score);
        assert_eq!(SortField::parse(Some("rank")), SortField::Rank);
        assert_eq!(SortField::parse(Some("bogus")), SortField::Score);
        assert_eq!(SortDirection::parse(Some("DESC")), SortDirection::Desc);
        assert_eq!(SortDirection::parse(Some("descending")), SortDirection::Asc);
        assert_eq!(SortDirection::parse(None), SortDirection::Asc);
    }

    #[test]
    fn test_page_json_shape() {
        let page = PageRequest::new(20, 10).sorted_by(Some("commonName"), Some("desc"));
        let json = serde_json::to_value(SearchResults::not_ready("wolf", &page)).unwrap();
        assert_eq!(json["status"], "INDEX_NOT_READY");
        assert_eq!(json["sortField"], "commonNameSort");
        assert_eq!(json["sortDirection"], "desc");
        assert_eq!(json["startIndex"], 20);
        assert_eq!(json["totalCount"], 0);
    }
}
