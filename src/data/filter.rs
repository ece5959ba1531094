use std::sync::Arc;

use super::catalog::Facet;
use super::model::{parse_year, DatasetKey, DatasetRecord};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Filter predicate: one optional constraint per facet
// ---------------------------------------------------------------------------

/// Sentinel accepted in place of a concrete facet value.
pub const WILDCARD: &str = "ALL";

/// A facet constraint: anything, or exactly one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint<T> {
    All,
    Is(T),
}

impl<T> Default for Constraint<T> {
    fn default() -> Self {
        Constraint::All
    }
}

impl<T: PartialEq> Constraint<T> {
    fn admits(&self, value: &T) -> bool {
        match self {
            Constraint::All => true,
            Constraint::Is(wanted) => wanted == value,
        }
    }
}

fn is_wildcard(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case(WILDCARD)
}

fn text_constraint(value: &str) -> Constraint<String> {
    if is_wildcard(value) {
        Constraint::All
    } else {
        Constraint::Is(value.trim().to_string())
    }
}

/// Constraints over `{year, region, geographyLevel, surveyCode, tableId}`.
///
/// Region comparison ignores case; all other facets compare exactly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterConstraints {
    pub year: Constraint<u16>,
    pub region: Constraint<String>,
    pub geography: Constraint<String>,
    pub survey: Constraint<String>,
    pub table_id: Constraint<String>,
}

impl FilterConstraints {
    /// Constraints that admit every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Set one facet from its textual form; `"ALL"` clears it.
    pub fn set(&mut self, facet: Facet, value: &str) -> Result<()> {
        match facet {
            Facet::Year => {
                self.year = if is_wildcard(value) {
                    Constraint::All
                } else {
                    Constraint::Is(parse_year(value.trim(), value)?)
                }
            }
            Facet::Region => {
                self.region = match text_constraint(value) {
                    Constraint::Is(region) => Constraint::Is(region.to_ascii_lowercase()),
                    Constraint::All => Constraint::All,
                }
            }
            Facet::Geography => self.geography = text_constraint(value),
            Facet::Survey => self.survey = text_constraint(value),
            Facet::TableId => self.table_id = text_constraint(value),
        }
        Ok(())
    }

    /// Builder form of [`FilterConstraints::set`].
    pub fn with(mut self, facet: Facet, value: &str) -> Result<Self> {
        self.set(facet, value)?;
        Ok(self)
    }

    /// Reset every facet to the wildcard.
    pub fn clear(&mut self) {
        *self = Self::all();
    }

    /// True iff every non-wildcard constraint equals the key's field.
    pub fn matches(&self, key: &DatasetKey) -> bool {
        let region_ok = match &self.region {
            Constraint::All => true,
            Constraint::Is(region) => region.eq_ignore_ascii_case(&key.region),
        };
        region_ok
            && self.year.admits(&key.year)
            && self.geography.admits(&key.geography)
            && self.survey.admits(&key.survey)
            && self.table_id.admits(&key.table_id)
    }
}

/// Records passing `constraints`, in input order.
pub fn filter_records<'a, I>(records: I, constraints: &FilterConstraints) -> Vec<Arc<DatasetRecord>>
where
    I: IntoIterator<Item = &'a Arc<DatasetRecord>>,
{
    records
        .into_iter()
        .filter(|record| constraints.matches(&record.key))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(region: &str, year: u16) -> DatasetKey {
        DatasetKey::new(region, year, "tract", "acs5", "B01001")
    }

    #[test]
    fn year_only_constraint() {
        let constraints = FilterConstraints::all()
            .with(Facet::Year, "2015")
            .unwrap()
            .with(Facet::Region, "ALL")
            .unwrap();
        assert!(constraints.matches(&key("us", 2015)));
        assert!(constraints.matches(&DatasetKey::new("sc", 2015, "county", "acs1", "B05002")));
        assert!(!constraints.matches(&key("us", 2014)));
    }

    #[test]
    fn region_is_case_insensitive() {
        let constraints = FilterConstraints::all().with(Facet::Region, "US").unwrap();
        assert!(constraints.matches(&key("us", 2010)));
        assert!(!constraints.matches(&key("sc", 2010)));
    }

    #[test]
    fn every_facet_must_agree() {
        let constraints = FilterConstraints::all()
            .with(Facet::Geography, "tract")
            .unwrap()
            .with(Facet::Survey, "acs1")
            .unwrap();
        assert!(!constraints.matches(&key("us", 2015)));
        assert!(constraints.matches(&DatasetKey::new("us", 2015, "tract", "acs1", "B01001")));
    }

    #[test]
    fn wildcards_and_clear() {
        let mut constraints = FilterConstraints::all().with(Facet::TableId, "B99999").unwrap();
        assert!(!constraints.matches(&key("us", 2015)));
        constraints.set(Facet::TableId, "all").unwrap();
        assert!(constraints.matches(&key("us", 2015)));
        constraints.set(Facet::Year, "2011").unwrap();
        constraints.clear();
        assert_eq!(constraints, FilterConstraints::all());
    }

    #[test]
    fn bad_year_is_rejected() {
        assert!(FilterConstraints::all().with(Facet::Year, "last").is_err());
    }
}
