use crate::criterion_key::CriterionKey;
use crate::serde_helpers::{lenient_f64, lenient_optional_string, lenient_string};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A single scoring line of the rubric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_rating: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rating: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_optional_string"
    )]
    pub justification: Option<String>,
}

/// A weighted group of criteria.
///
/// Weights are author supplied and are not required to sum to one; the scoring engine
/// normalizes by the total weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, deserialize_with = "lenient_string")]
    pub section: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub weight: f64,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl Criterion {
    /// The maximum as scored: non-finite or negative maxima count as 0.
    pub fn effective_max(&self) -> f64 {
        if self.max_rating.is_finite() && self.max_rating > 0.0 {
            self.max_rating
        } else {
            0.0
        }
    }

    /// Clamps `rating` into `[0, maxRating]`. Non-finite ratings, and any rating on a
    /// criterion without a maximum, become 0.
    pub fn clamp_rating(&self, rating: f64) -> f64 {
        let max_rating = self.effective_max();
        if !rating.is_finite() || max_rating == 0.0 {
            return 0.0;
        }
        rating.clamp(0.0, max_rating)
    }

    /// True if `rating` lies within `[0, maxRating]`.
    pub fn accepts(&self, rating: f64) -> bool {
        rating.is_finite() && rating >= 0.0 && rating <= self.effective_max()
    }
}

impl Section {
    /// The weight as scored: negative or non-finite weights count as 0.
    pub fn effective_weight(&self) -> f64 {
        if self.weight.is_finite() && self.weight > 0.0 {
            self.weight
        } else {
            0.0
        }
    }
}

/// The project's evaluation table: ordered sections of weighted criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rubric {
    pub sections: Vec<Section>,
}

/// Authoring problem found by `Rubric::validate`.
#[derive(Debug, Clone, PartialEq)]
pub enum RubricIssue {
    /// The section at this index has a blank name.
    UnnamedSection(usize),
    /// Negative or non-finite section weight; scored as 0.
    InvalidWeight { section: usize, weight: f64 },
    /// The section at this index has no criteria.
    EmptySection(usize),
    UndescribedCriterion(CriterionKey),
    /// Negative or non-finite maximum; the criterion is left out of scoring.
    InvalidMaxRating { key: CriterionKey, max_rating: f64 },
    /// A stored rating outside `[0, maxRating]`.
    RatingOutOfRange { key: CriterionKey, rating: f64, max_rating: f64 },
}

impl Rubric {
    /// Creates a rubric from its sections, in order.
    pub fn new(sections: Vec<Section>) -> Self {
        Rubric { sections }
    }

    /// True if the rubric has no sections.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Appends a blank section with weight 0 and no criteria.
    pub fn add_section(&mut self) {
        self.sections.push(Section::default());
    }

    /// Appends an empty criterion. Does nothing if `section_index` is out of range.
    pub fn add_criterion(&mut self, section_index: usize) {
        if let Some(section) = self.sections.get_mut(section_index) {
            section.criteria.push(Criterion::default());
        }
    }

    /// Removes a section, shifting the later ones down. Out-of-range indexes are ignored.
    ///
    /// Ratings keyed by position are not rewritten; keys past the end become orphans.
    pub fn remove_section(&mut self, section_index: usize) {
        if section_index < self.sections.len() {
            self.sections.remove(section_index);
        }
    }

    /// Removes one criterion of a section. Out-of-range indexes are ignored.
    pub fn remove_criterion(&mut self, section_index: usize, criterion_index: usize) {
        if let Some(section) = self.sections.get_mut(section_index) {
            if criterion_index < section.criteria.len() {
                section.criteria.remove(criterion_index);
            }
        }
    }

    /// Looks up a criterion. Keys left over from an older rubric shape return `None`.
    pub fn criterion(&self, key: CriterionKey) -> Option<&Criterion> {
        self.sections
            .get(key.section)
            .and_then(|section| section.criteria.get(key.criterion))
    }

    /// Mutable counterpart of `criterion`.
    pub fn criterion_mut(&mut self, key: CriterionKey) -> Option<&mut Criterion> {
        self.sections
            .get_mut(key.section)
            .and_then(|section| section.criteria.get_mut(key.criterion))
    }

    /// Every key addressing an existing criterion, in rubric order.
    pub fn keys(&self) -> impl Iterator<Item = CriterionKey> + '_ {
        self.sections.iter().enumerate().flat_map(|(s, section)| {
            (0..section.criteria.len()).map(move |c| CriterionKey::new(s, c))
        })
    }

    /// Sum of the effective section weights, as the scoring engine normalizes by it.
    pub fn total_weight(&self) -> f64 {
        self.sections.iter().map(Section::effective_weight).sum()
    }

    /// Lists authoring problems without rejecting the rubric.
    pub fn validate(&self) -> Vec<RubricIssue> {
        let mut issues = Vec::new();
        for (s, section) in self.sections.iter().enumerate() {
            if section.section.trim().is_empty() {
                issues.push(RubricIssue::UnnamedSection(s));
            }
            if !section.weight.is_finite() || section.weight < 0.0 {
                issues.push(RubricIssue::InvalidWeight {
                    section: s,
                    weight: section.weight,
                });
            }
            if section.criteria.is_empty() {
                issues.push(RubricIssue::EmptySection(s));
            }
            for (c, criterion) in section.criteria.iter().enumerate() {
                let key = CriterionKey::new(s, c);
                if criterion.description.trim().is_empty() {
                    issues.push(RubricIssue::UndescribedCriterion(key));
                }
                if !criterion.max_rating.is_finite() || criterion.max_rating < 0.0 {
                    issues.push(RubricIssue::InvalidMaxRating {
                        key,
                        max_rating: criterion.max_rating,
                    });
                } else if criterion.rating < 0.0 || criterion.rating > criterion.max_rating {
                    issues.push(RubricIssue::RatingOutOfRange {
                        key,
                        rating: criterion.rating,
                        max_rating: criterion.max_rating,
                    });
                }
            }
        }
        issues
    }
}

/// Reads an `evaluationTable` field: anything but a list of sections becomes an empty rubric.
pub fn read_rubric<'de, D>(deserializer: D) -> Result<Rubric, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Rubric::default()),
        value @ Value::Array(_) => serde_json::from_value(value).or_else(|e| {
            warn!("Ignoring unreadable evaluation table: {}", e);
            Ok(Rubric::default())
        }),
        other => {
            warn!("Expected a list of sections, found {}", other);
            Ok(Rubric::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn criterion(description: &str, max_rating: f64, rating: f64) -> Criterion {
        Criterion {
            description: description.to_string(),
            max_rating,
            rating,
            justification: None,
        }
    }

    #[test]
    fn add_section_appends_blank_section() {
        let mut rubric = Rubric::default();
        rubric.add_section();
        assert_eq!(rubric.sections, vec![Section::default()]);
        assert_eq!(rubric.sections[0].weight, 0.0);
    }

    #[test]
    fn add_criterion_out_of_range_is_noop() {
        let mut rubric = Rubric::default();
        rubric.add_section();
        rubric.add_criterion(0);
        rubric.add_criterion(5);
        assert_eq!(rubric.sections[0].criteria, vec![Criterion::default()]);
    }

    #[test]
    fn remove_by_index() {
        let mut rubric = Rubric::new(vec![
            Section {
                section: "A".into(),
                weight: 0.5,
                criteria: vec![criterion("a1", 5.0, 0.0), criterion("a2", 5.0, 0.0)],
            },
            Section {
                section: "B".into(),
                weight: 0.5,
                criteria: vec![],
            },
        ]);
        rubric.remove_criterion(0, 0);
        assert_eq!(rubric.sections[0].criteria[0].description, "a2");
        rubric.remove_criterion(0, 7);
        rubric.remove_criterion(9, 0);
        assert_eq!(rubric.sections[0].criteria.len(), 1);
        rubric.remove_section(3);
        assert_eq!(rubric.sections.len(), 2);
        rubric.remove_section(0);
        assert_eq!(rubric.sections[0].section, "B");
    }

    #[test]
    fn lookup_ignores_orphan_keys() {
        let mut rubric = Rubric::default();
        rubric.add_section();
        rubric.add_criterion(0);
        assert!(rubric.criterion(CriterionKey::new(0, 0)).is_some());
        assert!(rubric.criterion(CriterionKey::new(0, 1)).is_none());
        assert!(rubric.criterion(CriterionKey::new(1, 0)).is_none());
    }

    #[test]
    fn reads_stored_document_leniently() {
        let rubric: Rubric = serde_json::from_value(json!([
            {
                "section": "Innovation",
                "weight": "0.4",
                "criteria": [
                    { "description": "Novelty", "maxRating": 5, "rating": "3" },
                    { "description": "Impact", "maxRating": "x" }
                ]
            },
            { "weight": 0.6 }
        ]))
        .unwrap();
        assert_eq!(rubric.sections[0].weight, 0.4);
        assert_eq!(rubric.sections[0].criteria[0].rating, 3.0);
        assert_eq!(rubric.sections[0].criteria[1].max_rating, 0.0);
        assert!(rubric.sections[1].criteria.is_empty());
        assert_eq!(rubric.keys().count(), 2);
    }

    #[test]
    fn writes_camel_case() {
        let rubric = Rubric::new(vec![Section {
            section: "S".into(),
            weight: 1.0,
            criteria: vec![criterion("c", 4.0, 2.0)],
        }]);
        let value = serde_json::to_value(&rubric).unwrap();
        assert_eq!(value[0]["criteria"][0]["maxRating"], json!(4.0));
        assert!(value[0]["criteria"][0].get("justification").is_none());
    }

    #[test]
    fn total_weight_ignores_non_positive_weights() {
        let mut rubric = Rubric::default();
        rubric.add_section();
        rubric.add_section();
        rubric.add_section();
        rubric.sections[0].weight = 2.0;
        rubric.sections[1].weight = -1.0;
        rubric.sections[2].weight = f64::NAN;
        assert_eq!(rubric.sections[1].effective_weight(), 0.0);
        assert_eq!(rubric.total_weight(), 2.0);
    }

    #[test]
    fn criterion_bounds_ratings_by_its_maximum() {
        let c = criterion("c", 5.0, 0.0);
        assert!(c.accepts(0.0));
        assert!(c.accepts(5.0));
        assert!(!c.accepts(12.0));
        assert!(!c.accepts(-1.0));
        assert!(!c.accepts(f64::NAN));
        assert_eq!(c.clamp_rating(12.0), 5.0);
        assert_eq!(c.clamp_rating(-3.0), 0.0);
        assert_eq!(criterion("zero", 0.0, 0.0).clamp_rating(2.0), 0.0);
    }

    #[test]
    fn validate_reports_authoring_problems() {
        let mut rubric = Rubric::default();
        rubric.add_section();
        rubric.add_section();
        rubric.add_criterion(1);
        rubric.sections[1].section = "Named".into();
        rubric.sections[1].weight = -1.0;
        rubric.sections[1].criteria[0] = criterion("over", 3.0, 4.0);
        let issues = rubric.validate();
        assert!(issues.contains(&RubricIssue::UnnamedSection(0)));
        assert!(issues.contains(&RubricIssue::EmptySection(0)));
        assert!(issues.contains(&RubricIssue::InvalidWeight {
            section: 1,
            weight: -1.0
        }));
        assert!(issues.contains(&RubricIssue::RatingOutOfRange {
            key: CriterionKey::new(1, 0),
            rating: 4.0,
            max_rating: 3.0
        }));
    }
}
