//! Weighted rubric scoring.
//!
//! Everything here is a pure function of a rubric and one set of ratings. Percentages stay
//! in full `f64` precision; rounding belongs to `report`.
//!
//! Policies:
//! - a criterion with `maxRating == 0` scores 0% on its own and is left out of both sums of
//!   its section, so placeholder criteria do not pull a section down;
//! - ratings are clamped into `[0, maxRating]`; missing ratings read as 0;
//! - ratings keyed outside the current rubric are ignored;
//! - negative or non-finite weights count as 0, and the overall score is normalized by the
//!   total weight, so weights need not sum to one.

use crate::criterion_key::CriterionKey;
use crate::evaluation::Ratings;
use crate::evaluator::EvaluatorRole;
use crate::rubric::{Criterion, Rubric, Section};
use serde::Serialize;
use std::collections::BTreeMap;

/// One criterion as scored: the clamped rating and its percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionScore {
    pub key: CriterionKey,
    pub rating: f64,
    pub max_rating: f64,
    pub percentage: f64,
}

/// One section as scored for one evaluator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionScore {
    pub index: usize,
    pub name: String,
    /// Effective weight; negative or non-finite weights are 0 here.
    pub weight: f64,
    pub earned: f64,
    pub possible: f64,
    pub percentage: f64,
    /// `percentage * weight`
    pub weighted: f64,
    pub criteria: Vec<CriterionScore>,
}

/// Full scoring of one set of ratings against a rubric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCard {
    pub sections: Vec<SectionScore>,
    pub total_weight: f64,
    pub overall: f64,
}

fn clamp_rating(rating: f64, max_rating: f64) -> f64 {
    if !rating.is_finite() || !max_rating.is_finite() || max_rating <= 0.0 {
        return 0.0;
    }
    rating.clamp(0.0, max_rating)
}

/// `rating / maxRating * 100`, or 0 when the criterion has no maximum.
pub fn criterion_percentage(rating: f64, max_rating: f64) -> f64 {
    if !max_rating.is_finite() || max_rating <= 0.0 {
        return 0.0;
    }
    clamp_rating(rating, max_rating) / max_rating * 100.0
}

fn score_section<F>(index: usize, section: &Section, rating_of: &F) -> SectionScore
where
    F: Fn(CriterionKey, &Criterion) -> f64,
{
    let mut earned = 0.0;
    let mut possible = 0.0;
    let mut criteria = Vec::with_capacity(section.criteria.len());
    for (c, criterion) in section.criteria.iter().enumerate() {
        let key = CriterionKey::new(index, c);
        let max_rating = criterion.effective_max();
        let rating = criterion.clamp_rating(rating_of(key, criterion));
        earned += rating;
        possible += max_rating;
        criteria.push(CriterionScore {
            key,
            rating,
            max_rating,
            percentage: criterion_percentage(rating, max_rating),
        });
    }
    let percentage = if possible > 0.0 {
        earned / possible * 100.0
    } else {
        0.0
    };
    let weight = section.effective_weight();
    SectionScore {
        index,
        name: section.section.clone(),
        weight,
        earned,
        possible,
        percentage,
        weighted: percentage * weight,
        criteria,
    }
}

fn score_with<F>(rubric: &Rubric, rating_of: F) -> ScoreCard
where
    F: Fn(CriterionKey, &Criterion) -> f64,
{
    let sections: Vec<SectionScore> = rubric
        .sections
        .iter()
        .enumerate()
        .map(|(index, section)| score_section(index, section, &rating_of))
        .collect();
    let total_weight: f64 = sections.iter().map(|s| s.weight).sum();
    let overall = if total_weight > 0.0 {
        sections.iter().map(|s| s.weighted).sum::<f64>() / total_weight
    } else {
        0.0
    };
    ScoreCard {
        sections,
        total_weight,
        overall,
    }
}

/// Scores one evaluator's ratings against the rubric.
pub fn score(rubric: &Rubric, ratings: &Ratings) -> ScoreCard {
    score_with(rubric, |key, _| ratings.get(&key).copied().unwrap_or(0.0))
}

/// Scores the ratings stored in the rubric's criteria, as copied there on submit.
pub fn score_rubric(rubric: &Rubric) -> ScoreCard {
    score_with(rubric, |_, criterion| criterion.rating)
}

/// Percentage of one section for one evaluator; 0 for a section index outside the rubric.
pub fn section_percentage(rubric: &Rubric, section_index: usize, ratings: &Ratings) -> f64 {
    rubric
        .sections
        .get(section_index)
        .map(|section| {
            score_section(section_index, section, &|key, _| {
                ratings.get(&key).copied().unwrap_or(0.0)
            })
            .percentage
        })
        .unwrap_or(0.0)
}

/// Weight-normalized overall score for one evaluator; 0 when no section carries weight.
pub fn overall_score(rubric: &Rubric, ratings: &Ratings) -> f64 {
    score(rubric, ratings).overall
}

/// Rating keys that address no criterion of the current rubric.
pub fn orphaned_keys(rubric: &Rubric, ratings: &Ratings) -> Vec<CriterionKey> {
    ratings
        .keys()
        .filter(|key| rubric.criterion(**key).is_none())
        .copied()
        .collect()
}

/// One section's percentage per evaluator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionComparison {
    pub index: usize,
    pub name: String,
    pub scores: BTreeMap<EvaluatorRole, f64>,
}

impl SectionComparison {
    /// Plain mean over the evaluators present. A display convenience; the engine never
    /// merges evaluators on its own.
    pub fn mean(&self) -> Option<f64> {
        if self.scores.is_empty() {
            None
        } else {
            Some(self.scores.values().sum::<f64>() / self.scores.len() as f64)
        }
    }
}

/// Per-section and overall scores of several evaluators, kept apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatorComparison {
    pub sections: Vec<SectionComparison>,
    pub overall: BTreeMap<EvaluatorRole, f64>,
}

/// Scores every evaluator independently against the same rubric.
pub fn compare_evaluators<'a, I>(rubric: &Rubric, evaluations: I) -> EvaluatorComparison
where
    I: IntoIterator<Item = (EvaluatorRole, &'a Ratings)>,
{
    let mut sections: Vec<SectionComparison> = rubric
        .sections
        .iter()
        .enumerate()
        .map(|(index, section)| SectionComparison {
            index,
            name: section.section.clone(),
            scores: BTreeMap::new(),
        })
        .collect();
    let mut overall = BTreeMap::new();
    for (role, ratings) in evaluations {
        let card = score(rubric, ratings);
        for section in &card.sections {
            sections[section.index]
                .scores
                .insert(role, section.percentage);
        }
        overall.insert(role, card.overall);
    }
    EvaluatorComparison { sections, overall }
}
