//! Presentation boundary for scores.
//!
//! `round_percent` is the only place where percentages lose precision. Exporters (PDF,
//! CSV) consume `ScoreReport` and the raw rubric carried in it.

use crate::evaluator::EvaluatorRole;
use crate::rubric::Rubric;
use crate::scoring::{EvaluatorComparison, ScoreCard};
use serde::Serialize;
use std::collections::BTreeMap;

/// Rounds a percentage to the nearest whole number; anything non-finite or negative is 0.
pub fn round_percent(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        0
    } else {
        value.round() as u32
    }
}

/// Full-precision results of a project that passed the quorum gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResults {
    pub project_id: String,
    pub project_name: String,
    pub completed: usize,
    pub required: usize,
    pub cards: BTreeMap<EvaluatorRole, ScoreCard>,
    pub comparison: EvaluatorComparison,
    pub rubric: Rubric,
}

/// One section of the report, rounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionReport {
    pub name: String,
    pub weight_percent: u32,
    pub scores: BTreeMap<EvaluatorRole, u32>,
    pub mean: Option<u32>,
}

/// Rounded view of `ProjectResults` for display and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub project_id: String,
    pub project_name: String,
    pub sections: Vec<SectionReport>,
    pub overall: BTreeMap<EvaluatorRole, u32>,
    pub overall_mean: Option<u32>,
    pub rubric: Rubric,
}

/// One line of a flat export: a section (or `None` for the overall score) for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub role: EvaluatorRole,
    pub section: Option<String>,
    pub percent: u32,
}

impl ProjectResults {
    /// Effective weight of a section and the total it is normalized by, as the engine
    /// scored them. Falls back to the rubric when no evaluator was scored.
    fn section_weight(&self, index: usize) -> (f64, f64) {
        match self.cards.values().next() {
            Some(card) => (
                card.sections.get(index).map(|s| s.weight).unwrap_or(0.0),
                card.total_weight,
            ),
            None => (
                self.rubric
                    .sections
                    .get(index)
                    .map(|s| s.effective_weight())
                    .unwrap_or(0.0),
                self.rubric.total_weight(),
            ),
        }
    }
}

impl From<&ProjectResults> for ScoreReport {
    fn from(results: &ProjectResults) -> Self {
        let sections = results
            .comparison
            .sections
            .iter()
            .map(|section| {
                let (weight, total_weight) = results.section_weight(section.index);
                SectionReport {
                    name: section.name.clone(),
                    weight_percent: if total_weight > 0.0 {
                        round_percent(weight / total_weight * 100.0)
                    } else {
                        0
                    },
                    scores: section
                        .scores
                        .iter()
                        .map(|(role, score)| (*role, round_percent(*score)))
                        .collect(),
                    mean: section.mean().map(round_percent),
                }
            })
            .collect();
        let overall_mean = if results.comparison.overall.is_empty() {
            None
        } else {
            let sum: f64 = results.comparison.overall.values().sum();
            Some(round_percent(sum / results.comparison.overall.len() as f64))
        };
        ScoreReport {
            project_id: results.project_id.clone(),
            project_name: results.project_name.clone(),
            sections,
            overall: results
                .comparison
                .overall
                .iter()
                .map(|(role, score)| (*role, round_percent(*score)))
                .collect(),
            overall_mean,
            rubric: results.rubric.clone(),
        }
    }
}

impl ScoreReport {
    /// Flattens the report: every section score per role, then each role's overall score.
    pub fn rows(&self) -> Vec<ReportRow> {
        let mut rows = Vec::new();
        for section in &self.sections {
            for (role, percent) in &section.scores {
                rows.push(ReportRow {
                    role: *role,
                    section: Some(section.name.clone()),
                    percent: *percent,
                });
            }
        }
        for (role, percent) in &self.overall {
            rows.push(ReportRow {
                role: *role,
                section: None,
                percent: *percent,
            });
        }
        rows
    }
}
