//! Weighted final-grade calculation (pure).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use lyceum_core::{Percentage, round2};

use crate::assignment::GradeCategory;
use crate::letter::LetterGrade;

/// How category weights treat categories with no graded work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingPolicy {
    /// Fixed weights; an empty category scores 0% and still carries its weight.
    #[default]
    Fixed,
    /// Divide by the summed weight of categories that have graded work.
    RenormalizePopulated,
}

/// One graded submission reduced to what the calculation needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradedWork {
    pub category: GradeCategory,
    pub points_earned: f64,
    pub max_points: f64,
}

/// Earned/possible sums for one category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub earned: f64,
    pub possible: f64,
    pub count: usize,
}

impl CategoryTotals {
    pub fn percentage(&self) -> Percentage {
        Percentage::ratio(self.earned, self.possible)
    }
}

/// Result of a final-grade computation. Callers persist it.
///
/// `letter` is looked up on the weighted score before it is rounded for
/// `final_score`, so a score just under a breakpoint never rounds up into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeComponents {
    pub assignments: Percentage,
    pub quizzes: Percentage,
    pub exams: Percentage,
    pub projects: Percentage,
    pub final_score: Percentage,
    pub letter: LetterGrade,
    pub gpa_points: f64,
}

impl GradeComponents {
    pub fn category(&self, category: GradeCategory) -> Percentage {
        match category {
            GradeCategory::Assignments => self.assignments,
            GradeCategory::Quizzes => self.quizzes,
            GradeCategory::Exams => self.exams,
            GradeCategory::Projects => self.projects,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FinalGradeCalculator {
    policy: WeightingPolicy,
}

impl FinalGradeCalculator {
    pub fn new(policy: WeightingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> WeightingPolicy {
        self.policy
    }

    /// Partition graded work by category and sum earned/possible points.
    pub fn totals(work: &[GradedWork]) -> BTreeMap<GradeCategory, CategoryTotals> {
        let mut totals: BTreeMap<GradeCategory, CategoryTotals> = GradeCategory::ALL
            .iter()
            .map(|c| (*c, CategoryTotals::default()))
            .collect();

        for w in work {
            let entry = totals.entry(w.category).or_default();
            entry.earned += w.points_earned;
            entry.possible += w.max_points;
            entry.count += 1;
        }
        totals
    }

    pub fn compute(&self, work: &[GradedWork]) -> GradeComponents {
        let totals = Self::totals(work);
        let pct = |c: GradeCategory| totals.get(&c).map(|t| t.percentage()).unwrap_or_default();

        let weighted: f64 = GradeCategory::ALL
            .iter()
            .map(|c| c.weight() * pct(*c).value())
            .sum();

        let final_value = match self.policy {
            WeightingPolicy::Fixed => weighted,
            WeightingPolicy::RenormalizePopulated => {
                let populated: f64 = GradeCategory::ALL
                    .iter()
                    .filter(|c| totals.get(c).is_some_and(|t| t.count > 0))
                    .map(|c| c.weight())
                    .sum();
                if populated > 0.0 { weighted / populated } else { 0.0 }
            }
        };

        let final_score = Percentage::clamped(round2(final_value));
        let letter = LetterGrade::from_score(without_float_noise(final_value).clamp(0.0, 100.0));

        GradeComponents {
            assignments: pct(GradeCategory::Assignments),
            quizzes: pct(GradeCategory::Quizzes),
            exams: pct(GradeCategory::Exams),
            projects: pct(GradeCategory::Projects),
            final_score,
            letter,
            gpa_points: letter.gpa_points(),
        }
    }
}

/// Drops float error below 1e-6 so that, say, 89.99999999999999 reads as 90.
fn without_float_noise(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 1e6).round() / 1e6
}
