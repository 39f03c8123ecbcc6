use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lyceum_core::{CourseId, Percentage, UserId, round2};

use crate::catalogue::{MappedSkill, skill_key};

/// Proficiency tier derived from a final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl ProficiencyLevel {
    /// `≥ 90` expert, `≥ 80` advanced, `≥ 70` intermediate, else beginner.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            ProficiencyLevel::Expert
        } else if score >= 80.0 {
            ProficiencyLevel::Advanced
        } else if score >= 70.0 {
            ProficiencyLevel::Intermediate
        } else {
            ProficiencyLevel::Beginner
        }
    }
}

/// What a merge did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillChange {
    Created,
    Raised,
    Confirmed,
    /// Lower grade recorded by the same source course.
    Lowered,
    /// Lower evidence from another course; level kept.
    Kept,
}

impl SkillChange {
    pub fn level_changed(self) -> bool {
        matches!(
            self,
            SkillChange::Created | SkillChange::Raised | SkillChange::Lowered
        )
    }
}

/// One (student, skill) proficiency row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRecord {
    pub student_id: UserId,
    pub skill: String,
    /// Normalized name; unique together with `student_id`.
    pub key: String,
    pub proficiency: ProficiencyLevel,
    /// `weight × score / 100`, in `[0, 1]`.
    pub confidence: f64,
    pub verified: bool,
    pub source_course: CourseId,
    pub source_score: Percentage,
    pub updated_at: DateTime<Utc>,
}

impl SkillRecord {
    /// Evidence for one mapped skill from one completed course.
    pub fn derive(
        student_id: UserId,
        mapped: &MappedSkill,
        course_id: CourseId,
        final_score: Percentage,
        at: DateTime<Utc>,
    ) -> Self {
        let confidence = round2((mapped.weight * final_score.value() / 100.0).clamp(0.0, 1.0));
        Self {
            student_id,
            skill: mapped.name.clone(),
            key: skill_key(&mapped.name),
            proficiency: ProficiencyLevel::from_score(final_score.value()),
            confidence,
            verified: true,
            source_course: course_id,
            source_score: final_score,
            updated_at: at,
        }
    }

    fn take(&mut self, incoming: SkillRecord) {
        let key = std::mem::take(&mut self.key);
        *self = incoming;
        self.key = key;
    }

    /// Fold new evidence into the stored row.
    ///
    /// Proficiency only moves down when the lower grade comes from the course
    /// that produced the current level.
    pub fn merge(&mut self, incoming: SkillRecord) -> SkillChange {
        if incoming.proficiency > self.proficiency {
            self.take(incoming);
            return SkillChange::Raised;
        }

        if incoming.proficiency == self.proficiency {
            let confidence = self.confidence.max(incoming.confidence);
            self.take(incoming);
            self.confidence = confidence;
            return SkillChange::Confirmed;
        }

        if incoming.source_course == self.source_course {
            self.take(incoming);
            return SkillChange::Lowered;
        }

        self.verified = true;
        self.updated_at = incoming.updated_at;
        SkillChange::Kept
    }
}
