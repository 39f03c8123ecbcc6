//! Skill-profile updates and job recommendations.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use lyceum_career::{JobRecommendation, SkillCatalogue, SkillChange, SkillRecord, recommend};
use lyceum_core::{DomainError, EnrollmentId, UserId};

use crate::activity::{ActivityEvent, STUDENT_STREAM};
use crate::error::{CascadeWarning, EngineResult};
use crate::services::EngineContext;

#[derive(Debug, Clone, PartialEq)]
pub struct CareerUpdate {
    pub skills: Vec<(SkillRecord, SkillChange)>,
    pub recommendations: Vec<JobRecommendation>,
    pub warnings: Vec<CascadeWarning>,
}

/// Result of a recommendation recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationRefresh {
    pub recommendations: Vec<JobRecommendation>,
    pub warnings: Vec<CascadeWarning>,
}

impl CareerUpdate {
    pub fn any_level_changed(&self) -> bool {
        self.skills.iter().any(|(_, change)| change.level_changed())
    }
}

#[derive(Debug, Clone)]
pub struct CareerRecommendationEngine {
    ctx: Arc<EngineContext>,
    catalogue: Arc<SkillCatalogue>,
}

impl CareerRecommendationEngine {
    pub fn new(ctx: Arc<EngineContext>, catalogue: Arc<SkillCatalogue>) -> Self {
        Self { ctx, catalogue }
    }

    /// Upsert one skill row per mapped skill of the course, then recompute
    /// recommendations. Safe to repeat.
    pub fn update_for_completion(&self, enrollment_id: EnrollmentId) -> EngineResult<CareerUpdate> {
        let enrollment = self.ctx.load_enrollment(enrollment_id)?;
        let final_score = match enrollment.final_score() {
            Some(score) if enrollment.is_completed() => score,
            _ => {
                return Err(DomainError::invalid_state(format!(
                    "enrollment {enrollment_id} has no final grade"
                ))
                .into());
            }
        };
        let course = self.ctx.load_course(enrollment.course_id())?;
        let student_id = enrollment.student_id();
        let now = Utc::now();

        let mut skills = Vec::new();
        for mapped in self.catalogue.skills_for(&course.subject) {
            let record = SkillRecord::derive(student_id, mapped, course.id, final_score, now);
            skills.push(self.ctx.store.upsert_skill(record)?);
        }

        let mut warnings = Vec::new();
        let event = ActivityEvent::SkillsUpdated {
            student_id,
            course_id: course.id,
            skills: skills.iter().map(|(s, _)| s.skill.clone()).collect(),
            occurred_at: now,
        };
        if let Err(w) = self
            .ctx
            .activity
            .record(*student_id.as_uuid(), STUDENT_STREAM, None, &[event])
        {
            warnings.push(w);
        }

        let refresh = self.recompute_recommendations(student_id)?;
        warnings.extend(refresh.warnings);
        let recommendations = refresh.recommendations;
        info!(
            %enrollment_id,
            %student_id,
            skills = skills.len(),
            recommendations = recommendations.len(),
            "career profile updated"
        );

        Ok(CareerUpdate {
            skills,
            recommendations,
            warnings,
        })
    }

    /// Full recomputation; rows below the threshold are deleted. Skills held
    /// below `job_match_min_proficiency` do not count as matched.
    pub fn recompute_recommendations(&self, student_id: UserId) -> EngineResult<RecommendationRefresh> {
        let min_level = self.ctx.config.job_match_min_proficiency;
        let held: HashSet<String> = self
            .ctx
            .store
            .skills_for(student_id)?
            .into_iter()
            .filter(|s| s.proficiency >= min_level)
            .map(|s| s.key)
            .collect();
        let listings = self.ctx.store.job_listings()?;
        let now = Utc::now();

        let recs = recommend(
            student_id,
            &listings,
            &held,
            self.ctx.config.job_match_threshold,
            now,
        );
        self.ctx.store.replace_recommendations(student_id, &recs)?;

        let event = ActivityEvent::RecommendationsRecomputed {
            student_id,
            kept: recs.len(),
            occurred_at: now,
        };
        let warnings = match self
            .ctx
            .activity
            .record(*student_id.as_uuid(), STUDENT_STREAM, None, &[event])
        {
            Ok(_) => Vec::new(),
            Err(w) => vec![w],
        };

        Ok(RecommendationRefresh {
            recommendations: recs,
            warnings,
        })
    }

    pub fn skills(&self, student_id: UserId) -> EngineResult<Vec<SkillRecord>> {
        Ok(self.ctx.store.skills_for(student_id)?)
    }

    pub fn recommendations(&self, student_id: UserId) -> EngineResult<Vec<JobRecommendation>> {
        Ok(self.ctx.store.recommendations_for(student_id)?)
    }
}
