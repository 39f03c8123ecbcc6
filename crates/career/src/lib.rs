//! Career domain module.
//!
//! Pure derivations run after a course completes: subject → skill mapping,
//! proficiency tiers, the skill-record merge rule and job-match scoring.

pub mod catalogue;
pub mod job;
pub mod skill;

pub use catalogue::{MappedSkill, SkillCatalogue, skill_key};
pub use job::{
    GapKind, JobListing, JobRecommendation, MatchConfidence, SkillGap, recommend, score_listing,
};
pub use skill::{ProficiencyLevel, SkillChange, SkillRecord};
