use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lyceum_core::{JobListingId, Percentage, UserId, round2};

use crate::catalogue::skill_key;

pub const REQUIRED_WEIGHT: f64 = 0.7;
pub const PREFERRED_WEIGHT: f64 = 0.3;

/// Read-only catalogue entry, loaded out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub id: JobListingId,
    pub title: String,
    pub company: String,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
}

impl JobListing {
    pub fn new(title: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            id: JobListingId::new(),
            title: title.into(),
            company: company.into(),
            required_skills: Vec::new(),
            preferred_skills: Vec::new(),
        }
    }

    pub fn requires<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_skills.extend(skills.into_iter().map(Into::into));
        self
    }

    pub fn prefers<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_skills.extend(skills.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    Low,
    Medium,
    High,
}

impl MatchConfidence {
    /// `≥ 80` high, `≥ 60` medium, else low.
    pub fn from_percentage(pct: Percentage) -> Self {
        if pct.value() >= 80.0 {
            MatchConfidence::High
        } else if pct.value() >= 60.0 {
            MatchConfidence::Medium
        } else {
            MatchConfidence::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapKind {
    Required,
    Preferred,
}

/// A listing skill the student does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillGap {
    pub skill: String,
    pub kind: GapKind,
}

/// One (student, job) match row. Upserted, never appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecommendation {
    pub student_id: UserId,
    pub job_id: JobListingId,
    pub job_title: String,
    pub match_percentage: Percentage,
    pub confidence: MatchConfidence,
    pub skill_gaps: Vec<SkillGap>,
    pub computed_at: DateTime<Utc>,
}

fn matched(
    wanted: &[String],
    held: &HashSet<String>,
    kind: GapKind,
    gaps: &mut Vec<SkillGap>,
) -> f64 {
    if wanted.is_empty() {
        return 0.0;
    }
    let mut hits = 0usize;
    for skill in wanted {
        if held.contains(&skill_key(skill)) {
            hits += 1;
        } else {
            gaps.push(SkillGap {
                skill: skill.clone(),
                kind,
            });
        }
    }
    hits as f64 / wanted.len() as f64
}

/// `(0.7 × required ratio + 0.3 × preferred ratio) × 100`; an empty list contributes 0.
///
/// `held` contains normalized skill keys.
pub fn score_listing(listing: &JobListing, held: &HashSet<String>) -> (Percentage, Vec<SkillGap>) {
    let mut gaps = Vec::new();
    let required = matched(&listing.required_skills, held, GapKind::Required, &mut gaps);
    let preferred = matched(&listing.preferred_skills, held, GapKind::Preferred, &mut gaps);
    let pct = Percentage::clamped(round2(
        (REQUIRED_WEIGHT * required + PREFERRED_WEIGHT * preferred) * 100.0,
    ));
    (pct, gaps)
}

/// Full recomputation of a student's recommendation set.
///
/// Listings scoring below `threshold` are omitted; the result is sorted by match
/// percentage, best first.
pub fn recommend<'a, I>(
    student_id: UserId,
    listings: I,
    held: &HashSet<String>,
    threshold: f64,
    at: DateTime<Utc>,
) -> Vec<JobRecommendation>
where
    I: IntoIterator<Item = &'a JobListing>,
{
    let mut recs: Vec<JobRecommendation> = listings
        .into_iter()
        .filter_map(|listing| {
            let (pct, gaps) = score_listing(listing, held);
            (pct.value() >= threshold).then(|| JobRecommendation {
                student_id,
                job_id: listing.id,
                job_title: listing.title.clone(),
                match_percentage: pct,
                confidence: MatchConfidence::from_percentage(pct),
                skill_gaps: gaps,
                computed_at: at,
            })
        })
        .collect();

    recs.sort_by(|a, b| b.match_percentage.value().total_cmp(&a.match_percentage.value()));
    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn held(skills: &[&str]) -> HashSet<String> {
        skills.iter().map(|s| skill_key(s)).collect()
    }

    fn backend() -> JobListing {
        JobListing::new("Backend Engineer", "Acme")
            .requires(["Programming", "Algorithms"])
            .prefers(["Statistics", "Communication", "Writing"])
    }

    #[test]
    fn full_required_no_preferred() {
        let (pct, gaps) = score_listing(&backend(), &held(&["programming", "ALGORITHMS"]));
        assert_eq!(pct.value(), 70.0);
        assert_eq!(gaps.len(), 3);
        assert!(gaps.iter().all(|g| g.kind == GapKind::Preferred));
    }

    #[test]
    fn partial_match_rounds_to_two_decimals() {
        let (pct, _) = score_listing(&backend(), &held(&["Programming", "Statistics"]));
        // 0.7 × 0.5 + 0.3 × (1/3) = 0.45
        assert_eq!(pct.value(), 45.0);
        assert_eq!(MatchConfidence::from_percentage(pct), MatchConfidence::Low);
    }

    #[test]
    fn no_preferred_skills_contribute_zero() {
        let listing = JobListing::new("Analyst", "Acme").requires(["Statistics"]);
        let (pct, gaps) = score_listing(&listing, &held(&["Statistics"]));
        assert_eq!(pct.value(), 70.0);
        assert!(gaps.is_empty());
    }

    #[test]
    fn below_threshold_is_omitted() {
        let listings = vec![
            backend(),
            JobListing::new("Designer", "Studio").requires(["Design"]),
        ];
        let recs = recommend(
            UserId::new(),
            &listings,
            &held(&["Programming", "Algorithms", "Statistics"]),
            40.0,
            Utc::now(),
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].job_title, "Backend Engineer");
        assert_eq!(recs[0].match_percentage.value(), 80.0);
        assert_eq!(recs[0].confidence, MatchConfidence::High);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: adding a held skill never lowers any match percentage.
        #[test]
        fn more_skills_never_lower_match(mask in 0u8..32, extra in 0usize..5) {
            let names = ["Programming", "Algorithms", "Statistics", "Communication", "Writing"];
            let before: HashSet<String> = names
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| skill_key(n))
                .collect();
            let mut after = before.clone();
            after.insert(skill_key(names[extra]));

            let (a, _) = score_listing(&backend(), &before);
            let (b, _) = score_listing(&backend(), &after);
            prop_assert!(b.value() >= a.value());
        }
    }
}
