use serde::{Deserialize, Serialize};

/// Normalized lookup key for a skill name ("  Data  Structures" → "data structures").
pub fn skill_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// One skill a course subject maps to, with its confidence weight in `(0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedSkill {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CatalogueEntry {
    keywords: Vec<String>,
    skills: Vec<MappedSkill>,
}

/// Fixed subject → skill-set table.
///
/// A subject matches the first entry with a keyword contained in it
/// (case-insensitive); unmatched subjects fall back to general skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCatalogue {
    entries: Vec<CatalogueEntry>,
    fallback: Vec<MappedSkill>,
}

fn mapped(skills: &[(&str, f64)]) -> Vec<MappedSkill> {
    skills
        .iter()
        .map(|(name, weight)| MappedSkill {
            name: (*name).to_string(),
            weight: *weight,
        })
        .collect()
}

impl Default for SkillCatalogue {
    fn default() -> Self {
        let table: [(&[&str], &[(&str, f64)]); 7] = [
            (
                &["computer", "programming", "software"],
                &[
                    ("Programming", 1.0),
                    ("Algorithms", 0.9),
                    ("Data Structures", 0.9),
                    ("Problem Solving", 0.8),
                ],
            ),
            (
                &["data", "statistic"],
                &[("Data Analysis", 1.0), ("Statistics", 0.9), ("Python", 0.6)],
            ),
            (
                &["math"],
                &[
                    ("Mathematics", 1.0),
                    ("Analytical Thinking", 0.9),
                    ("Statistics", 0.6),
                ],
            ),
            (
                &["physics", "engineering"],
                &[
                    ("Physics", 1.0),
                    ("Mathematics", 0.7),
                    ("Analytical Thinking", 0.8),
                ],
            ),
            (
                &["business", "economic", "management"],
                &[
                    ("Business Analysis", 0.9),
                    ("Economics", 0.8),
                    ("Communication", 0.7),
                ],
            ),
            (
                &["english", "writing", "literature"],
                &[
                    ("Writing", 1.0),
                    ("Communication", 0.9),
                    ("Critical Thinking", 0.7),
                ],
            ),
            (
                &["design", "art"],
                &[("Design", 1.0), ("Creativity", 0.8)],
            ),
        ];

        Self {
            entries: table
                .iter()
                .map(|(keywords, skills)| CatalogueEntry {
                    keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
                    skills: mapped(skills),
                })
                .collect(),
            fallback: mapped(&[("Critical Thinking", 0.5), ("Communication", 0.5)]),
        }
    }
}

impl SkillCatalogue {
    /// Catalogue with no subject entries; everything maps to `fallback`.
    pub fn empty(fallback: Vec<MappedSkill>) -> Self {
        Self {
            entries: Vec::new(),
            fallback,
        }
    }

    pub fn with_subject<I, S>(mut self, keywords: I, skills: Vec<MappedSkill>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.push(CatalogueEntry {
            keywords: keywords.into_iter().map(|k| skill_key(&k.into())).collect(),
            skills,
        });
        self
    }

    pub fn skills_for(&self, subject: &str) -> &[MappedSkill] {
        let subject = skill_key(subject);
        self.entries
            .iter()
            .find(|e| e.keywords.iter().any(|k| subject.contains(k.as_str())))
            .map(|e| e.skills.as_slice())
            .unwrap_or(&self.fallback)
    }
}
