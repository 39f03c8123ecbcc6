//! Coursework domain module.
//!
//! Courses, assignments, submissions and the pure grading math: score
//! validation, progress percentage, weighted final grade and the letter/GPA
//! table. No IO, no storage.

pub mod assignment;
pub mod course;
pub mod final_grade;
pub mod grade;
pub mod letter;
pub mod progress;
pub mod submission;

pub use assignment::{Assignment, AssignmentType, GradeCategory};
pub use course::Course;
pub use final_grade::{
    CategoryTotals, FinalGradeCalculator, GradeComponents, GradedWork, WeightingPolicy,
};
pub use grade::Grade;
pub use letter::LetterGrade;
pub use progress::completion_percentage;
pub use submission::Submission;
