use lyceum_core::Percentage;

/// Completion percentage: graded submissions over published assignments.
///
/// Zero published assignments yields 0%, never a division error. The result is
/// clamped to `[0, 100]` with two-decimal precision.
pub fn completion_percentage(published_assignments: usize, graded_submissions: usize) -> Percentage {
    if published_assignments == 0 {
        return Percentage::ZERO;
    }
    Percentage::ratio(graded_submissions as f64, published_assignments as f64)
}
