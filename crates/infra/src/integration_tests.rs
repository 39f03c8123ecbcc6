//! End-to-end tests for the grade → progress → completion pipeline.
//!
//! Tests: Enrollment → Grading → ProgressTracker → CompletionOrchestrator
//!        → CertificateIssuer / CareerRecommendationEngine / Notifier
//!
//! Verifies:
//! - A fully graded enrollment completes with the expected grade, also when
//!   the last grade lands while it is suspended
//! - The completion cascade runs at most once, also under concurrent grading
//! - Downstream failures surface as warnings or delivery failures, never as
//!   errors, and a hung channel never blocks grading

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    use lyceum_ai::{AiError, FeedbackGenerator, FeedbackReport, FeedbackRequest, FeedbackSource};
    use lyceum_career::{JobListing, ProficiencyLevel};
    use lyceum_core::{AssignmentId, CourseId, DomainError, EnrollmentId, UserId};
    use lyceum_coursework::{Assignment, AssignmentType, Course, LetterGrade, Submission, WeightingPolicy};
    use lyceum_credentials::{CertificateCodes, CertificateSnapshot};
    use lyceum_enrollment::{EnrollmentEvent, EnrollmentStatus};

    use crate::error::{CascadeStep, EngineError};
    use crate::notification::{Notification, NotificationDispatcher, NotificationKind, NotifyError, RecordingDispatcher};
    use crate::renderer::{CertificateRenderer, RenderError};
    use crate::retry::RetryPolicy;
    use crate::services::completion::TriggerOutcome;
    use crate::services::grading::{GradeSubmission, GradingOutcome};
    use crate::store::{AcademicStore, InMemoryAcademicStore};
    use crate::{EngineConfig, ProgressionEngine, ProgressionEngineBuilder};

    struct Fixture {
        engine: ProgressionEngine,
        store: Arc<dyn AcademicStore>,
        memory: Arc<InMemoryAcademicStore>,
        notifications: Arc<RecordingDispatcher>,
        teacher: UserId,
        student: UserId,
        course: Course,
        assignments: Vec<Assignment>,
        enrollment_id: EnrollmentId,
    }

    fn test_config() -> EngineConfig {
        EngineConfig::default()
            .with_weighting(WeightingPolicy::RenormalizePopulated)
            .with_notification_retry(RetryPolicy::fixed(2, Duration::from_millis(1)))
            .with_collaborator_timeout(Duration::from_millis(250))
    }

    fn setup_with(
        config: EngineConfig,
        kinds: &[(AssignmentType, f64)],
        customize: impl FnOnce(ProgressionEngineBuilder) -> ProgressionEngineBuilder,
    ) -> Fixture {
        lyceum_observability::init();
        let memory = Arc::new(InMemoryAcademicStore::new());
        let store: Arc<dyn AcademicStore> = memory.clone();
        let notifications = Arc::new(RecordingDispatcher::new());
        let teacher = UserId::new();
        let student = UserId::new();

        let course = Course::new(CourseId::new(), "Intro to Programming", "Computer Science", teacher);
        store.put_course(course.clone()).unwrap();

        let assignments: Vec<Assignment> = kinds
            .iter()
            .enumerate()
            .map(|(i, (kind, max))| {
                Assignment::new(AssignmentId::new(), course.id, format!("Task {}", i + 1), *kind, *max)
                    .unwrap()
                    .published()
            })
            .collect();
        for a in &assignments {
            store.put_assignment(a.clone()).unwrap();
        }

        let builder = ProgressionEngine::builder(Arc::clone(&store))
            .config(config)
            .dispatcher(notifications.clone());
        let engine = customize(builder).build();

        let requested = engine.enrollments().request(student, course.id).unwrap();
        let enrollment_id = requested.enrollment.id_typed();
        engine.enrollments().approve(enrollment_id, teacher).unwrap();

        Fixture {
            engine,
            store,
            memory,
            notifications,
            teacher,
            student,
            course,
            assignments,
            enrollment_id,
        }
    }

    fn setup(kinds: &[(AssignmentType, f64)]) -> Fixture {
        setup_with(test_config(), kinds, |b| b)
    }

    fn two_homeworks() -> Fixture {
        setup(&[(AssignmentType::Homework, 50.0), (AssignmentType::Homework, 50.0)])
    }

    impl Fixture {
        /// Wait for the delivery worker to drain.
        fn flush(&self) {
            assert!(
                self.engine.deliveries().wait_idle(Duration::from_secs(10)),
                "deliveries still pending: {:?}",
                self.engine.deliveries().stats()
            );
        }

        /// Notifications of `kind` delivered once the queue has drained.
        fn sent(&self, kind: NotificationKind) -> usize {
            self.flush();
            self.notifications.count(kind)
        }

        fn submit_all(&self) -> Vec<Submission> {
            self.assignments
                .iter()
                .map(|a| {
                    self.engine
                        .grading()
                        .submit(a.id, self.student, Some("my answer".to_string()))
                        .unwrap()
                })
                .collect()
        }

        fn grade(&self, submission: &Submission, points: f64) -> GradingOutcome {
            self.engine
                .grading()
                .grade(GradeSubmission {
                    submission_id: submission.id,
                    points_earned: points,
                    feedback: Some("Graded.".to_string()),
                    grader: self.teacher,
                })
                .unwrap()
        }

        /// Grade every submission at full marks; returns the last outcome.
        fn complete(&self) -> GradingOutcome {
            let submissions = self.submit_all();
            let mut last = None;
            for (s, a) in submissions.iter().zip(&self.assignments) {
                last = Some(self.grade(s, a.max_points));
            }
            last.unwrap()
        }
    }

    struct FailingRenderer;

    impl CertificateRenderer for FailingRenderer {
        fn render(&self, _: &CertificateSnapshot) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Unavailable("pdf service down".into()))
        }
    }

    struct StaticRenderer;

    impl CertificateRenderer for StaticRenderer {
        fn render(&self, snapshot: &CertificateSnapshot) -> Result<Vec<u8>, RenderError> {
            Ok(snapshot.certificate_id.as_bytes().to_vec())
        }
    }

    struct FailingDispatcher;

    impl NotificationDispatcher for FailingDispatcher {
        fn send(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Unavailable("smtp down".into()))
        }
    }

    struct HangingDispatcher;

    impl NotificationDispatcher for HangingDispatcher {
        fn send(&self, _: &Notification) -> Result<(), NotifyError> {
            thread::sleep(Duration::from_secs(5));
            Ok(())
        }
    }

    struct FixedCodes;

    impl CertificateCodes for FixedCodes {
        fn certificate_id(&self) -> String {
            "CERT-FIXED".to_string()
        }

        fn verification_code(&self) -> String {
            "FIXEDCODE".to_string()
        }
    }

    struct SlowGenerator;

    impl FeedbackGenerator for SlowGenerator {
        fn generate(&self, _: &FeedbackRequest) -> Result<FeedbackReport, AiError> {
            thread::sleep(Duration::from_millis(500));
            Ok(FeedbackReport::new("too late", 0.0, FeedbackSource::Generated))
        }
    }

    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    impl FeedbackGenerator for CountingGenerator {
        fn generate(&self, request: &FeedbackRequest) -> Result<FeedbackReport, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FeedbackReport::new(
                format!("Generated for {}", request.assignment_title),
                request.score().value(),
                FeedbackSource::Generated,
            ))
        }
    }

    #[test]
    fn end_to_end_two_homeworks_complete_the_enrollment() {
        let fx = two_homeworks();
        let submissions = fx.submit_all();

        let first = fx.grade(&submissions[0], 50.0);
        let progress = first.progress.as_ref().unwrap();
        assert_eq!(progress.percentage.value(), 50.0);
        assert!(first.completion.is_none());

        let last = fx.grade(&submissions[1], 40.0);
        assert_eq!(last.submission.percentage_score.unwrap().value(), 80.0);
        let report = last.completion.as_ref().and_then(TriggerOutcome::report).unwrap();
        assert_eq!(report.grade.components.final_score.value(), 90.0);
        assert_eq!(report.grade.components.letter, LetterGrade::AMinus);
        assert_eq!(report.grade.components.gpa_points, 3.7);
        assert!(report.grade.published);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);

        let enrollment = fx.engine.enrollments().get(fx.enrollment_id).unwrap();
        assert_eq!(enrollment.status(), EnrollmentStatus::Completed);
        assert!(enrollment.completion().is_full());
        assert_eq!(enrollment.letter_grade(), Some(LetterGrade::AMinus));

        let certificate = fx.store.certificate_for(fx.enrollment_id).unwrap().unwrap();
        assert_eq!(certificate.snapshot.letter_grade, LetterGrade::AMinus);
        assert!(!fx.engine.career().skills(fx.student).unwrap().is_empty());

        assert_eq!(fx.sent(NotificationKind::EnrollmentApproved), 1);
        assert_eq!(fx.sent(NotificationKind::SubmissionGraded), 2);
        assert_eq!(fx.sent(NotificationKind::CourseCompleted), 1);
        assert_eq!(fx.sent(NotificationKind::CertificateIssued), 1);
        assert_eq!(fx.sent(NotificationKind::SkillsUpdated), 1);
    }

    #[test]
    fn fixed_weighting_keeps_empty_categories_at_zero() {
        let fx = setup_with(
            test_config().with_weighting(WeightingPolicy::Fixed),
            &[(AssignmentType::Homework, 50.0), (AssignmentType::Homework, 50.0)],
            |b| b,
        );
        let submissions = fx.submit_all();
        fx.grade(&submissions[0], 50.0);
        let last = fx.grade(&submissions[1], 40.0);

        let report = last.completion.as_ref().and_then(TriggerOutcome::report).unwrap();
        assert_eq!(report.grade.components.assignments.value(), 90.0);
        assert_eq!(report.grade.components.final_score.value(), 27.0);
        assert_eq!(report.grade.components.letter, LetterGrade::F);
    }

    #[test]
    fn regrades_after_completion_do_not_rerun_the_cascade() {
        let fx = two_homeworks();
        let submissions = fx.submit_all();
        fx.grade(&submissions[0], 50.0);
        assert!(fx.grade(&submissions[1], 50.0).completed());
        let certificate = fx.store.certificate_for(fx.enrollment_id).unwrap().unwrap();

        for points in [45.0, 50.0, 48.0] {
            let outcome = fx.grade(&submissions[1], points);
            assert!(outcome.regrade);
            assert!(outcome.completion.is_none());
            assert!(outcome.progress.unwrap().percentage.is_full());
        }

        assert_eq!(fx.sent(NotificationKind::CourseCompleted), 1);
        assert_eq!(fx.sent(NotificationKind::CertificateIssued), 1);
        assert_eq!(
            fx.store.certificate_for(fx.enrollment_id).unwrap().unwrap(),
            certificate
        );
    }

    #[test]
    fn concurrent_grading_completes_exactly_once() {
        for _ in 0..20 {
            let fx = two_homeworks();
            let submissions = fx.submit_all();
            let engine = Arc::new(fx.engine.clone());
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = submissions
                .iter()
                .map(|s| {
                    let engine = Arc::clone(&engine);
                    let barrier = Arc::clone(&barrier);
                    let request = GradeSubmission {
                        submission_id: s.id,
                        points_earned: 50.0,
                        feedback: Some("Well done.".to_string()),
                        grader: fx.teacher,
                    };
                    thread::spawn(move || {
                        barrier.wait();
                        engine.grading().grade(request)
                    })
                })
                .collect();

            let outcomes: Vec<GradingOutcome> =
                handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();

            assert_eq!(outcomes.iter().filter(|o| o.completed()).count(), 1);
            assert_eq!(fx.sent(NotificationKind::CourseCompleted), 1);
            assert_eq!(fx.sent(NotificationKind::CertificateIssued), 1);

            let enrollment = fx.engine.enrollments().get(fx.enrollment_id).unwrap();
            assert_eq!(enrollment.status(), EnrollmentStatus::Completed);
            assert!(enrollment.completion().is_full());
        }
    }

    #[test]
    fn progress_recompute_is_idempotent() {
        let fx = setup(&[
            (AssignmentType::Homework, 10.0),
            (AssignmentType::Quiz, 10.0),
            (AssignmentType::Exam, 10.0),
        ]);
        let submissions = fx.submit_all();
        fx.grade(&submissions[0], 7.0);

        let first = fx.engine.progress().recompute(fx.enrollment_id).unwrap();
        let second = fx.engine.progress().recompute(fx.enrollment_id).unwrap();
        assert_eq!(first.percentage.value(), 33.33);
        assert_eq!(second.percentage, first.percentage);
        assert!(!second.changed);
        assert_eq!(
            fx.engine.progress().compute(fx.course.id, fx.student).unwrap(),
            first.percentage
        );
    }

    #[test]
    fn unpublished_assignments_do_not_count_towards_progress() {
        let fx = two_homeworks();
        let draft = Assignment::new(
            AssignmentId::new(),
            fx.course.id,
            "Draft",
            AssignmentType::Project,
            100.0,
        )
        .unwrap();
        fx.store.put_assignment(draft).unwrap();

        let outcome = fx.complete();
        assert!(outcome.completed());
    }

    #[test]
    fn certificate_issue_is_idempotent_and_verifiable() {
        let fx = two_homeworks();
        fx.complete();

        let first = fx.engine.certificates().issue(fx.enrollment_id).unwrap();
        let second = fx.engine.certificates().issue(fx.enrollment_id).unwrap();
        assert!(!first.created);
        assert_eq!(first.certificate.certificate_id, second.certificate.certificate_id);
        assert_eq!(first.certificate.verification_code, second.certificate.verification_code);
        assert_ne!(first.certificate.certificate_id, first.certificate.verification_code);

        let by_id = fx.engine.certificates().verify(&first.certificate.certificate_id).unwrap();
        assert!(by_id.valid);
        assert_eq!(by_id.snapshot.unwrap().student_id, fx.student);

        let lowered = first.certificate.verification_code.to_lowercase();
        assert!(fx.engine.certificates().verify(&lowered).unwrap().valid);

        let unknown = fx.engine.certificates().verify("CERT-DOESNOTEXIST").unwrap();
        assert!(!unknown.valid);
        assert!(unknown.snapshot.is_none());
    }

    #[test]
    fn certificate_requires_a_completed_enrollment() {
        let fx = two_homeworks();
        let err = fx.engine.certificates().issue(fx.enrollment_id).unwrap_err();
        match err {
            EngineError::Domain(DomainError::InvalidState(msg)) if msg.contains("grade") => {}
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn identifier_collision_skips_the_certificate_but_keeps_the_grade() {
        let fx = setup_with(
            test_config(),
            &[(AssignmentType::Homework, 10.0)],
            |b| b.codes(Arc::new(FixedCodes)),
        );
        fx.complete();
        assert!(fx.store.certificate_for(fx.enrollment_id).unwrap().is_some());

        let other = UserId::new();
        let requested = fx.engine.enrollments().request(other, fx.course.id).unwrap();
        let other_enrollment = requested.enrollment.id_typed();
        fx.engine.enrollments().approve(other_enrollment, fx.teacher).unwrap();
        let submission = fx
            .engine
            .grading()
            .submit(fx.assignments[0].id, other, None)
            .unwrap();
        let outcome = fx.grade(&submission, 10.0);

        let report = outcome.completion.as_ref().and_then(TriggerOutcome::report).unwrap();
        assert!(report.certificate.is_none());
        assert!(report.warnings.iter().any(|w| w.step == CascadeStep::Certificate));
        assert_eq!(
            fx.engine.enrollments().get(other_enrollment).unwrap().status(),
            EnrollmentStatus::Completed
        );
        assert!(fx.store.grade_for(other_enrollment).unwrap().unwrap().published);
    }

    #[test]
    fn failing_collaborators_only_produce_warnings() {
        let fx = setup_with(
            test_config(),
            &[(AssignmentType::Homework, 10.0)],
            |b| b.renderer(Arc::new(FailingRenderer)).dispatcher(Arc::new(FailingDispatcher)),
        );
        let outcome = fx.complete();

        assert!(outcome.completed());
        assert!(outcome.all_warnings().is_empty(), "{:?}", outcome.all_warnings());

        fx.flush();
        let stats = fx.engine.deliveries().stats();
        assert!(stats.enqueued > 0);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.failed, stats.enqueued);

        let certificate = fx.store.certificate_for(fx.enrollment_id).unwrap().unwrap();
        assert!(!certificate.artifact_available);
        assert!(fx.notifications.sent().is_empty());

        let history = fx
            .engine
            .activity()
            .history(*fx.enrollment_id.as_uuid())
            .unwrap();
        let types: Vec<&str> = history.iter().map(|r| r.event_type()).collect();
        assert!(types.contains(&"delivery.notification_failed"));
        assert!(types.contains(&"delivery.render_failed"));
    }

    #[test]
    fn renderer_output_is_attached_to_the_certificate() {
        let fx = setup_with(
            test_config(),
            &[(AssignmentType::Homework, 10.0)],
            |b| b.renderer(Arc::new(StaticRenderer)),
        );
        fx.complete();
        fx.flush();

        let certificate = fx.store.certificate_for(fx.enrollment_id).unwrap().unwrap();
        assert!(certificate.artifact_available);
        let artifact = fx
            .engine
            .certificates()
            .artifact(&certificate.certificate_id)
            .unwrap()
            .unwrap();
        assert_eq!(artifact, certificate.certificate_id.as_bytes());
    }

    #[test]
    fn resume_fan_out_is_idempotent() {
        let fx = two_homeworks();
        fx.complete();
        let certificate = fx.store.certificate_for(fx.enrollment_id).unwrap().unwrap();
        let skills = fx.engine.career().skills(fx.student).unwrap().len();

        let report = fx.engine.completion().resume_fan_out(fx.enrollment_id).unwrap();
        assert_eq!(report.certificate.unwrap().certificate_id, certificate.certificate_id);
        assert_eq!(fx.engine.career().skills(fx.student).unwrap().len(), skills);
        assert_eq!(fx.sent(NotificationKind::CourseCompleted), 1);
        assert_eq!(fx.sent(NotificationKind::CertificateIssued), 1);
    }

    #[test]
    fn trigger_respects_state_and_progress() {
        let fx = two_homeworks();
        let submissions = fx.submit_all();
        fx.grade(&submissions[0], 50.0);

        let err = fx.engine.completion().trigger(fx.enrollment_id).unwrap_err();
        match err {
            EngineError::Domain(DomainError::InvalidState(msg)) if msg.contains("100%") => {}
            other => panic!("expected InvalidState, got {other:?}"),
        }

        fx.grade(&submissions[1], 50.0);
        match fx.engine.completion().trigger(fx.enrollment_id).unwrap() {
            TriggerOutcome::AlreadyCompleted(e) => assert!(e.is_completed()),
            other => panic!("expected AlreadyCompleted, got {other:?}"),
        }
    }

    #[test]
    fn stale_recommendations_are_removed_when_skills_drop() {
        let fx = two_homeworks();
        let job = JobListing::new("Backend Engineer", "Acme")
            .requires(["Programming", "Algorithms"])
            .prefers(["Data Structures"]);
        fx.store.put_job_listing(job.clone()).unwrap();

        let submissions = fx.submit_all();
        fx.grade(&submissions[0], 50.0);
        fx.grade(&submissions[1], 50.0);

        let recs = fx.engine.career().recommendations(fx.student).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].job_id, job.id);
        assert_eq!(recs[0].match_percentage.value(), 100.0);

        fx.grade(&submissions[0], 5.0);
        fx.grade(&submissions[1], 5.0);
        let republished = fx
            .engine
            .completion()
            .republish_grade(fx.enrollment_id, fx.teacher)
            .unwrap();
        assert_eq!(republished.grade.components.final_score.value(), 10.0);
        assert_eq!(republished.grade.revision, 1);
        assert_eq!(republished.enrollment.letter_grade(), Some(LetterGrade::F));

        let skills = fx.engine.career().skills(fx.student).unwrap();
        assert!(skills.iter().all(|s| s.proficiency == ProficiencyLevel::Beginner));
        assert!(fx.engine.career().recommendations(fx.student).unwrap().is_empty());
        assert_eq!(fx.sent(NotificationKind::CourseCompleted), 1);
    }

    #[test]
    fn only_the_owner_republishes_a_completed_grade() {
        let fx = two_homeworks();
        let err = fx
            .engine
            .completion()
            .republish_grade(fx.enrollment_id, fx.teacher)
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::InvalidState(_))));

        fx.complete();
        let err = fx
            .engine
            .completion()
            .republish_grade(fx.enrollment_id, fx.student)
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Unauthorized(_))));
    }

    #[test]
    fn rating_requires_completion_and_upserts() {
        let fx = two_homeworks();
        let err = fx
            .engine
            .ratings()
            .submit_rating(fx.enrollment_id, fx.student, 5, None)
            .unwrap_err();
        match err {
            EngineError::Domain(DomainError::InvalidState(msg)) if msg.contains("completed") => {}
            other => panic!("expected InvalidState, got {other:?}"),
        }

        fx.complete();

        let first = fx
            .engine
            .ratings()
            .submit_rating(fx.enrollment_id, fx.student, 5, Some("Great course".into()))
            .unwrap();
        assert!(first.created);
        assert_eq!(first.summary.count, 1);
        assert_eq!(first.summary.average, 5.0);

        let second = fx
            .engine
            .ratings()
            .submit_rating(fx.enrollment_id, fx.student, 3, None)
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.rating.id, first.rating.id);
        assert_eq!(second.summary.count, 1);
        assert_eq!(second.summary.average, 3.0);

        let stored = fx.engine.ratings().summary(fx.teacher).unwrap().unwrap();
        assert_eq!(stored, second.summary);

        let err = fx
            .engine
            .ratings()
            .submit_rating(fx.enrollment_id, fx.teacher, 4, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Unauthorized(_))));

        let err = fx
            .engine
            .ratings()
            .submit_rating(fx.enrollment_id, fx.student, 6, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::OutOfRange { .. })));
    }

    #[test]
    fn grading_validates_points_and_ownership() {
        let fx = two_homeworks();
        let submissions = fx.submit_all();

        let too_many = GradeSubmission {
            submission_id: submissions[0].id,
            points_earned: 50.5,
            feedback: None,
            grader: fx.teacher,
        };
        let err = fx.engine.grading().grade(too_many).unwrap_err();
        match err {
            EngineError::Domain(DomainError::OutOfRange { field, .. }) if field == "points_earned" => {}
            other => panic!("expected OutOfRange, got {other:?}"),
        }

        let negative = GradeSubmission {
            submission_id: submissions[0].id,
            points_earned: -1.0,
            feedback: None,
            grader: fx.teacher,
        };
        assert!(fx.engine.grading().grade(negative).is_err());

        let stranger = GradeSubmission {
            submission_id: submissions[0].id,
            points_earned: 10.0,
            feedback: None,
            grader: fx.student,
        };
        let err = fx.engine.grading().grade(stranger).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Unauthorized(_))));

        let stored = fx.store.submission(submissions[0].id).unwrap().unwrap();
        assert!(!stored.is_graded());
    }

    #[test]
    fn submissions_require_an_active_enrollment_and_are_unique() {
        let fx = two_homeworks();
        let assignment = fx.assignments[0].id;
        fx.engine.grading().submit(assignment, fx.student, None).unwrap();

        let err = fx.engine.grading().submit(assignment, fx.student, None).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Conflict(_))));

        let outsider = UserId::new();
        let err = fx.engine.grading().submit(assignment, outsider, None).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::NotFound(_))));
    }

    #[test]
    fn generated_feedback_is_used_when_none_is_given() {
        let generator = Arc::new(CountingGenerator::default());
        let shared = Arc::clone(&generator);
        let fx = setup_with(test_config(), &[(AssignmentType::Quiz, 20.0)], |b| {
            b.feedback(shared)
        });
        let submission = fx.submit_all().remove(0);

        let outcome = fx
            .engine
            .grading()
            .grade(GradeSubmission {
                submission_id: submission.id,
                points_earned: 15.0,
                feedback: None,
                grader: fx.teacher,
            })
            .unwrap();

        let report = outcome.feedback_report.unwrap();
        assert_eq!(report.source, FeedbackSource::Generated);
        assert_eq!(outcome.submission.feedback.as_deref(), Some("Generated for Task 1"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slow_feedback_generator_falls_back_to_rules() {
        let config = test_config().with_collaborator_timeout(Duration::from_millis(20));
        let fx = setup_with(config, &[(AssignmentType::Quiz, 20.0)], |b| {
            b.feedback(Arc::new(SlowGenerator))
        });
        let submission = fx.submit_all().remove(0);

        let outcome = fx
            .engine
            .grading()
            .grade(GradeSubmission {
                submission_id: submission.id,
                points_earned: 19.0,
                feedback: None,
                grader: fx.teacher,
            })
            .unwrap();

        assert_eq!(outcome.feedback_report.unwrap().source, FeedbackSource::RuleBased);
        assert!(outcome.warnings.iter().any(|w| w.step == CascadeStep::Feedback));
        assert!(outcome.submission.feedback.unwrap().starts_with("Excellent work!"));
    }

    #[test]
    fn generator_is_skipped_when_the_course_disables_ai() {
        let generator = Arc::new(CountingGenerator::default());
        let shared = Arc::clone(&generator);
        let fx = setup_with(test_config(), &[(AssignmentType::Quiz, 20.0)], |b| {
            b.feedback(shared)
        });
        fx.store.put_course(fx.course.clone().with_ai_enabled(false)).unwrap();
        let submission = fx.submit_all().remove(0);

        let outcome = fx
            .engine
            .grading()
            .grade(GradeSubmission {
                submission_id: submission.id,
                points_earned: 10.0,
                feedback: None,
                grader: fx.teacher,
            })
            .unwrap();

        assert_eq!(outcome.feedback_report.unwrap().source, FeedbackSource::RuleBased);
        assert!(outcome.warnings.is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn duplicate_enrollment_request_conflicts() {
        let fx = two_homeworks();
        let err = fx.engine.enrollments().request(fx.student, fx.course.id).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Conflict(_))));
    }

    #[test]
    fn requested_event_carries_the_stored_enrollment_id() {
        let fx = two_homeworks();
        let student = UserId::new();
        let requested = fx.engine.enrollments().request(student, fx.course.id).unwrap();
        let id = requested.enrollment.id_typed();

        match requested.events.as_slice() {
            [EnrollmentEvent::Requested { enrollment_id, student_id, .. }] => {
                assert_eq!(*enrollment_id, id);
                assert_eq!(*student_id, student);
            }
            other => panic!("unexpected events: {other:?}"),
        }

        let stored = fx.engine.enrollments().get(id).unwrap();
        assert_eq!(stored.status(), EnrollmentStatus::Pending);
        assert_eq!(stored.student_id(), student);
    }

    #[test]
    fn ai_gate_is_reevaluated_on_every_read() {
        let fx = two_homeworks();
        assert!(fx.engine.enrollments().is_ai_enabled(fx.enrollment_id).unwrap());

        fx.store.put_course(fx.course.clone().with_ai_enabled(false)).unwrap();
        assert!(!fx.engine.enrollments().is_ai_enabled(fx.enrollment_id).unwrap());

        fx.store.put_course(fx.course.clone()).unwrap();
        fx.engine
            .enrollments()
            .suspend(fx.enrollment_id, fx.teacher, Some("absent".into()))
            .unwrap();
        assert!(!fx.engine.enrollments().is_ai_enabled(fx.enrollment_id).unwrap());
    }

    #[test]
    fn rejected_enrollment_cannot_be_approved() {
        let fx = two_homeworks();
        let other = UserId::new();
        let requested = fx.engine.enrollments().request(other, fx.course.id).unwrap();
        let id = requested.enrollment.id_typed();

        let rejected = fx.engine.enrollments().reject(id, fx.teacher, "course full").unwrap();
        assert_eq!(rejected.enrollment.status(), EnrollmentStatus::Rejected);
        assert!(!rejected.enrollment.ai_features_unlocked());
        assert_eq!(fx.sent(NotificationKind::EnrollmentRejected), 1);

        let err = fx.engine.enrollments().approve(id, fx.teacher).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::InvalidState(_))));
    }

    #[test]
    fn activity_log_records_the_enrollment_history() {
        let fx = two_homeworks();
        let subscription = fx.engine.activity().subscribe();
        fx.complete();

        let history = fx
            .engine
            .activity()
            .history(*fx.enrollment_id.as_uuid())
            .unwrap();
        let types: Vec<&str> = history.iter().map(|r| r.event_type()).collect();
        assert_eq!(types.first(), Some(&"enrollment.requested"));
        assert!(types.contains(&"enrollment.approved"));
        assert!(types.contains(&"enrollment.progress_recorded"));
        assert!(types.contains(&"enrollment.completed"));
        assert!(history.windows(2).all(|w| w[0].sequence_number() < w[1].sequence_number()));

        let published: Vec<String> = subscription
            .drain()
            .into_iter()
            .map(|r| r.event_type().to_string())
            .collect();
        assert!(published.iter().any(|t| t == "submission.graded"));
        assert!(published.iter().any(|t| t == "certificate.issued"));
        assert!(published.iter().any(|t| t == "career.skills_updated"));
    }

    #[test]
    fn reinstating_a_fully_graded_enrollment_completes_it() {
        let fx = two_homeworks();
        let submissions = fx.submit_all();
        fx.grade(&submissions[0], 50.0);

        fx.engine
            .enrollments()
            .suspend(fx.enrollment_id, fx.teacher, Some("absent".into()))
            .unwrap();
        let while_suspended = fx.grade(&submissions[1], 40.0);
        assert!(while_suspended.completion.is_none());
        assert!(while_suspended.progress.as_ref().unwrap().percentage.is_full());
        assert!(fx.store.grade_for(fx.enrollment_id).unwrap().is_none());

        let reinstated = fx
            .engine
            .enrollments()
            .reinstate(fx.enrollment_id, fx.teacher)
            .unwrap();
        assert!(reinstated.completed());
        assert!(reinstated.all_warnings().is_empty(), "{:?}", reinstated.all_warnings());
        assert_eq!(reinstated.enrollment.status(), EnrollmentStatus::Completed);
        let report = reinstated.completion.as_ref().and_then(TriggerOutcome::report).unwrap();
        assert_eq!(report.grade.components.final_score.value(), 90.0);
        assert_eq!(report.grade.components.letter, LetterGrade::AMinus);

        let enrollment = fx.engine.enrollments().get(fx.enrollment_id).unwrap();
        assert_eq!(enrollment.status(), EnrollmentStatus::Completed);
        assert!(fx.store.grade_for(fx.enrollment_id).unwrap().unwrap().published);
        assert!(fx.store.certificate_for(fx.enrollment_id).unwrap().is_some());
        assert!(!fx.engine.career().skills(fx.student).unwrap().is_empty());
        assert_eq!(fx.sent(NotificationKind::CourseCompleted), 1);
    }

    #[test]
    fn reinstating_a_partly_graded_enrollment_only_settles_progress() {
        let fx = two_homeworks();
        let submissions = fx.submit_all();
        fx.grade(&submissions[0], 50.0);

        fx.engine
            .enrollments()
            .suspend(fx.enrollment_id, fx.teacher, None)
            .unwrap();
        let reinstated = fx
            .engine
            .enrollments()
            .reinstate(fx.enrollment_id, fx.teacher)
            .unwrap();

        assert!(reinstated.completion.is_none());
        assert_eq!(reinstated.progress.unwrap().percentage.value(), 50.0);
        assert_eq!(reinstated.enrollment.status(), EnrollmentStatus::Active);
    }

    #[test]
    fn hung_dispatcher_never_blocks_grading() {
        let config = EngineConfig::default().with_weighting(WeightingPolicy::RenormalizePopulated);
        let fx = setup_with(
            config,
            &[(AssignmentType::Homework, 50.0), (AssignmentType::Homework, 50.0)],
            |b| b.dispatcher(Arc::new(HangingDispatcher)),
        );
        let submissions = fx.submit_all();

        let started = Instant::now();
        let first = fx.grade(&submissions[0], 50.0);
        let last = fx.grade(&submissions[1], 50.0);
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_secs(1), "grading blocked for {elapsed:?}");
        assert!(first.all_warnings().is_empty(), "{:?}", first.all_warnings());
        assert!(last.completed());
        assert_eq!(
            fx.engine.enrollments().get(fx.enrollment_id).unwrap().status(),
            EnrollmentStatus::Completed
        );
        assert!(fx.engine.deliveries().stats().pending() > 0);
    }

    #[test]
    fn activity_log_outage_is_reported_by_progress_and_career() {
        let fx = two_homeworks();
        let submissions = fx.submit_all();
        fx.grade(&submissions[0], 50.0);

        fx.memory.set_activity_offline(true);
        let last = fx.grade(&submissions[1], 50.0);
        fx.memory.set_activity_offline(false);

        assert!(last.completed());
        let progress = last.progress.as_ref().unwrap();
        assert!(progress.changed);
        assert!(!progress.warnings.is_empty());
        assert!(progress.warnings.iter().all(|w| w.step == CascadeStep::ActivityLog));
        assert!(progress.warnings[0].message.contains("enrollment.progress_recorded"));

        let report = last.completion.as_ref().and_then(TriggerOutcome::report).unwrap();
        let career = report.career.as_ref().unwrap();
        assert!(
            career
                .warnings
                .iter()
                .any(|w| w.message.contains("career.recommendations_recomputed"))
        );

        let surfaced: Vec<&str> = last
            .all_warnings()
            .into_iter()
            .map(|w| w.message.as_str())
            .collect();
        assert!(surfaced.iter().any(|m| m.contains("enrollment.progress_recorded")));
        assert!(surfaced.iter().any(|m| m.contains("career.recommendations_recomputed")));
    }
}
