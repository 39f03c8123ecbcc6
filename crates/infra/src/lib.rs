//! Infrastructure layer: persistence, collaborators and the engines that
//! orchestrate enrollment progression.
//!
//! [`ProgressionEngine`] wires every service around one shared
//! [`EngineContext`]:
//!
//! ```text
//! GradingEngine → ProgressTracker → CompletionOrchestrator
//!                                     ├─ CertificateIssuer
//!                                     └─ CareerRecommendationEngine
//!
//! notifications, certificate rendering ──▶ DeliveryQueue ──▶ delivery worker
//! ```

pub mod activity;
pub mod config;
pub mod delivery;
pub mod error;
pub mod notification;
pub mod renderer;
pub mod retry;
pub mod services;
pub mod store;
pub mod timeout;

mod integration_tests;

use std::sync::Arc;

use lyceum_ai::FeedbackGenerator;
use lyceum_career::SkillCatalogue;
use lyceum_credentials::{CertificateCodes, RandomCodes};

use delivery::Deliverer;

pub use lyceum_coursework::WeightingPolicy;

pub use activity::{ActivityBus, ActivityEvent, ActivityLog};
pub use config::EngineConfig;
pub use delivery::{DeliveryQueue, DeliveryStats};
pub use error::{CascadeStep, CascadeWarning, EngineError, EngineResult};
pub use notification::{LogDispatcher, Notification, NotificationDispatcher, NotificationKind, Notifier};
pub use renderer::{CertificateRenderer, RenderError};
pub use retry::{Backoff, RetryPolicy};
pub use services::EngineContext;
pub use services::career::{CareerRecommendationEngine, CareerUpdate, RecommendationRefresh};
pub use services::certificates::{CertificateIssuer, IssuedCertificate};
pub use services::completion::{
    CompletionOrchestrator, CompletionReport, RepublishOutcome, TriggerOutcome,
};
pub use services::enrollment::{EnrollmentService, Transition};
pub use services::grading::{GradeSubmission, GradingEngine, GradingOutcome};
pub use services::progress::{ProgressTracker, ProgressUpdate};
pub use services::rating::{RatingGate, RatingOutcome};
pub use store::{AcademicStore, InMemoryAcademicStore, StoreError};

/// Fully wired engine over one store.
#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    ctx: Arc<EngineContext>,
    enrollments: EnrollmentService,
    progress: ProgressTracker,
    grading: GradingEngine,
    completion: CompletionOrchestrator,
    certificates: CertificateIssuer,
    career: CareerRecommendationEngine,
    ratings: RatingGate,
}

impl ProgressionEngine {
    pub fn builder(store: Arc<dyn AcademicStore>) -> ProgressionEngineBuilder {
        ProgressionEngineBuilder::new(store)
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<dyn AcademicStore> {
        &self.ctx.store
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.ctx.activity
    }

    /// Background notification and rendering queue.
    pub fn deliveries(&self) -> &DeliveryQueue {
        &self.ctx.deliveries
    }

    pub fn enrollments(&self) -> &EnrollmentService {
        &self.enrollments
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn grading(&self) -> &GradingEngine {
        &self.grading
    }

    pub fn completion(&self) -> &CompletionOrchestrator {
        &self.completion
    }

    pub fn certificates(&self) -> &CertificateIssuer {
        &self.certificates
    }

    pub fn career(&self) -> &CareerRecommendationEngine {
        &self.career
    }

    pub fn ratings(&self) -> &RatingGate {
        &self.ratings
    }
}

pub struct ProgressionEngineBuilder {
    store: Arc<dyn AcademicStore>,
    config: EngineConfig,
    dispatcher: Arc<dyn NotificationDispatcher>,
    feedback: Option<Arc<dyn FeedbackGenerator>>,
    renderer: Option<Arc<dyn CertificateRenderer>>,
    codes: Arc<dyn CertificateCodes>,
    catalogue: SkillCatalogue,
}

impl ProgressionEngineBuilder {
    pub fn new(store: Arc<dyn AcademicStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            dispatcher: Arc::new(LogDispatcher),
            feedback: None,
            renderer: None,
            codes: Arc::new(RandomCodes),
            catalogue: SkillCatalogue::default(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn feedback(mut self, generator: Arc<dyn FeedbackGenerator>) -> Self {
        self.feedback = Some(generator);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn CertificateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn codes(mut self, codes: Arc<dyn CertificateCodes>) -> Self {
        self.codes = codes;
        self
    }

    pub fn catalogue(mut self, catalogue: SkillCatalogue) -> Self {
        self.catalogue = catalogue;
        self
    }

    pub fn build(self) -> ProgressionEngine {
        let activity = ActivityLog::new(Arc::clone(&self.store), Arc::new(ActivityBus::new()));
        let notifier = Notifier::new(
            self.dispatcher,
            self.config.notification_retry.clone(),
            self.config.call_guard("notifier"),
        );
        let deliveries = DeliveryQueue::spawn(Deliverer {
            notifier,
            renderer: self.renderer,
            render_calls: self.config.call_guard("renderer"),
            store: Arc::clone(&self.store),
            activity: activity.clone(),
        });
        let ctx = Arc::new(EngineContext {
            store: self.store,
            config: self.config,
            activity,
            deliveries,
        });

        let progress = ProgressTracker::new(Arc::clone(&ctx));
        let certificates = CertificateIssuer::new(Arc::clone(&ctx), self.codes);
        let career = CareerRecommendationEngine::new(Arc::clone(&ctx), Arc::new(self.catalogue));
        let completion = CompletionOrchestrator::new(
            Arc::clone(&ctx),
            progress.clone(),
            certificates.clone(),
            career.clone(),
        );
        let grading = GradingEngine::new(Arc::clone(&ctx), completion.clone(), self.feedback);

        ProgressionEngine {
            enrollments: EnrollmentService::new(Arc::clone(&ctx), completion.clone()),
            ratings: RatingGate::new(Arc::clone(&ctx)),
            progress,
            grading,
            completion,
            certificates,
            career,
            ctx,
        }
    }
}
