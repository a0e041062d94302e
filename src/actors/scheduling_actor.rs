use actix::prelude::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::errors::SchedulingError;
use crate::domain::resources::SurgeryId;
use crate::domain::surgery::{SchedulingEngine, SurgeryRequest, SurgerySchedule};
use crate::metrics::{Metrics, OUTCOME_OK};
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Actor Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Result<SurgerySchedule, SchedulingError>")]
pub struct ScheduleSurgery {
    pub request: SurgeryRequest,
}

#[derive(Message)]
#[rtype(result = "Result<SurgerySchedule, SchedulingError>")]
pub struct StartSurgery {
    pub surgery_id: SurgeryId,
}

#[derive(Message)]
#[rtype(result = "Result<SurgerySchedule, SchedulingError>")]
pub struct CompleteSurgery {
    pub surgery_id: SurgeryId,
}

#[derive(Message)]
#[rtype(result = "Result<SurgerySchedule, SchedulingError>")]
pub struct CancelSurgery {
    pub surgery_id: SurgeryId,
}

// ============================================================================
// Scheduling Actor - Fronts the engine for concurrent callers
// ============================================================================
//
// Handlers return futures, so the actor keeps accepting messages while
// earlier requests wait on row locks. Only `ScheduleSurgery` is retried, and
// only for contention errors.
//
// ============================================================================

pub struct SchedulingActor {
    engine: SchedulingEngine,
    retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl SchedulingActor {
    pub fn new(engine: SchedulingEngine, retry: RetryConfig) -> Self {
        Self {
            engine,
            retry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Actor for SchedulingActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            retry_attempts = self.retry.max_attempts,
            metrics = self.metrics.is_some(),
            "SchedulingActor started"
        );
    }
}

/// Run one engine call and record its outcome
async fn observed<F>(
    metrics: Option<Arc<Metrics>>,
    operation: &'static str,
    call: F,
) -> Result<SurgerySchedule, SchedulingError>
where
    F: Future<Output = Result<SurgerySchedule, SchedulingError>>,
{
    let started = Instant::now();
    let result = call.await;

    if let Err(e) = &result {
        tracing::warn!(operation, error = %e, code = e.code(), "Scheduling operation failed");
    }
    if let Some(metrics) = &metrics {
        let outcome = match &result {
            Ok(_) => OUTCOME_OK,
            Err(e) => e.code(),
        };
        metrics.record_operation(operation, outcome, started.elapsed().as_secs_f64());
    }

    result
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Handler<ScheduleSurgery> for SchedulingActor {
    type Result = ResponseFuture<Result<SurgerySchedule, SchedulingError>>;

    fn handle(&mut self, msg: ScheduleSurgery, _: &mut Self::Context) -> Self::Result {
        let engine = self.engine.clone();
        let retry = self.retry.clone();
        let metrics = self.metrics.clone();
        let request = msg.request;

        Box::pin(async move {
            let retry_metrics = metrics.clone();
            observed(metrics, "schedule", async move {
                retry_on_transient(retry, |attempt| {
                    if attempt > 1 {
                        if let Some(metrics) = &retry_metrics {
                            metrics.record_retry_attempt("schedule");
                        }
                    }
                    let engine = engine.clone();
                    let request = request.clone();
                    async move { engine.schedule(request).await }
                })
                .await
                .into_result()
            })
            .await
        })
    }
}

impl Handler<StartSurgery> for SchedulingActor {
    type Result = ResponseFuture<Result<SurgerySchedule, SchedulingError>>;

    fn handle(&mut self, msg: StartSurgery, _: &mut Self::Context) -> Self::Result {
        let engine = self.engine.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move { observed(metrics, "start", engine.start(msg.surgery_id)).await })
    }
}

impl Handler<CompleteSurgery> for SchedulingActor {
    type Result = ResponseFuture<Result<SurgerySchedule, SchedulingError>>;

    fn handle(&mut self, msg: CompleteSurgery, _: &mut Self::Context) -> Self::Result {
        let engine = self.engine.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move { observed(metrics, "complete", engine.complete(msg.surgery_id)).await })
    }
}

impl Handler<CancelSurgery> for SchedulingActor {
    type Result = ResponseFuture<Result<SurgerySchedule, SchedulingError>>;

    fn handle(&mut self, msg: CancelSurgery, _: &mut Self::Context) -> Self::Result {
        let engine = self.engine.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move { observed(metrics, "cancel", engine.cancel(msg.surgery_id)).await })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ResourceKind;
    use crate::domain::resources::{
        DoctorPatch, NewDoctor, NewPatient, NewTheater, ResourceRegistry, TheaterPatch,
        TheaterStatus,
    };
    use crate::domain::surgery::{SchedulingConfig, SurgeryStatus};
    use crate::store::InMemoryStore;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    struct Setup {
        registry: ResourceRegistry,
        engine: SchedulingEngine,
        request: SurgeryRequest,
    }

    async fn setup() -> Setup {
        let store = Arc::new(InMemoryStore::new());
        let registry = ResourceRegistry::new(store.clone());
        let engine = SchedulingEngine::new(store, SchedulingConfig::default());

        registry
            .create_theater(NewTheater {
                name: "OT-1".to_string(),
                floor: 1,
                capacity: 4,
            })
            .await
            .unwrap();
        let doctor = registry
            .create_doctor(NewDoctor {
                name: "Dr. Robbins".to_string(),
                contact_no: String::new(),
                address: String::new(),
            })
            .await
            .unwrap();
        let patient = registry
            .create_patient(NewPatient {
                name: "Sofia".to_string(),
                contact_no: String::new(),
                address: String::new(),
                doctor_id: Some(doctor.id),
                deposit: Decimal::from(500),
            })
            .await
            .unwrap();

        let request = SurgeryRequest {
            patient_id: patient.id,
            doctor_id: doctor.id,
            surgery_type: "Tonsillectomy".to_string(),
            scheduled_at: Utc::now() + Duration::hours(1),
            estimated_duration_minutes: 40,
            deposit_required: Decimal::from(120),
            notes: String::new(),
        };

        Setup {
            registry,
            engine,
            request,
        }
    }

    #[actix::test]
    async fn test_lifecycle_through_actor_records_metrics() {
        let setup = setup().await;
        let metrics = Arc::new(Metrics::new().unwrap());
        let actor = SchedulingActor::new(setup.engine, RetryConfig::no_retry())
            .with_metrics(metrics.clone())
            .start();

        let surgery = actor
            .send(ScheduleSurgery {
                request: setup.request.clone(),
            })
            .await
            .unwrap()
            .unwrap();
        let started = actor
            .send(StartSurgery { surgery_id: surgery.id })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(started.status, SurgeryStatus::InProgress);

        let rejected = actor
            .send(CancelSurgery { surgery_id: surgery.id })
            .await
            .unwrap();
        assert!(matches!(rejected, Err(SchedulingError::InvalidTransition { .. })));

        let completed = actor
            .send(CompleteSurgery { surgery_id: surgery.id })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, SurgeryStatus::Completed);

        let ok = |op: &str| metrics.operations_total.with_label_values(&[op, OUTCOME_OK]).get();
        assert_eq!(ok("schedule"), 1);
        assert_eq!(ok("start"), 1);
        assert_eq!(ok("complete"), 1);
        assert_eq!(
            metrics
                .operations_total
                .with_label_values(&["cancel", "invalid_transition"])
                .get(),
            1
        );
    }

    #[actix::test]
    async fn test_schedule_without_retry_surfaces_contention() {
        let setup = setup().await;
        let theater = setup.registry.list_theaters().await.unwrap().remove(0);
        setup
            .registry
            .update_theater(
                theater.id,
                TheaterPatch {
                    status: Some(TheaterStatus::Maintenance),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let actor = SchedulingActor::new(setup.engine, RetryConfig::no_retry()).start();
        let result = actor
            .send(ScheduleSurgery {
                request: setup.request,
            })
            .await
            .unwrap();

        assert!(matches!(
            result,
            Err(SchedulingError::NoResourceAvailable(ResourceKind::OperatingTheater))
        ));
    }

    #[actix::test]
    async fn test_schedule_retries_until_theater_frees_up() {
        let setup = setup().await;
        let theater = setup.registry.list_theaters().await.unwrap().remove(0);
        setup
            .registry
            .update_theater(
                theater.id,
                TheaterPatch {
                    status: Some(TheaterStatus::Maintenance),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let metrics = Arc::new(Metrics::new().unwrap());
        let retry = RetryConfig {
            max_attempts: 10,
            initial_delay: std::time::Duration::from_millis(20),
            max_delay: std::time::Duration::from_millis(50),
            multiplier: 2.0,
        };
        let actor = SchedulingActor::new(setup.engine, retry)
            .with_metrics(metrics.clone())
            .start();

        let pending = actor.send(ScheduleSurgery {
            request: setup.request,
        });

        let registry = setup.registry.clone();
        actix::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(60)).await;
            registry
                .update_theater(
                    theater.id,
                    TheaterPatch {
                        status: Some(TheaterStatus::Available),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        });

        let surgery = pending.await.unwrap().unwrap();
        assert_eq!(surgery.operating_theater_id, theater.id);
        assert!(metrics.retry_attempts_total.with_label_values(&["schedule"]).get() >= 1);

        // Profile edits never free a booked doctor
        let doctor = setup
            .registry
            .update_doctor(surgery.doctor_id, DoctorPatch::default())
            .await
            .unwrap();
        assert!(!doctor.is_available);
    }
}
