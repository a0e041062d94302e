use actix::prelude::*;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use surgery_scheduler::actors::{
    CancelSurgery, CompleteSurgery, ScheduleSurgery, SchedulingActor, StartSurgery,
};
use surgery_scheduler::config::{Config, StoreBackend};
use surgery_scheduler::domain::resources::{NewDoctor, NewPatient, NewTheater, ResourceRegistry};
use surgery_scheduler::domain::surgery::{SchedulingEngine, SurgeryRequest};
use surgery_scheduler::metrics::{self, Metrics};
use surgery_scheduler::store::{EntityStore, InMemoryStore, PgEntityStore};

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Values in .env never override the real environment
    dotenvy::dotenv().ok();

    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,surgery_scheduler=debug"))
        )
        .init();

    tracing::info!("🚀 Starting surgery scheduler demo");

    let config = Config::from_env()?;

    // === 1. Entity store ===
    let store: Arc<dyn EntityStore> = match config.store {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory entity store");
            Arc::new(InMemoryStore::new())
        }
        StoreBackend::Postgres => {
            let store = PgEntityStore::connect(&config.database).await?;
            store.migrate().await?;
            Arc::new(store)
        }
    };

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    if config.metrics.enabled {
        let registry = Arc::new(metrics.registry().clone());
        let store = store.clone();
        let port = config.metrics.port;

        // actix-web gets its own runtime so it never competes with the actor system
        std::thread::spawn(move || match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(async {
                if let Err(e) = metrics::start_metrics_server(registry, store, port).await {
                    tracing::error!(error = %e, "Metrics server error");
                }
            }),
            Err(e) => tracing::error!(error = %e, "Could not start metrics runtime"),
        });
    }

    // === 3. Engine, registry and request actor ===
    let registry = ResourceRegistry::new(store.clone());
    let engine = SchedulingEngine::new(store, config.scheduling.clone());
    let scheduler = SchedulingActor::new(engine, config.schedule_retry.clone())
        .with_metrics(metrics.clone())
        .start();

    // === 4. Seed resources ===
    let theater = registry
        .create_theater(NewTheater {
            name: "Theater A".to_string(),
            floor: 2,
            capacity: 8,
        })
        .await?;
    let doctor = registry
        .create_doctor(NewDoctor {
            name: "Dr. Miranda Bailey".to_string(),
            contact_no: "555-0110".to_string(),
            address: "Surgical Wing".to_string(),
        })
        .await?;
    let patient = registry
        .create_patient(NewPatient {
            name: "George O'Malley".to_string(),
            contact_no: "555-0177".to_string(),
            address: "12 Elm Street".to_string(),
            doctor_id: Some(doctor.id),
            deposit: Decimal::from(500),
        })
        .await?;

    tracing::info!(
        theater_id = %theater.id,
        doctor_id = %doctor.id,
        patient_id = %patient.id,
        deposit = %patient.deposit,
        "Seeded resources"
    );

    let request = SurgeryRequest {
        patient_id: patient.id,
        doctor_id: doctor.id,
        surgery_type: "Appendectomy".to_string(),
        scheduled_at: Utc::now() + Duration::hours(3),
        estimated_duration_minutes: 90,
        deposit_required: Decimal::from(200),
        notes: "Demo booking".to_string(),
    };

    // === 5. Book, then cancel (deposit comes back) ===
    let surgery = scheduler
        .send(ScheduleSurgery {
            request: request.clone(),
        })
        .await??;
    log_balance(&registry, patient.id, "after booking").await?;

    scheduler
        .send(CancelSurgery {
            surgery_id: surgery.id,
        })
        .await??;
    log_balance(&registry, patient.id, "after cancellation").await?;

    // === 6. Book, start and complete (deposit is consumed) ===
    let surgery = scheduler.send(ScheduleSurgery { request: request.clone() }).await??;
    scheduler
        .send(StartSurgery {
            surgery_id: surgery.id,
        })
        .await??;
    let surgery = scheduler
        .send(CompleteSurgery {
            surgery_id: surgery.id,
        })
        .await??;
    tracing::info!(surgery_id = %surgery.id, status = %surgery.status, "✅ Surgery lifecycle finished");
    log_balance(&registry, patient.id, "after completion").await?;

    // === 7. A booking the deposit cannot cover ===
    let expensive = SurgeryRequest {
        deposit_required: Decimal::from(1_000),
        ..request
    };
    match scheduler.send(ScheduleSurgery { request: expensive }).await? {
        Ok(surgery) => tracing::warn!(surgery_id = %surgery.id, "Unexpectedly booked"),
        Err(e) => tracing::info!(error = %e, code = e.code(), "Booking rejected as expected"),
    }

    let theaters = registry.available_theaters().await?;
    tracing::info!(available_theaters = theaters.len(), "🎉 Demo complete!");

    Ok(())
}

async fn log_balance(
    registry: &ResourceRegistry,
    patient_id: surgery_scheduler::domain::resources::PatientId,
    stage: &str,
) -> anyhow::Result<()> {
    if let Some(patient) = registry.get_patient(patient_id).await? {
        tracing::info!(patient_id = %patient.id, deposit = %patient.deposit, stage, "Patient deposit");
    }
    Ok(())
}
