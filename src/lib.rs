// ============================================================================
// Surgery Scheduler
// ============================================================================
//
// Books an operating theater, a doctor and part of a patient's deposit for a
// surgery in one all-or-nothing transaction, and later completes or cancels
// the booking.
//
// Layers:
// - domain/  - entities, booking aggregate, scheduling engine, registry
// - store/   - entity store contract, lock manager, coordinator, backends
// - actors/  - actix request handling with retry and metrics
// - metrics/ - Prometheus registry and HTTP exposition
//
// ============================================================================

pub mod actors;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod store;
pub mod utils;
