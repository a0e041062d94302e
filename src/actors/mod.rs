// ============================================================================
// Actors Module
// ============================================================================
//
// Request-handling layer in front of the scheduling engine.
//
// - scheduling_actor - one message per engine operation; applies caller-side
//                      retry and records metrics
//
// Domain rules live in `domain::surgery`; the actor never touches the store.
//
// ============================================================================

mod scheduling_actor;

pub use scheduling_actor::{
    CancelSurgery, CompleteSurgery, ScheduleSurgery, SchedulingActor, StartSurgery,
};
