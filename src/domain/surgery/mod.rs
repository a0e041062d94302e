// ============================================================================
// Surgery Domain - Booking lifecycle
// ============================================================================
//
// - Value objects (SurgeryStatus, SurgeryAction)
// - Commands (SurgeryRequest + validation)
// - Aggregate (SurgerySchedule)
// - Command Handler (SchedulingEngine: schedule / start / complete / cancel)
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod aggregate;
pub mod command_handler;

pub use value_objects::*;
pub use commands::*;
pub use aggregate::*;
pub use command_handler::*;
