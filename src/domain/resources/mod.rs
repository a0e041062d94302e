// ============================================================================
// Resources Domain - Theaters, doctors and patients
// ============================================================================
//
// - Value objects (row ids, TheaterStatus)
// - Entities (Doctor, Patient, OperatingTheater)
// - Registry (guarded CRUD that shares the engine's row locks)
//
// ============================================================================

pub mod value_objects;
pub mod entities;
pub mod registry;

pub use value_objects::*;
pub use entities::*;
pub use registry::*;
