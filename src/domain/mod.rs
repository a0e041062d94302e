// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - resources: the rows a booking claims, plus their guarded CRUD path
// - surgery:   the booking aggregate and the scheduling engine
// - errors:    failure taxonomy shared by both
//
// Storage is reached only through `crate::store`.
//
// ============================================================================

pub mod errors;
pub mod resources;
pub mod surgery;
