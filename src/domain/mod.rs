// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Pure order rules plus the service that applies them against the stores.
// Transport (realtime sessions) and infrastructure (actors, metrics) sit
// outside and depend on this layer, never the other way round.
//
// ============================================================================

pub mod order;
