/// Persisted entities shared by every storage backend.
pub mod models;
/// Simulation and audit log persistence backends.
pub mod sim_store;
/// Storage abstraction layer for database operations.
pub mod storage;
