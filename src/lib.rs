// Charging priority decisions
pub mod decision;

// Vehicle readings
pub mod vehicle;

// Configuration (file, env, runtime thresholds)
pub mod config;

// OAuth credentials
pub mod credentials;

// Vehicle sources (cloud API, mock)
pub mod sources;

// Reverse geocoding
pub mod geocoding;

// SQLite history
pub mod store;

// WebSocket push
pub mod notify;

// Evaluation cycle
pub mod service;

// Background jobs
pub mod scheduler;

// HTTP and WebSocket APIs
pub mod api;
