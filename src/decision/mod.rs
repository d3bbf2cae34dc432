// Charge priority decision engine
//
// Pure functions only: no I/O, no shared state. Callers pass a fresh
// EngineConfig on every call.

mod engine;
mod recommendation;

pub use engine::{compare, recommend, recommend_at, recommend_both, EngineConfig};
pub use recommendation::{ChargeAction, DualRecommendation, Priority, Recommendation};

#[cfg(test)]
mod tests;
