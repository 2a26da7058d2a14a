//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Rate-limit gate (persisted cooldown shared across processes)
//! - Request coalescer (batched lookups on a fixed tick)
//! - Outbound dispatcher (serialized, gated sends)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters and the host application must implement. This keeps the
//! application layer independent from infrastructure details.

pub mod coalescer;
pub mod config;
pub mod dispatcher;
pub mod gate;
pub mod handle;
pub mod metrics;
pub mod ports;
