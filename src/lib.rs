//! Rategate - Sliding-Window Request Throttling for Axum Services
//!
//! This crate tracks per-identifier access logs over named trailing time
//! windows and turns limiter decisions into HTTP gates: a global per-IP gate
//! applied to every request, a role-aware gate for authenticated endpoints,
//! and a fixed two-window IP gate for sensitive endpoints such as login.
//! Denials become 429 responses with a `Retry-After` hint naming the
//! violated window.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
