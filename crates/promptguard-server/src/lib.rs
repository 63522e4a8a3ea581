//! Promptguard server library - HTTP delivery surface for the
//! orchestration core.
//!
//! Routing, configuration, logging, and the gateway client live here,
//! separated from main.rs to enable integration testing. No business logic
//! and no prompt material: everything sensitive stays inside
//! promptguard-core.

pub mod config;
pub mod gateway;
pub mod logging;
pub mod routes;
pub mod state;
