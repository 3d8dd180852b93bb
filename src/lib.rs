// ABOUTME: Library root for retail-sync
// ABOUTME: Wires together the ledger, the API clients, and the sync orchestrator

pub mod commands;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod marketing;
pub mod model;
pub mod pos;
pub mod sync;
