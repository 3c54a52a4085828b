//! CVR Sync Server Library
//!
//! Incremental pull sync for Replicache clients. The server keeps a Client
//! View Record per client group and answers each pull with the puts and
//! deletes that bring the client from its last view to the current one.
//!
//! # Modules
//!
//! - `cvr`: the pull engine (registry, diff, patch, orchestrator)
//! - `tables`: the tables this deployment syncs
//! - `routes`: HTTP surface

pub mod actor;
pub mod config;
pub mod cvr;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod tables;

#[cfg(test)]
mod testing;
