//! chainetl - Extracts blocks and transactions from a Bitcoin block explorer into SQLite
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Domain
//! - [`model`] - Block, extras, pool and transaction types with validation
//!
//! ## Extraction
//! - [`endpoint`] - Explorer endpoints and API base URL
//! - [`transport`] - HTTP transport seam (reqwest and scripted)
//! - [`retry`] - Bounded retry with exponential backoff
//! - [`client`] - Explorer client
//! - [`pagination`] - Transaction page reassembly
//!
//! ## Storage
//! - [`schema`] - Table definitions
//! - [`persistence`] - Database layer (SQLite)
//!
//! ## Orchestration
//! - [`pipeline`] - One fetch-and-load pass
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Domain
// ============================================================================
pub mod model;

// ============================================================================
// Extraction
// ============================================================================
pub mod client;
pub mod endpoint;
pub mod pagination;
pub mod retry;
pub mod transport;

// ============================================================================
// Storage
// ============================================================================
pub mod persistence;
pub mod schema;

// ============================================================================
// Orchestration
// ============================================================================
pub mod pipeline;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
