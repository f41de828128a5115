//! # Chain History SDK
//!
//! A Rust synchronization layer that tracks finalized chain state and
//! backfills hourly token price history from external APIs into PostgreSQL.
//!
//! ## Overview
//!
//! The SDK separates scheduled data synchronization from the HTTP surface
//! that serves it. It focuses on:
//!
//! - **Safe point tracking**: following the latest block considered final
//!   (chain head minus a confirmation offset)
//! - **Block resolution**: mapping configured target timestamps to block
//!   numbers via a historical lookup service
//! - **Price backfill**: extending hourly USD price history per token from
//!   a price index, with typed change notifications
//! - **Bounded execution**: running every unit of work through a queue with
//!   a concurrency ceiling
//!
//! ## Architecture
//!
//! External API failures never propagate: each synchronizer logs, keeps its
//! previous known-good state, and retries on its next scheduled pass. The
//! persistence layer is upsert-only, so passes are idempotent and safe to
//! overlap across distinct keys.

// Core Types
/// Domain types and hour-granularity timestamp helpers
pub mod types;
/// Shared error taxonomy for the external API clients
pub mod errors;

// Configuration
/// Layered settings (Config.toml + environment overrides)
pub mod settings;

// Persistence
/// PostgreSQL pool construction and idempotent schema creation
pub mod database;
/// Repository traits and their PostgreSQL implementations
pub mod repositories;

// Execution
/// Bounded job queue with FIFO admission
pub mod job_queue;

// External Clients
/// Chain-head oracle over an ethers provider
pub mod chain_client;
/// Historical block lookup via an Etherscan-style explorer
pub mod etherscan;
/// Hourly USD price history via a CoinGecko-style index
pub mod coingecko;

// Synchronizers
/// Finalized chain point tracker
pub mod safe_block_tracker;
/// Target timestamp to block number resolution
pub mod block_number_updater;
/// Per-token hourly price backfill and notifications
pub mod price_updater;
/// Typed publish/subscribe bus for price events
pub mod price_stream;

// Observability
/// Health records and the aggregated status snapshot
pub mod status;
/// Metrics facade (no-op unless the observability feature is enabled)
pub mod metrics;
