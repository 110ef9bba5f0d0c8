//! Lead Outreach Webhook Service Library
//!
//! Core functionality for the outreach demo backend: CRM webhook ingestion
//! with idempotent state reconciliation, AI email generation with a
//! deterministic fallback, CRM write-back through the integration platform,
//! and a read-only state projection for the dashboard.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `crm_client`: Integration platform read/write client.
//! - `email_generator`: Outreach email generation via chat completions.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers (state, trigger-read, health).
//! - `models`: Core data models and dashboard projections.
//! - `store`: In-memory lead/account store and activity feed.
//! - `webhook_handler`: Webhook ingestion and orchestration.
//! - `webhook_models`: Webhook payload models and envelope validation.

pub mod config;
pub mod crm_client;
pub mod email_generator;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod store;
pub mod webhook_handler;
pub mod webhook_models;
