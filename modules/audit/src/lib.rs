//! Audit logging service.
//!
//! Subscribes to the user and auth exchanges and appends one log row per
//! received event. The log is derived entirely from events; duplicates are
//! absorbed by the `event_id` unique constraint, so at-least-once delivery
//! never produces a double entry.

pub mod config;
pub mod consumer;
pub mod db;
pub mod events;
pub mod handler;
pub mod models;
pub mod routes;
