//! User management service.
//!
//! Owns user profile data (role, phone, department) and serves the CRUD API.
//! A user's existence is projected from `user.created` events published by
//! the auth service: the projection consumer applies events idempotently and
//! never treats this service as the authority for identity it does not own.

pub mod config;
pub mod consumer;
pub mod db;
pub mod events;
pub mod jwt;
pub mod models;
pub mod projection;
pub mod routes;
