//! HTTP handlers and routing.

pub mod control;
pub mod jobs;
pub mod monitoring;
pub mod routes;
pub mod schedule;
