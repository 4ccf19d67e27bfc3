// Library exports for the dog rescue app
// This allows integration tests to drive the router and services directly

pub mod auth;
pub mod config;
pub mod db;
pub mod dogs;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
