pub mod auth;
pub mod cleanup;
pub mod configuration;
pub mod cookies;
pub mod email_client;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod validators;
