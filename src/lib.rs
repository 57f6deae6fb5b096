pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod processor;
pub mod repository;
pub mod retry;
pub mod services;
pub mod telemetry;
pub mod worker;
