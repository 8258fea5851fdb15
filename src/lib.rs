pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod entities;
pub mod error;
pub mod fraud;
pub mod gateway;
pub mod geo;
pub mod matching;
pub mod monitor;
pub mod server;
pub mod sweeps;
