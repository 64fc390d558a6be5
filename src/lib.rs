pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod persistence;
pub mod reorder;
pub mod services;
pub mod state;
pub mod store;
