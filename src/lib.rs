pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod processo;
pub mod routes;
pub mod schema;
pub mod seed;
pub mod state;
pub mod utils;
pub mod whatsapp;
