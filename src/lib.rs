pub mod auth;
pub mod config;
pub mod crm;
pub mod db;
pub mod error;
pub mod messaging;
pub mod models;
pub mod phone;
pub mod poller;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod whatsapp;
