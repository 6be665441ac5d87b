pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod id;
pub mod logging;
pub mod models;
pub mod services;
