pub mod api;
pub mod app;
pub mod clock;
pub mod config;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod settings;
pub mod storage;
pub mod visits;
