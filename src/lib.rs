pub mod api;
pub mod app;
pub mod config;
pub mod duel;
pub mod http_client;
pub mod offline;
pub mod session;
pub mod state;
pub mod ui;
pub mod worker;
