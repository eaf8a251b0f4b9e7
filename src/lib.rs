pub mod api;
pub mod config;
pub mod deck;
pub mod errors;
pub mod gallery;
pub mod generation;
pub mod local;
pub mod logging;
pub mod merge;
pub mod server;
pub mod share;
pub mod store;
pub mod sync;
