pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod links;
pub mod output;
pub mod paths;
pub mod store;
