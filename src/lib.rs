pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod names;
pub mod output;
pub mod query;
pub mod sdc;
pub mod store;
pub mod timefilter;
