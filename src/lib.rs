//! Account workflow and detection client for the spotter dashboard.

pub mod audit;
pub mod avatar;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod detect;
pub mod error;
pub mod model;
pub mod notifications;
pub mod registry;
pub mod session;
pub mod store;
