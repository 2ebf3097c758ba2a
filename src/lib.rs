//! Board Warden — checks cards on a Trello board against team standards.

pub mod board;
pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod store;
pub mod webhook;
