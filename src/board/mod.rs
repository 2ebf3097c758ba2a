//! Board entities and the card service client.

pub mod client;
pub mod model;

pub use client::{CardFetcher, FetchOptions, TrelloClient, WebhookRegistrar};
pub use model::Card;
