pub mod auction;
pub mod bidding;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod message_broker;
pub mod notifier;
pub mod query;
pub mod round;
