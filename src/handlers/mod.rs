pub mod health;
pub mod label;
pub mod metrics_handler;
pub mod push;
pub mod query;
pub mod tail;
