#![deny(clippy::all, clippy::pedantic, clippy::nursery, dead_code)]

pub mod alerts;
pub mod email;
pub mod health;
pub mod server;
pub mod store;
pub mod types;
pub mod worker;
