pub mod auth;
pub mod contract;
pub mod health;
