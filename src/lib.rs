//! Tombola - raffle storefront backend
//!
//! Sells numbered tickets for raffles, settles payments reported by DataFast,
//! PayPal and Hotmart, and assigns each paid purchase a set of unique random
//! numbers. Includes the admin API, audit log and purchase emails.

pub mod allocator;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod rate_limit;
pub mod util;
