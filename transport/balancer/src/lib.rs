//! Cluster balancer resolver for the realtime messaging client

mod client;
mod config;
pub mod prelude;

pub use client::{parse_balancer_response, HttpBalancer};
pub use config::BalancerConfig;
