//! Prelude module for convenient imports
//!
//! ```
//! use realtime_balancer::prelude::*;
//!
//! let balancer = HttpBalancer::new(BalancerConfig::default()).unwrap();
//! ```

pub use crate::client::HttpBalancer;
pub use crate::config::BalancerConfig;
