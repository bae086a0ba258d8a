//! Prelude module for convenient imports
//!
//! ```
//! use realtime_client::prelude::*;
//! ```

pub use crate::client::RealtimeClient;
pub use crate::engine::ConnectionState;
pub use realtime_core::prelude::*;
