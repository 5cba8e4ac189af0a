//! Serving configuration: the static base, the published snapshot and its accessor.

mod base;
mod serving;

pub use base::{BaseServerConfig, ClientAuthMode};
pub(crate) use serving::{channel, Publisher};
pub use serving::{ServingConfig, ServingConfigUpdates, ServingSnapshot};
