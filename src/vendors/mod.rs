//! Vendor adapters
//!
//! One JobClient per external API. Each adapter owns its URL layout and
//! payload normalization; the poller never sees vendor JSON.

pub mod dbt;
pub mod fivetran;

pub use dbt::{DbtClient, DbtConfig};
pub use fivetran::{ConnectorUpdate, FivetranClient, FivetranConfig};
