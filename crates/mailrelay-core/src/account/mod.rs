//! Account management module.
//!
//! Provides the account model and the registry the dispatcher resolves
//! send requests against.

mod model;
mod registry;

pub use model::{AccountConfig, DEFAULT_HOST, Security, SourceAddress};
pub use registry::AccountRegistry;
