//! fsbroker-core: shared vocabulary for the fsbroker client.
//!
//! Error codes and the error type every crate surfaces, typed file handles,
//! reader configuration, the request parameter codec, and the memory budget
//! traits implemented by `fsbroker-mem`.

pub mod budget;
pub mod config;
pub mod error;
pub mod id;
pub mod prelude;
pub mod serialization;
