//! Request parameters, each framed by the versioned envelope of
//! [`fsbroker_core::serialization::Serializable`].

pub mod debug;
pub mod read;
pub mod seek;

pub use debug::Debug;
pub use read::Read;
pub use seek::Seek;
