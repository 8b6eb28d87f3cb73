//! Request layer: one call per protocol command, built on the `shc-proto` codec
//! and `shc-transport` sockets (§4.5).

pub mod request;
pub mod response;
pub mod workitem;

pub use request::Client;
pub use response::IndexEntries;
pub use workitem::WorkItem;
