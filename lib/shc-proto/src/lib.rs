//! Wire codec for the cache protocol: command alphabet, message framing constants,
//! a stateless builder, and a resumable parser, plus the ring-buffered transport
//! plumbing they share.

pub mod builder;
pub mod command;
pub mod message;
pub mod net;
pub mod parser;

pub use builder::build;
pub use command::{Command, ResponseStatus};
pub use message::SigMode;
pub use parser::{Parser, ParserSink, State};
