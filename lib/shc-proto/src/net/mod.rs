//! Ring-buffered byte transport plumbing shared by the parser and the request layer.

pub mod buffer;
