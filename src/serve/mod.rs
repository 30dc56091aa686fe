//! Static file serving
//!
//! [`Server::pipe`] takes a request path and its headers and produces either
//! a streamed response or a deferred outcome for a subscriber.

pub mod archive;
pub mod descriptor;
mod dispatcher;
pub mod outcome;
pub mod path_guard;
pub mod streamer;

pub use descriptor::{ResourceDescriptor, ResourceKind};
pub use dispatcher::{PipeRequest, Server};
pub use outcome::{Events, Outcome, Reply};
