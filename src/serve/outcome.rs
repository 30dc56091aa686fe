//! Outcome reporting
//!
//! Every request ends in exactly one outcome. When a subscriber is listening
//! for that kind of outcome it receives the value and owns the response;
//! otherwise the server answers by itself.

use hyper::{Response, StatusCode};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::ServeError;
use crate::http::response::build_status_response;
use crate::http::{HeaderSet, ServeBody};
use crate::logger;

/// Result of one request, as published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub code: StatusCode,
    pub headers: HeaderSet,
    pub message: String,
}

impl Outcome {
    pub fn from_error(error: &ServeError, headers: HeaderSet) -> Self {
        Self {
            code: error.status(),
            headers,
            message: error.to_string(),
        }
    }

    pub fn success(code: StatusCode, headers: HeaderSet) -> Self {
        Self {
            code,
            headers,
            message: "OK".to_string(),
        }
    }
}

/// What the transport should do with a request after `pipe` returns
pub enum Reply {
    /// Send this response
    Response(Response<ServeBody>),
    /// An error subscriber took the outcome and will answer
    Deferred,
}

impl Reply {
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred)
    }

    pub fn into_response(self) -> Option<Response<ServeBody>> {
        match self {
            Self::Response(response) => Some(response),
            Self::Deferred => None,
        }
    }
}

/// Optional subscriptions for error and success outcomes.
///
/// A subscription whose receiver was dropped counts as absent, so an error
/// outcome always reaches someone.
#[derive(Debug, Clone, Default)]
pub struct Events {
    error: Option<UnboundedSender<Outcome>>,
    success: Option<UnboundedSender<Outcome>>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_errors(&mut self) -> UnboundedReceiver<Outcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.error = Some(tx);
        rx
    }

    pub fn subscribe_successes(&mut self) -> UnboundedReceiver<Outcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.success = Some(tx);
        rx
    }

    /// Hand an error to its subscriber, giving it back when nobody listens
    pub(crate) fn publish_error(&self, outcome: Outcome) -> Result<(), Outcome> {
        publish(self.error.as_ref(), outcome)
    }

    pub(crate) fn publish_success(&self, outcome: Outcome) -> Result<(), Outcome> {
        publish(self.success.as_ref(), outcome)
    }
}

fn publish(channel: Option<&UnboundedSender<Outcome>>, outcome: Outcome) -> Result<(), Outcome> {
    match channel {
        Some(tx) => tx.send(outcome).map_err(|rejected| rejected.0),
        None => Err(outcome),
    }
}

/// Resolve an error into a reply: defer to the subscriber or write the status line.
pub fn report_error(events: &Events, error: &ServeError, headers: HeaderSet) -> Reply {
    let outcome = Outcome::from_error(error, headers);
    match events.publish_error(outcome) {
        Ok(()) => Reply::Deferred,
        Err(outcome) => {
            log_outcome(&outcome);
            Reply::Response(build_status_response(outcome.code, &outcome.headers))
        }
    }
}

/// Report an error that happened after headers went out.
///
/// Nothing can be written any more, so without a subscriber it is only logged.
pub fn report_stream_failure(events: &Events, error: &ServeError, headers: HeaderSet) {
    if let Err(outcome) = events.publish_error(Outcome::from_error(error, headers)) {
        logger::log_error(&format!("Transfer aborted ({}): {}", outcome.code, outcome.message));
    }
}

/// Report a completed transfer. Without a subscriber there is nothing left to do.
pub fn report_success(events: &Events, code: StatusCode, headers: HeaderSet) {
    let _ = events.publish_success(Outcome::success(code, headers));
}

fn log_outcome(outcome: &Outcome) {
    if outcome.code.is_server_error() {
        logger::log_error(&outcome.message);
    } else if outcome.code.is_client_error() {
        logger::log_debug(&format!("{} {}", outcome.code.as_u16(), outcome.message));
    }
}
