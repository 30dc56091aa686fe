// Connection handling module
// Accepts TCP connections and serves each one with the static file dispatcher

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::http::response::{build_405_response, build_500_response, build_options_response, empty_body};
use crate::http::{HeaderSet, ServeBody};
use crate::logger::{self, AccessLogEntry};
use crate::serve::{Events, Outcome, PipeRequest, Reply, Server};

/// Everything a connection task needs, shared by all connections
pub struct ConnectionContext {
    pub server: Server,
    pub download_param: String,
    pub access_log: bool,
    pub access_log_format: String,
    pub keep_alive: bool,
    pub timeout: Duration,
    pub max_connections: Option<u64>,
    pub active: AtomicUsize,
}

impl ConnectionContext {
    pub fn new(server: Server, config: &Config) -> Self {
        Self {
            server,
            download_param: config.serve.download_param.clone(),
            access_log: config.logging.access_log,
            access_log_format: config.logging.access_log_format.clone(),
            keep_alive: config.performance.keep_alive,
            timeout: Duration::from_secs(config.performance.connection_timeout),
            max_connections: config.performance.max_connections,
            active: AtomicUsize::new(0),
        }
    }
}

/// Accept a connection unless the connection limit is reached
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    ctx: &Arc<ConnectionContext>,
) {
    // Increment first, then check, so concurrent accepts cannot both slip under the limit
    let prev_count = ctx.active.fetch_add(1, Ordering::SeqCst);
    if let Some(max_conn) = ctx.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            ctx.active.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    handle_connection(stream, peer_addr, Arc::clone(ctx));
}

/// Serve one connection in its own task, bounded by the connection timeout
fn handle_connection(stream: tokio::net::TcpStream, peer_addr: SocketAddr, ctx: Arc<ConnectionContext>) {
    tokio::task::spawn_local(async move {
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder.keep_alive(ctx.keep_alive);

        let service_ctx = Arc::clone(&ctx);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let ctx = Arc::clone(&service_ctx);
                async move { handle_request(req, &ctx, peer_addr).await }
            }),
        );

        match tokio::time::timeout(ctx.timeout, conn).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => logger::log_warning(&format!(
                "Connection from {peer_addr} timed out after {} seconds",
                ctx.timeout.as_secs()
            )),
        }

        ctx.active.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Map one HTTP request onto the dispatcher. The request body is never read.
async fn handle_request<B>(
    req: Request<B>,
    ctx: &ConnectionContext,
    peer_addr: SocketAddr,
) -> Result<Response<ServeBody>, Infallible> {
    let is_head = match *req.method() {
        Method::GET => false,
        Method::HEAD => true,
        Method::OPTIONS => return Ok(build_options_response()),
        _ => return Ok(build_405_response()),
    };

    let started = Instant::now();
    let raw_path = req.uri().path();
    let path = urlencoding::decode(raw_path).map_or_else(|_| raw_path.to_string(), |p| p.into_owned());
    let query = req.uri().query().map(ToString::to_string);
    let download_name = query
        .as_deref()
        .and_then(|q| query_param(q, &ctx.download_param));

    let mut entry = AccessLogEntry::new(peer_addr.ip().to_string(), req.method().as_str(), path.clone());
    entry.query.clone_from(&query);
    entry.referer = header_string(&req, "referer");
    entry.user_agent = header_string(&req, "user-agent");

    let mut events = Events::new();
    let successes = ctx.access_log.then(|| events.subscribe_successes());

    let request = PipeRequest::new(path, req.headers().clone()).with_download_name(download_name);
    let response = match ctx.server.pipe(request, &events).await {
        Reply::Response(response) => response,
        // Only happens with an error subscriber, which this transport never registers
        Reply::Deferred => build_500_response(),
    };

    let streamed = response.status().is_success() && !is_head;
    let response = if is_head {
        let (parts, _body) = response.into_parts();
        Response::from_parts(parts, empty_body())
    } else {
        response
    };

    if let Some(mut successes) = successes {
        let format = ctx.access_log_format.clone();
        if streamed {
            tokio::spawn(async move {
                let outcome = transfer_outcome(successes.recv().await);
                log_transfer(entry, &outcome, started, &format);
            });
        } else {
            let outcome = Outcome {
                code: response.status(),
                headers: response
                    .headers()
                    .iter()
                    .filter_map(|(n, v)| v.to_str().ok().map(|v| (n.as_str(), v)))
                    .collect(),
                message: String::new(),
            };
            log_transfer(entry, &outcome, started, &format);
        }
    }

    Ok(response)
}

/// Outcome of a streamed transfer. A success channel that closes without a
/// message means the body failed or was dropped before the last byte.
fn transfer_outcome(received: Option<Outcome>) -> Outcome {
    received.unwrap_or_else(|| Outcome {
        code: StatusCode::INTERNAL_SERVER_ERROR,
        headers: HeaderSet::new(),
        message: "transfer aborted".to_string(),
    })
}

fn log_transfer(mut entry: AccessLogEntry, outcome: &Outcome, started: Instant, format: &str) {
    entry.status = outcome.code.as_u16();
    entry.bytes_sent = outcome
        .headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    entry.content_range = outcome.headers.get("content-range").map(ToString::to_string);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    logger::log_access(&entry, format);
}

fn header_string<B>(req: &Request<B>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Decoded value of the first `name=value` pair in a query string
fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| {
            let value = value.replace('+', " ");
            match urlencoding::decode(&value) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => value.clone(),
            }
        })
        .filter(|value| !value.is_empty())
}
