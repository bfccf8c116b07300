//! # Concurrent Multi-Server Resolver
//!
//! Resolves one domain name against every server in a caller-supplied list
//! at the same time, so the answers and latencies can be compared side by
//! side. Divergent answers across independent resolvers are the classic
//! symptom of DNS hijacking or cache poisoning; this module only gathers the
//! raw per-server evidence and leaves the comparison to the caller.
//!
//! Each server gets its own task, UDP socket, and freshly encoded query
//! (see [`crate::dns::message`]). Two deadlines bound the batch:
//!
//! - [`READ_TIMEOUT`] (2s) — how long a single task waits for its datagram.
//! - [`BATCH_TIMEOUT`] (5s) — how long [`resolve`] waits overall. Tasks
//!   still running at the batch deadline are aborted and reported as
//!   [`QueryError::Timeout`] in their slot.
//!
//! The result list always has one entry per input server, in input order,
//! regardless of which task finishes first. A server failing never affects
//! its siblings and never fails the batch; a batch where every server failed
//! is still a normal return value.
//!
//! ## Example
//! ```rust,no_run
//! use dnsdiff::dns::resolver::resolve;
//!
//! #[tokio::main]
//! async fn main() {
//!     let servers = vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()];
//!     for result in resolve("example.org", &servers).await {
//!         match &result.outcome {
//!             Ok(ip) => println!("{}: {} ({:?})", result.server, ip, result.elapsed),
//!             Err(e) => println!("{}: {}", result.server, e),
//!         }
//!     }
//! }
//! ```

use std::error::Error;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::dns::message::{DecodeError, DnsQuery, decode_answer};

/// How long a single task waits for a server's response datagram.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How long [`resolve`] waits for the whole batch before abandoning
/// stragglers.
pub const BATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest plain-UDP DNS message; the receive buffer size.
const MAX_DATAGRAM: usize = 512;

/// The outcome of querying one server.
///
/// Produced exactly once per server per batch. `elapsed` measures from task
/// start to decode completion (or to the failure), so it includes socket
/// setup as well as the network round trip.
#[derive(Debug)]
pub struct QueryResult {
    /// The server this result belongs to, exactly as supplied by the caller.
    pub server: String,
    /// Wall-clock duration of this single query.
    pub elapsed: Duration,
    /// The resolved address, or why this server produced none.
    pub outcome: Result<Ipv4Addr, QueryError>,
}

impl QueryResult {
    /// The resolved address, if this server answered.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.outcome.as_ref().ok().copied()
    }
}

/// Ways a single server's query can fail.
///
/// These never escalate to a batch-level failure; they are carried in that
/// server's [`QueryResult`] so the caller can display the reason next to the
/// server address.
#[derive(Debug)]
pub enum QueryError {
    /// The UDP socket to the server could not be opened.
    Dial(std::io::Error),
    /// The query could not be written to the socket.
    Send(std::io::Error),
    /// The read failed before any datagram arrived.
    Read(std::io::Error),
    /// No response within the per-task or batch deadline.
    Timeout,
    /// A datagram arrived but failed validation.
    Decode(DecodeError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Dial(e) => write!(f, "could not open a UDP socket to the server: {}", e),
            QueryError::Send(e) => write!(f, "could not send the query: {}", e),
            QueryError::Read(e) => write!(f, "could not read the response: {}", e),
            QueryError::Timeout => write!(f, "no response before the deadline"),
            QueryError::Decode(e) => write!(f, "{}", e),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            QueryError::Dial(e) | QueryError::Send(e) | QueryError::Read(e) => Some(e),
            QueryError::Decode(e) => Some(e),
            QueryError::Timeout => None,
        }
    }
}

/// Appends the default DNS port to a server address that has none.
///
/// `8.8.8.8` becomes `8.8.8.8:53`, `[2001:4860:4860::8888]` becomes
/// `[2001:4860:4860::8888]:53`, and a bare IPv6 address is bracketed first.
/// Addresses that already carry a port are returned unchanged.
pub fn normalize_server(server: &str) -> String {
    if server.starts_with('[') {
        if server.contains("]:") {
            server.to_string()
        } else {
            format!("{}:53", server)
        }
    } else {
        match server.matches(':').count() {
            0 => format!("{}:53", server),
            1 => server.to_string(),
            _ => format!("[{}]:53", server),
        }
    }
}

/// Queries every server in `servers` for `domain` concurrently and returns
/// one [`QueryResult`] per server, in input order.
///
/// The batch never fails as a whole: per-server failures (unreachable
/// server, timeout, malformed response) land in that server's slot. An
/// empty server list is accepted and yields an empty batch.
///
/// Returns as soon as every task has finished, or at [`BATCH_TIMEOUT`],
/// whichever comes first. Tasks abandoned at the deadline are aborted, which
/// closes their sockets, and their slots carry [`QueryError::Timeout`].
pub async fn resolve(domain: &str, servers: &[String]) -> Vec<QueryResult> {
    resolve_with_deadlines(domain, servers, READ_TIMEOUT, BATCH_TIMEOUT).await
}

/// [`resolve`] with explicit deadlines instead of the crate constants.
async fn resolve_with_deadlines(
    domain: &str,
    servers: &[String],
    read_timeout: Duration,
    batch_timeout: Duration,
) -> Vec<QueryResult> {
    info!(domain, servers = servers.len(), "starting comparison batch");
    let batch_started = Instant::now();
    let deadline = batch_started + batch_timeout;

    let mut handles = Vec::with_capacity(servers.len());
    for server in servers {
        let domain = domain.to_string();
        let server = server.clone();
        let handle =
            tokio::spawn(async move { query_server(&domain, &server, read_timeout).await });
        handles.push(handle);
    }

    // Join in input order. Every handle is awaited against the shared batch
    // deadline; handles that finished while we waited on an earlier slot
    // resolve immediately, so the whole loop is bounded by the deadline.
    let mut results = Vec::with_capacity(servers.len());
    for (server, mut handle) in servers.iter().zip(handles) {
        match timeout_at(deadline, &mut handle).await {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(_)) | Err(_) => {
                handle.abort();
                warn!(server = %server, "batch deadline reached before this server finished");
                // The abandoned task has been running since batch start, so
                // its elapsed time is measured from there, not from when the
                // join loop got around to this slot.
                results.push(QueryResult {
                    server: server.clone(),
                    elapsed: batch_started.elapsed(),
                    outcome: Err(QueryError::Timeout),
                });
            }
        }
    }

    let answered = results.iter().filter(|r| r.outcome.is_ok()).count();
    info!(
        domain,
        answered,
        failed = results.len() - answered,
        "comparison batch finished"
    );
    results
}

/// Runs one server's query and wraps the outcome with its timing.
async fn query_server(domain: &str, server: &str, read_timeout: Duration) -> QueryResult {
    let started = Instant::now();
    let outcome = run_query(domain, server, read_timeout).await;
    let elapsed = started.elapsed();
    if let Err(e) = &outcome {
        warn!(server, error = %e, "query failed");
    }
    QueryResult {
        server: server.to_string(),
        elapsed,
        outcome,
    }
}

/// Sends one A-record query to `server` and decodes the single response
/// datagram. The socket lives only for this call and is released on every
/// exit path.
async fn run_query(
    domain: &str,
    server: &str,
    read_timeout: Duration,
) -> Result<Ipv4Addr, QueryError> {
    let target = normalize_server(server);

    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(s) => s,
        Err(e) => return Err(QueryError::Dial(e)),
    };
    if let Err(e) = socket.connect(&target).await {
        return Err(QueryError::Dial(e));
    }

    let query = DnsQuery::new(domain);
    debug!(server, id = query.id(), "sending A query");
    if let Err(e) = socket.send(query.bytes()).await {
        return Err(QueryError::Send(e));
    }

    let mut buf = [0u8; MAX_DATAGRAM];
    let len = match timeout(read_timeout, socket.recv(&mut buf)).await {
        Ok(Ok(len)) => len,
        Ok(Err(e)) => return Err(QueryError::Read(e)),
        Err(_) => return Err(QueryError::Timeout),
    };
    debug!(server, len, "received response datagram");

    match decode_answer(&buf[..len], query.id()) {
        Ok(ip) => Ok(ip),
        Err(e) => Err(QueryError::Decode(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::message::HEADER_LEN;

    /// What a mock server should do with each query it receives.
    enum MockBehavior {
        /// Reply with a well-formed single-answer response for `ip`,
        /// after waiting `delay`.
        Answer { ip: Ipv4Addr, delay: Duration },
        /// Reply with a well-formed response whose id is corrupted.
        AnswerWrongId { ip: Ipv4Addr },
        /// Receive and never reply.
        Silent,
    }

    /// Binds a mock DNS server on a loopback port and returns its address
    /// in `host:port` form.
    async fn spawn_mock_server(behavior: MockBehavior) -> String {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                match &behavior {
                    MockBehavior::Answer { ip, delay } => {
                        if !delay.is_zero() {
                            tokio::time::sleep(*delay).await;
                        }
                        let response = build_response(&buf[..len], *ip);
                        let _ = socket.send_to(&response, peer).await;
                    }
                    MockBehavior::AnswerWrongId { ip } => {
                        let mut response = build_response(&buf[..len], *ip);
                        response[0] ^= 0xFF;
                        let _ = socket.send_to(&response, peer).await;
                    }
                    MockBehavior::Silent => {}
                }
            }
        });
        format!("127.0.0.1:{}", addr.port())
    }

    fn build_response(query: &[u8], ip: Ipv4Addr) -> Vec<u8> {
        let mut response = Vec::new();
        response.extend_from_slice(&query[0..2]);
        response.extend_from_slice(&[0x81, 0x80]);
        response.extend_from_slice(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
        response.extend_from_slice(&query[HEADER_LEN..]);
        response.extend_from_slice(&[0xC0, 0x0C]);
        response.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        response.extend_from_slice(&[0x00, 0x00, 0x00, 0x3C]);
        response.extend_from_slice(&[0x00, 0x04]);
        response.extend_from_slice(&ip.octets());
        response
    }

    #[test]
    fn test_normalize_server() {
        assert_eq!(normalize_server("8.8.8.8"), "8.8.8.8:53");
        assert_eq!(normalize_server("8.8.8.8:5353"), "8.8.8.8:5353");
        assert_eq!(normalize_server("dns.example"), "dns.example:53");
        assert_eq!(
            normalize_server("2001:4860:4860::8888"),
            "[2001:4860:4860::8888]:53"
        );
        assert_eq!(
            normalize_server("[2001:4860:4860::8888]"),
            "[2001:4860:4860::8888]:53"
        );
        assert_eq!(
            normalize_server("[2001:4860:4860::8888]:5353"),
            "[2001:4860:4860::8888]:5353"
        );
    }

    #[tokio::test]
    async fn test_empty_server_list_yields_empty_batch() {
        let results = resolve("example.org", &[]).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_order_preserved_under_skewed_latency() {
        // The slowest server comes first; completion order is the reverse
        // of input order.
        let servers = vec![
            spawn_mock_server(MockBehavior::Answer {
                ip: Ipv4Addr::new(10, 0, 0, 1),
                delay: Duration::from_millis(300),
            })
            .await,
            spawn_mock_server(MockBehavior::Answer {
                ip: Ipv4Addr::new(10, 0, 0, 2),
                delay: Duration::ZERO,
            })
            .await,
            spawn_mock_server(MockBehavior::Answer {
                ip: Ipv4Addr::new(10, 0, 0, 3),
                delay: Duration::from_millis(100),
            })
            .await,
        ];

        let results = resolve("example.org", &servers).await;

        assert_eq!(results.len(), 3);
        for (result, server) in results.iter().zip(&servers) {
            assert_eq!(&result.server, server);
        }
        assert_eq!(results[0].ip(), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(results[1].ip(), Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(results[2].ip(), Some(Ipv4Addr::new(10, 0, 0, 3)));
    }

    #[tokio::test]
    async fn test_every_slot_holds_its_own_server() {
        // One distinct address per server; each slot must end up with the
        // answer of the server at the same input position.
        let mut servers = Vec::new();
        let mut expected = Vec::new();
        for i in 0..50u8 {
            let ip = Ipv4Addr::new(10, 0, 1, i);
            servers.push(
                spawn_mock_server(MockBehavior::Answer {
                    ip,
                    delay: Duration::from_millis(u64::from(i % 7) * 20),
                })
                .await,
            );
            expected.push(ip);
        }

        let results = resolve("example.org", &servers).await;

        assert_eq!(results.len(), servers.len());
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.server, servers[i]);
            assert_eq!(result.ip(), Some(expected[i]), "slot {} corrupted", i);
        }
    }

    #[tokio::test]
    async fn test_silent_server_times_out_within_deadline() {
        let servers = vec![spawn_mock_server(MockBehavior::Silent).await];

        let started = Instant::now();
        let results = resolve("example.org", &servers).await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].outcome, Err(QueryError::Timeout)));
        assert_eq!(results[0].ip(), None);
        // The per-task read deadline fires at 2s; the batch must be back
        // well before the 5s batch deadline plus scheduling margin.
        assert!(
            elapsed < BATCH_TIMEOUT + Duration::from_millis(500),
            "batch took {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_stragglers_are_aborted_at_the_batch_deadline() {
        // With a read deadline longer than the batch deadline, a silent
        // server keeps its task alive past the batch cutoff, forcing the
        // orchestrator down the abort path for both slots.
        let servers = vec![
            spawn_mock_server(MockBehavior::Silent).await,
            spawn_mock_server(MockBehavior::Silent).await,
        ];
        let read_timeout = Duration::from_secs(10);
        let batch_timeout = Duration::from_millis(300);

        let started = Instant::now();
        let results =
            resolve_with_deadlines("example.org", &servers, read_timeout, batch_timeout).await;
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "batch waited for a straggler: {:?}",
            elapsed
        );
        assert_eq!(results.len(), 2);
        for (result, server) in results.iter().zip(&servers) {
            assert_eq!(&result.server, server);
            assert!(matches!(result.outcome, Err(QueryError::Timeout)));
            // Stragglers have been running since batch start; the second
            // slot's join is instantaneous but its elapsed time must still
            // cover the whole batch, not just its own turn in the loop.
            assert!(
                result.elapsed >= batch_timeout,
                "straggler reported {:?}",
                result.elapsed
            );
        }
    }

    #[tokio::test]
    async fn test_fast_servers_do_not_wait_for_the_deadline() {
        let servers = vec![
            spawn_mock_server(MockBehavior::Answer {
                ip: Ipv4Addr::new(10, 0, 2, 1),
                delay: Duration::ZERO,
            })
            .await,
            spawn_mock_server(MockBehavior::Answer {
                ip: Ipv4Addr::new(10, 0, 2, 2),
                delay: Duration::ZERO,
            })
            .await,
        ];

        let started = Instant::now();
        let results = resolve("example.org", &servers).await;
        let elapsed = started.elapsed();

        assert!(results.iter().all(|r| r.outcome.is_ok()));
        assert!(
            elapsed < Duration::from_secs(1),
            "batch waited out the deadline: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_mismatched_response_id_is_rejected() {
        let servers = vec![
            spawn_mock_server(MockBehavior::AnswerWrongId {
                ip: Ipv4Addr::new(10, 0, 3, 1),
            })
            .await,
        ];

        let results = resolve("example.org", &servers).await;

        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].outcome,
            Err(QueryError::Decode(DecodeError::IdMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_one_dead_server_does_not_poison_the_batch() {
        let servers = vec![
            spawn_mock_server(MockBehavior::Answer {
                ip: Ipv4Addr::new(93, 184, 216, 34),
                delay: Duration::ZERO,
            })
            .await,
            spawn_mock_server(MockBehavior::Answer {
                ip: Ipv4Addr::new(93, 184, 216, 34),
                delay: Duration::from_millis(50),
            })
            .await,
            spawn_mock_server(MockBehavior::Silent).await,
        ];

        let results = resolve("example.org", &servers).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].ip(), Some(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(results[1].ip(), Some(Ipv4Addr::new(93, 184, 216, 34)));
        assert!(results[0].elapsed > Duration::ZERO);
        assert!(results[1].elapsed > Duration::ZERO);
        assert!(results[2].outcome.is_err());
        assert_eq!(results[2].ip(), None);
    }
}
