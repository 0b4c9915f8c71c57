//! Connection establishment for one target.
//!
//! A [`ConnectJob`] goes Init -> Resolving -> Connecting -> Connected, or ends
//! in Failure. Resolution runs on a background task that only publishes the
//! candidate list into [`JobShared`]; everything that touches a socket or a
//! delegate happens in [`ConnectJob::poll`], called from the owning pool on
//! the main loop.
//!
//! While connecting, candidates are tried in list order. A new candidate is
//! started immediately when nothing is in flight, and in parallel once
//! `attempt_delay` passed since the last start. The first socket to connect
//! wins; every other socket is closed.

use crate::base::connectstate::{AtomicConnectState, ConnectState};
use crate::base::neterror::NetError;
use crate::dns::{AddressFamily, HostPort, Resolve, ServerAddress, SocketAddrs};
use crate::socket::attempt::{AttemptStatus, ConnectAttempt};
use crate::socket::config::ConnectConfig;
use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Receives the outcome of a connect job.
///
/// Exactly one method is called, once, on the thread that drives
/// [`ConnectJobPool::check_callbacks`](crate::socket::pool::ConnectJobPool::check_callbacks).
/// A killed job calls neither.
pub trait ConnectDelegate {
    /// A socket connected. It is in non-blocking mode.
    fn on_connect(&mut self, stream: TcpStream);

    /// Resolution failed or no candidate could be connected.
    fn on_failure(&mut self, error: NetError);
}

/// What to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    address: ServerAddress,
    bind: Option<SocketAddr>,
    family: AddressFamily,
}

impl ConnectTarget {
    /// Parses a connection string (`host[:port]`, `[v6]:port` or `+CODE`).
    pub fn parse(connection_string: &str, default_port: u16) -> Result<Self, NetError> {
        ServerAddress::parse(connection_string, default_port).map(Self::from)
    }

    pub fn new(host: HostPort) -> Self {
        Self::from(ServerAddress::Direct(host))
    }

    /// Local address every attempted socket is bound to.
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Restrict candidates to one address family.
    pub fn with_family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn bind(&self) -> Option<SocketAddr> {
        self.bind
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }
}

impl From<ServerAddress> for ConnectTarget {
    fn from(address: ServerAddress) -> Self {
        Self {
            address,
            bind: None,
            family: AddressFamily::Any,
        }
    }
}

/// State shared between a job and its resolution task.
///
/// The task sets `resolved` first and then moves the state out of Resolving
/// with a release store, so whoever observes Connecting or Failure also sees
/// the result.
#[derive(Debug, Default)]
pub(crate) struct JobShared {
    state: AtomicConnectState,
    killed: AtomicBool,
    resolved: OnceLock<Result<Vec<SocketAddr>, NetError>>,
}

impl JobShared {
    pub(crate) fn state(&self) -> ConnectState {
        self.state.load()
    }

    pub(crate) fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    pub(crate) fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// Publishes the resolution result; only the first call has an effect.
    pub(crate) fn publish(&self, result: Result<Vec<SocketAddr>, NetError>) {
        let next = if result.is_ok() {
            ConnectState::Connecting
        } else {
            ConnectState::Failure
        };
        if self.resolved.set(result).is_ok() {
            self.state.transition(ConnectState::Resolving, next);
        }
    }
}

/// Cloneable reference to a job owned by a pool.
#[derive(Debug, Clone)]
pub struct ConnectJobHandle {
    id: u64,
    shared: Arc<JobShared>,
}

impl ConnectJobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnectState {
        self.shared.state()
    }

    /// Stops the job. No callback fires afterwards; the pool releases its
    /// sockets on the next poll. Killing twice is harmless.
    pub fn kill(&self) {
        self.shared.kill();
    }

    pub fn is_killed(&self) -> bool {
        self.shared.is_killed()
    }
}

/// How one candidate attempt ended.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// Still in flight.
    Pending,
    Connected,
    Failed(NetError),
    /// Pending for longer than the connect timeout.
    TimedOut,
    /// Closed because another candidate connected first.
    Abandoned,
}

/// One entry of a job's attempt log.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub addr: SocketAddr,
    pub outcome: AttemptOutcome,
}

/// Opens one non-blocking connect: target, bind address, nodelay, start time.
pub(crate) type StartAttempt =
    fn(SocketAddr, Option<SocketAddr>, bool, Instant) -> Result<ConnectAttempt, NetError>;

/// One connection being established. Owned by a
/// [`ConnectJobPool`](crate::socket::pool::ConnectJobPool).
pub struct ConnectJob {
    id: u64,
    target: ConnectTarget,
    attempt_delay: Duration,
    connect_timeout: Duration,
    interleave_families: bool,
    nodelay: bool,
    start_attempt: StartAttempt,
    shared: Arc<JobShared>,
    delegate: Box<dyn ConnectDelegate>,
    task: Option<JoinHandle<()>>,

    candidates: Option<Vec<SocketAddr>>,
    next_candidate: usize,
    pending: Vec<ConnectAttempt>,
    last_attempt: Option<Instant>,
    attempts: Vec<AttemptRecord>,

    coordinated: Option<Result<TcpStream, NetError>>,
    finished: bool,
}

impl ConnectJob {
    pub(crate) fn new(
        id: u64,
        target: ConnectTarget,
        config: &ConnectConfig,
        delegate: Box<dyn ConnectDelegate>,
    ) -> Self {
        Self {
            id,
            target,
            attempt_delay: config.attempt_delay_duration(),
            connect_timeout: config.connect_timeout_duration(),
            interleave_families: config.interleave_families,
            nodelay: config.nodelay,
            start_attempt: ConnectAttempt::start,
            shared: Arc::new(JobShared::default()),
            delegate,
            task: None,
            candidates: None,
            next_candidate: 0,
            pending: Vec::new(),
            last_attempt: None,
            attempts: Vec::new(),
            coordinated: None,
            finished: false,
        }
    }

    pub(crate) fn handle(&self) -> ConnectJobHandle {
        ConnectJobHandle {
            id: self.id,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }

    pub fn state(&self) -> ConnectState {
        self.shared.state()
    }

    /// Every candidate started so far, in start order.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    #[cfg(test)]
    pub(crate) fn set_start_attempt(&mut self, start_attempt: StartAttempt) {
        self.start_attempt = start_attempt;
    }

    pub(crate) fn kill(&self) {
        self.shared.kill();
    }

    pub(crate) fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }

    /// Leaves Init. Literal addresses are published on the spot, hostnames
    /// are resolved on `runtime`, invite codes wait for the coordinator.
    pub(crate) fn start(&mut self, resolver: &Arc<dyn Resolve>, runtime: &Handle) {
        let host = match self.target.address() {
            ServerAddress::InviteCode(code) => {
                tracing::debug!(job = self.id, invite_code = %code, "waiting for coordinator");
                self.shared.state.store(ConnectState::Connecting);
                return;
            }
            ServerAddress::Direct(host) => host.clone(),
        };

        self.shared.state.store(ConnectState::Resolving);
        let family = self.target.family();
        let interleave = self.interleave_families;

        if let Some(literal) = SocketAddrs::try_parse(host.host().as_str(), host.port()) {
            tracing::trace!(job = self.id, host = %host, "literal address, skipping resolver");
            self.shared
                .publish(prepare_candidates(literal, &host, family, interleave));
            return;
        }

        let resolver = Arc::clone(resolver);
        let shared = Arc::clone(&self.shared);
        let job = self.id;
        self.task = Some(runtime.spawn(async move {
            let result = match resolver.resolve(host.host().clone()).await {
                Ok(addrs) => prepare_candidates(addrs.collect(), &host, family, interleave),
                Err(e) => Err(e),
            };
            if shared.is_killed() {
                tracing::trace!(job, "job killed during resolution, result discarded");
            }
            shared.publish(result);
        }));
    }

    /// Hands the coordinator's result to the job; ignored once one was given
    /// or the job is not waiting for one.
    pub(crate) fn complete_coordinated(&mut self, result: Result<TcpStream, NetError>) -> bool {
        let waiting = matches!(self.target.address(), ServerAddress::InviteCode(_))
            && !self.finished
            && !self.shared.is_killed()
            && self.coordinated.is_none();
        if waiting {
            self.coordinated = Some(result);
        }
        waiting
    }

    /// Advances the job; returns true once it can be dropped from the pool.
    pub(crate) fn poll(&mut self, now: Instant) -> bool {
        if self.shared.is_killed() {
            if !self.pending.is_empty() {
                tracing::debug!(job = self.id, sockets = self.pending.len(), "job killed, closing sockets");
                self.pending.clear();
            }
            return true;
        }
        if self.finished {
            return true;
        }

        match self.shared.state() {
            ConnectState::Init | ConnectState::Resolving => false,
            ConnectState::Failure => {
                let error = match self.shared.resolved.get() {
                    Some(Err(e)) => e.clone(),
                    _ => NetError::NameNotResolved,
                };
                self.fail(error);
                true
            }
            ConnectState::Connected => true,
            ConnectState::Connecting => self.poll_connecting(now),
        }
    }

    fn poll_connecting(&mut self, now: Instant) -> bool {
        if matches!(self.target.address(), ServerAddress::InviteCode(_)) {
            return match self.coordinated.take() {
                Some(Ok(stream)) => {
                    self.succeed(stream);
                    true
                }
                Some(Err(e)) => {
                    self.fail(e);
                    true
                }
                None => false,
            };
        }

        if self.candidates.is_none() {
            match self.shared.resolved.get() {
                Some(Ok(addrs)) => {
                    tracing::debug!(job = self.id, candidates = addrs.len(), "resolution complete");
                    self.candidates = Some(addrs.clone());
                }
                _ => {
                    self.fail(NetError::NameNotResolved);
                    return true;
                }
            }
        }

        if let Some(winner) = self.check_pending(now) {
            let stream = winner.into_stream();
            self.succeed(stream);
            return true;
        }

        self.start_attempts(now);

        let exhausted = self
            .candidates
            .as_ref()
            .map_or(true, |c| self.next_candidate >= c.len());
        if exhausted && self.pending.is_empty() {
            tracing::debug!(job = self.id, attempts = self.attempts.len(), "all candidates failed");
            self.fail(NetError::ConnectionFailed);
            return true;
        }
        false
    }

    /// Checks every in-flight socket; returns the first one that connected.
    fn check_pending(&mut self, now: Instant) -> Option<ConnectAttempt> {
        let mut i = 0;
        while i < self.pending.len() {
            let attempt = &self.pending[i];
            match attempt.poll() {
                AttemptStatus::Connected => {
                    let winner = self.pending.remove(i);
                    self.record(winner.addr(), AttemptOutcome::Connected);
                    return Some(winner);
                }
                AttemptStatus::Failed(e) => {
                    let addr = attempt.addr();
                    tracing::debug!(job = self.id, addr = %addr, error = %e, "connect attempt failed");
                    self.pending.remove(i);
                    self.record(addr, AttemptOutcome::Failed(NetError::from_io(&e)));
                }
                AttemptStatus::Pending if attempt.elapsed(now) >= self.connect_timeout => {
                    let addr = attempt.addr();
                    tracing::debug!(job = self.id, addr = %addr, "connect attempt timed out");
                    self.pending.remove(i);
                    self.record(addr, AttemptOutcome::TimedOut);
                }
                AttemptStatus::Pending => i += 1,
            }
        }
        None
    }

    fn start_attempts(&mut self, now: Instant) {
        let Some(candidates) = self.candidates.as_ref() else {
            return;
        };
        while let Some(&addr) = candidates.get(self.next_candidate) {
            let delay_elapsed = self
                .last_attempt
                .map_or(true, |t| now.saturating_duration_since(t) >= self.attempt_delay);
            if !self.pending.is_empty() && !delay_elapsed {
                break;
            }

            self.next_candidate += 1;
            self.last_attempt = Some(now);
            self.attempts.push(AttemptRecord {
                addr,
                outcome: AttemptOutcome::Pending,
            });

            match (self.start_attempt)(addr, self.target.bind(), self.nodelay, now) {
                Ok(attempt) => {
                    tracing::debug!(job = self.id, addr = %addr, "connect attempt started");
                    self.pending.push(attempt);
                }
                Err(e) => {
                    tracing::debug!(job = self.id, addr = %addr, error = %e, "connect attempt failed to start");
                    if let Some(last) = self.attempts.last_mut() {
                        last.outcome = AttemptOutcome::Failed(e);
                    }
                }
            }
        }
    }

    fn record(&mut self, addr: SocketAddr, outcome: AttemptOutcome) {
        if let Some(record) = self
            .attempts
            .iter_mut()
            .find(|r| r.addr == addr && matches!(r.outcome, AttemptOutcome::Pending))
        {
            record.outcome = outcome;
        }
    }

    fn close_pending(&mut self) {
        for attempt in std::mem::take(&mut self.pending) {
            self.record(attempt.addr(), AttemptOutcome::Abandoned);
        }
    }

    fn succeed(&mut self, stream: TcpStream) {
        self.close_pending();
        self.finished = true;
        self.shared.state.store(ConnectState::Connected);
        match stream.peer_addr() {
            Ok(peer) => tracing::info!(job = self.id, peer = %peer, "connected"),
            Err(_) => tracing::info!(job = self.id, "connected"),
        }
        self.delegate.on_connect(stream);
    }

    fn fail(&mut self, error: NetError) {
        self.close_pending();
        self.finished = true;
        self.shared.state.store(ConnectState::Failure);
        tracing::warn!(job = self.id, server = %self.target.address(), error = %error, "connect failed");
        self.delegate.on_failure(error);
    }
}

impl fmt::Debug for ConnectJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectJob")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("state", &self.shared.state())
            .field("pending", &self.pending.len())
            .field("attempts", &self.attempts.len())
            .finish_non_exhaustive()
    }
}

/// Turns resolver output into the ordered candidate list.
pub(crate) fn prepare_candidates(
    addrs: SocketAddrs,
    host: &HostPort,
    family: AddressFamily,
    interleave: bool,
) -> Result<Vec<SocketAddr>, NetError> {
    let mut addrs = addrs
        .with_default_port(host.port())
        .filter_family(family)
        .dedup();
    if interleave {
        addrs = addrs.interleave_families();
    }
    if addrs.is_empty() {
        return Err(NetError::dns_failed(
            host.host().as_str(),
            io::Error::new(io::ErrorKind::NotFound, "no usable addresses"),
        ));
    }
    Ok(addrs.into_vec())
}
