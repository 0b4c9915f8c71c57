use crate::base::neterror::NetError;
use crate::dns::{GaiResolver, Resolve};
use crate::socket::config::{ConfigError, ConnectConfig};
use crate::socket::connectjob::{ConnectDelegate, ConnectJob, ConnectJobHandle, ConnectTarget};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::{Handle, Runtime};

/// Owns every live connect job and drives them from the main loop.
///
/// Hostname resolution runs on a tokio runtime, either one owned by the pool
/// or one supplied through [`ConnectJobPoolBuilder::handle`]. Everything else
/// (socket creation, readiness checks, delegate callbacks) happens inside
/// [`check_callbacks`](Self::check_callbacks) on the calling thread.
///
/// Dropping the pool kills every job and waits for outstanding resolutions,
/// like [`kill_all`](Self::kill_all). Neither should be called from inside an
/// async task running on the resolution runtime.
pub struct ConnectJobPool {
    jobs: Vec<ConnectJob>,
    next_id: u64,
    resolver: Arc<dyn Resolve>,
    config: ConnectConfig,
    handle: Handle,
    // Dropped after `handle`, once kill_all has joined the tasks
    _runtime: Option<Runtime>,
}

impl std::fmt::Debug for ConnectJobPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectJobPool")
            .field("jobs", &self.jobs.len())
            .field("next_id", &self.next_id)
            .field("config", &self.config)
            .field("owns_runtime", &self._runtime.is_some())
            .finish()
    }
}

/// Builder for [`ConnectJobPool`].
#[derive(Default)]
pub struct ConnectJobPoolBuilder {
    resolver: Option<Arc<dyn Resolve>>,
    config: ConnectConfig,
    handle: Option<Handle>,
}

impl ConnectJobPoolBuilder {
    /// Resolver for hostnames (default: [`GaiResolver`]).
    pub fn resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(mut self, config: ConnectConfig) -> Self {
        self.config = config;
        self
    }

    /// Run resolutions on an existing runtime instead of a pool-owned one.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn build(self) -> Result<ConnectJobPool, ConfigError> {
        let (handle, runtime) = match self.handle {
            Some(handle) => (handle, None),
            None => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("ticknet-resolver")
                    .enable_all()
                    .build()?;
                (runtime.handle().clone(), Some(runtime))
            }
        };

        Ok(ConnectJobPool {
            jobs: Vec::new(),
            next_id: 1,
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(GaiResolver::new())),
            config: self.config,
            handle,
            _runtime: runtime,
        })
    }
}

impl ConnectJobPool {
    /// Pool with the default resolver and config on its own runtime.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn builder() -> ConnectJobPoolBuilder {
        ConnectJobPoolBuilder::default()
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    /// Number of jobs not yet removed by [`check_callbacks`](Self::check_callbacks).
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// The job behind `handle`, until [`check_callbacks`](Self::check_callbacks)
    /// removes it.
    pub fn job(&self, handle: &ConnectJobHandle) -> Option<&ConnectJob> {
        self.jobs.iter().find(|job| job.id() == handle.id())
    }

    /// Registers a job for `target` and starts resolving it. Never blocks.
    pub fn connect(
        &mut self,
        target: ConnectTarget,
        delegate: impl ConnectDelegate + 'static,
    ) -> ConnectJobHandle {
        let id = self.next_id;
        self.next_id += 1;

        let mut job = ConnectJob::new(id, target, &self.config, Box::new(delegate));
        tracing::debug!(job = id, server = %job.target().address(), "connect job created");
        job.start(&self.resolver, &self.handle);

        let handle = job.handle();
        self.jobs.push(job);
        handle
    }

    /// Parses `connection_string` and calls [`connect`](Self::connect).
    ///
    /// An unparseable string fails here with [`NetError::AddressInvalid`];
    /// no job is created and the delegate is dropped unused.
    pub fn connect_to(
        &mut self,
        connection_string: &str,
        default_port: u16,
        delegate: impl ConnectDelegate + 'static,
    ) -> Result<ConnectJobHandle, NetError> {
        let target = ConnectTarget::parse(connection_string, default_port)?;
        Ok(self.connect(target, delegate))
    }

    /// Polls every job once and drops the ones that finished or were killed.
    ///
    /// Delegate callbacks run from here.
    pub fn check_callbacks(&mut self) {
        let now = Instant::now();
        self.jobs.retain_mut(|job| !job.poll(now));
    }

    /// Kills every job, waits for outstanding resolution tasks and empties
    /// the pool.
    pub fn kill_all(&mut self) {
        let tasks: Vec<_> = self
            .jobs
            .iter_mut()
            .filter_map(|job| {
                job.kill();
                job.take_task()
            })
            .collect();
        let killed = self.jobs.len();
        self.jobs.clear();

        if !tasks.is_empty() {
            tracing::debug!(jobs = killed, tasks = tasks.len(), "waiting for resolution tasks");
            for result in futures::executor::block_on(futures::future::join_all(tasks)) {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "resolution task ended abnormally");
                }
            }
        }
    }

    /// Completes an invite-code job with a socket set up by the coordinator.
    ///
    /// The callback fires on the next [`check_callbacks`](Self::check_callbacks).
    /// Unknown, killed, finished or direct jobs ignore the call and the stream
    /// is closed.
    pub fn set_connected(&mut self, handle: &ConnectJobHandle, stream: TcpStream) {
        self.complete(handle, Ok(stream));
    }

    /// Fails an invite-code job. Same rules as [`set_connected`](Self::set_connected).
    pub fn set_failure(&mut self, handle: &ConnectJobHandle) {
        self.complete(handle, Err(NetError::ConnectionFailed));
    }

    fn complete(&mut self, handle: &ConnectJobHandle, result: Result<TcpStream, NetError>) {
        let accepted = self
            .jobs
            .iter_mut()
            .find(|job| job.id() == handle.id())
            .is_some_and(|job| job.complete_coordinated(result));
        if !accepted {
            tracing::debug!(job = handle.id(), "coordinator result ignored");
        }
    }
}

impl Drop for ConnectJobPool {
    fn drop(&mut self) {
        self.kill_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::connectstate::ConnectState;
    use crate::dns::StaticResolver;
    use crate::socket::attempt::ConnectAttempt;
    use crate::socket::connectjob::AttemptOutcome;
    use std::cell::RefCell;
    use std::net::{SocketAddr, TcpListener};
    use std::rc::Rc;
    use std::thread;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Outcomes(Rc<RefCell<Vec<Result<TcpStream, NetError>>>>);

    impl ConnectDelegate for Outcomes {
        fn on_connect(&mut self, stream: TcpStream) {
            self.0.borrow_mut().push(Ok(stream));
        }

        fn on_failure(&mut self, error: NetError) {
            self.0.borrow_mut().push(Err(error));
        }
    }

    fn run_until_empty(pool: &mut ConnectJobPool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pool.is_empty() {
            assert!(Instant::now() < deadline, "jobs did not finish");
            pool.check_callbacks();
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_pool_debug() {
        let pool = ConnectJobPool::new().unwrap();
        let debug = format!("{pool:?}");
        assert!(debug.contains("ConnectJobPool"));
        assert!(debug.contains("owns_runtime: true"));
    }

    #[test]
    fn test_literal_address_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut pool = ConnectJobPool::new().unwrap();
        let outcomes = Outcomes::default();

        let handle = pool
            .connect_to(&addr.to_string(), 3979, outcomes.clone())
            .unwrap();
        assert_eq!(pool.len(), 1);
        run_until_empty(&mut pool);

        assert_eq!(handle.state(), ConnectState::Connected);
        let results = outcomes.0.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().peer_addr().unwrap(), addr);
    }

    #[test]
    fn test_invalid_string_creates_no_job() {
        let mut pool = ConnectJobPool::new().unwrap();
        let result = pool.connect_to("host:notaport", 3979, Outcomes::default());
        assert!(matches!(result, Err(NetError::AddressInvalid)));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_invite_code_set_failure() {
        let mut pool = ConnectJobPool::new().unwrap();
        let outcomes = Outcomes::default();
        let handle = pool.connect_to("+INVITE", 3979, outcomes.clone()).unwrap();
        assert_eq!(handle.state(), ConnectState::Connecting);

        pool.check_callbacks();
        assert_eq!(pool.len(), 1);
        assert!(outcomes.0.borrow().is_empty());

        pool.set_failure(&handle);
        pool.check_callbacks();
        assert!(pool.is_empty());
        assert!(matches!(
            outcomes.0.borrow().as_slice(),
            [Err(NetError::ConnectionFailed)]
        ));

        // Job is gone; later results are ignored
        pool.set_failure(&handle);
        pool.check_callbacks();
        assert_eq!(outcomes.0.borrow().len(), 1);
    }

    #[test]
    fn test_set_connected_on_direct_job_is_ignored() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let resolver = Arc::new(StaticResolver::new(vec![addr]));
        let mut pool = ConnectJobPool::builder().resolver(resolver).build().unwrap();
        let outcomes = Outcomes::default();

        let handle = pool.connect_to("server.test", 3979, outcomes.clone()).unwrap();
        let extra = TcpStream::connect(addr).unwrap();
        pool.set_connected(&handle, extra);

        run_until_empty(&mut pool);
        let results = outcomes.0.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().peer_addr().unwrap(), addr);
    }

    #[test]
    fn test_job_exposes_attempt_log() {
        let mut pool = ConnectJobPool::builder()
            .config(ConnectConfig::new().attempt_delay(Duration::from_secs(60)))
            .build()
            .unwrap();
        let handle = pool
            .connect_to("192.0.2.1:3979", 3979, Outcomes::default())
            .unwrap();
        pool.jobs[0].set_start_attempt(ConnectAttempt::start_or_stall);

        let job = pool.job(&handle).unwrap();
        assert_eq!(job.id(), handle.id());
        assert_eq!(job.target().address().to_string(), "192.0.2.1:3979");
        assert!(job.attempts().is_empty());

        pool.check_callbacks();
        let attempts = pool.job(&handle).unwrap().attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].addr, "192.0.2.1:3979".parse::<SocketAddr>().unwrap());
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Pending));

        handle.kill();
        pool.check_callbacks();
        assert!(pool.job(&handle).is_none());
    }

    #[test]
    fn test_kill_all_empties_pool() {
        let mut pool = ConnectJobPool::new().unwrap();
        let outcomes = Outcomes::default();
        let first = pool.connect_to("+ONE", 3979, outcomes.clone()).unwrap();
        let second = pool.connect_to("+TWO", 3979, outcomes.clone()).unwrap();

        pool.kill_all();
        assert!(pool.is_empty());
        assert!(first.is_killed() && second.is_killed());
        pool.check_callbacks();
        assert!(outcomes.0.borrow().is_empty());
    }

    #[test]
    fn test_runs_on_caller_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut pool = ConnectJobPool::builder()
            .resolver(Arc::new(StaticResolver::new(vec![addr])))
            .handle(runtime.handle().clone())
            .build()
            .unwrap();
        assert!(format!("{pool:?}").contains("owns_runtime: false"));

        let outcomes = Outcomes::default();
        pool.connect_to("server.test", 3979, outcomes.clone()).unwrap();
        run_until_empty(&mut pool);
        assert!(matches!(outcomes.0.borrow().as_slice(), [Ok(_)]));
    }
}
