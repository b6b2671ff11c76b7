//! Service orchestrator
//!
//! [`Eco`] owns every piece of mutable daemon state: the persisted
//! [`EcoState`], per-service on/off status, the node's RPC credentials and
//! the RPC client handles. It decides what runs, in which order, and
//! publishes every change on the [`Feed`].
//!
//! # Locking
//!
//! All shared state sits behind one `RwLock`. Status queries take the read
//! lock, mutations take the write lock, and the lock is never held across
//! network, process or disk I/O.
//!
//! # Exclusivity
//!
//! Each service has a [`RunFlag`]. A start acquires it and hands the guard
//! to the supervising task, which drops it only after the service's final
//! "off" status has been published. A second start while the flag is held
//! fails with [`DaemonError::AlreadyRunning`].
//!
//! # Cancellation
//!
//! Two tokens are involved:
//!
//! - the outer token ends restart loops and sync polling
//! - the process token, which every child process is bound to, is cancelled
//!   only once graceful stops have finished or the shutdown grace has run
//!   out, so stop RPCs still reach running services
//!
//! # Ordering
//!
//! The wallet waits for the node's first full sync (unless in SPV mode),
//! and exchange initialization waits for the wallet to be ready. Both waits
//! are one-shot [`Gate`]s.

mod ctl;
mod exchange;
mod gui;
mod guard;
mod init;
mod node;
mod retry;
mod sync;
mod wallet;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use eco_core::config::{AppPaths, DaemonConfig};
use eco_core::credentials::{generate_rpc_token, CredentialCache, Purpose};
use eco_core::store::keys;
use eco_core::Store;
use eco_protocol::{
    EcoState, MetaState, NodeState, ServiceId, ServiceStatus, SyncMode, UserSettings,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{DaemonError, Result};
use crate::feed::Feed;
use crate::installer::{Install, Installer};
use crate::platform::{self, Platform};
use crate::rpc::{HttpRpcConnector, NodeClient, RpcConnector, RpcEndpoint, WalletClient};
use crate::supervisor::ServiceExe;

pub use ctl::tokenize;
pub use gui::write_default_gui_config;
pub use guard::{Gate, RunFlag, RunGuard};
pub use retry::{should_warn, Backoff};
pub use sync::{wallet_progress, NodeSyncTracker, SyncReport, FULLY_SYNCED};

/// Replaceable collaborators of the orchestrator
pub struct Collaborators {
    pub platform: Arc<dyn Platform>,
    pub installer: Arc<dyn Install>,
    pub rpc: Arc<dyn RpcConnector>,
}

impl Collaborators {
    /// The real platform, release installer and JSON-RPC clients
    pub fn system(config: &DaemonConfig) -> Result<Self> {
        let platform = platform::current()?;
        let installer = Installer::new(config, Arc::clone(&platform))?;
        Ok(Self {
            platform,
            installer: Arc::new(installer),
            rpc: Arc::new(HttpRpcConnector),
        })
    }
}

/// An executable plus the arguments it is started with
#[derive(Debug, Clone)]
struct Launch {
    path: PathBuf,
    args: Vec<String>,
}

impl Launch {
    fn exe(&self, parent: &CancellationToken) -> ServiceExe {
        ServiceExe::new(parent, &self.path, self.args.iter().cloned())
    }
}

struct ServiceFlags {
    dcrd: Arc<RunFlag>,
    dcrwallet: Arc<RunFlag>,
    decrediton: Arc<RunFlag>,
    dexc: Arc<RunFlag>,
}

impl ServiceFlags {
    fn new() -> Self {
        Self {
            dcrd: RunFlag::new(),
            dcrwallet: RunFlag::new(),
            decrediton: RunFlag::new(),
            dexc: RunFlag::new(),
        }
    }

    fn get(&self, svc: ServiceId) -> &Arc<RunFlag> {
        match svc {
            ServiceId::Dcrd => &self.dcrd,
            ServiceId::Dcrwallet => &self.dcrwallet,
            ServiceId::Decrediton => &self.decrediton,
            ServiceId::Dexc => &self.dexc,
        }
    }
}

/// State guarded by the orchestrator lock
struct EcoInner {
    state: EcoState,
    services: BTreeMap<ServiceId, ServiceStatus>,
    node_state: NodeState,
    node: Option<Arc<dyn NodeClient>>,
    wallet: Option<Arc<dyn WalletClient>>,
    /// Live process per service
    exes: HashMap<ServiceId, Arc<ServiceExe>>,
    /// Restart/poll lifetime per service, children of the outer token
    runs: HashMap<ServiceId, CancellationToken>,
}

/// The service orchestrator
pub struct Eco {
    config: DaemonConfig,
    paths: AppPaths,
    store: Store,
    credentials: CredentialCache,
    feed: Arc<Feed>,
    platform: Arc<dyn Platform>,
    installer: Arc<dyn Install>,
    rpc: Arc<dyn RpcConnector>,
    inner: RwLock<EcoInner>,
    flags: ServiceFlags,
    init_flag: Arc<RunFlag>,
    window_flag: Arc<RunFlag>,
    node_synced: Gate,
    wallet_ready: Gate,
    outer: CancellationToken,
    processes: CancellationToken,
}

impl Eco {
    /// Open the orchestrator with the system collaborators
    pub fn open(config: DaemonConfig, cancel: &CancellationToken) -> Result<Arc<Self>> {
        let parts = Collaborators::system(&config)?;
        Self::new(config, parts, cancel)
    }

    /// Load persisted state, creating it on first run
    pub fn new(
        config: DaemonConfig,
        parts: Collaborators,
        cancel: &CancellationToken,
    ) -> Result<Arc<Self>> {
        let paths = config.paths();
        std::fs::create_dir_all(paths.root())?;
        let store = Store::open(paths.db_dir())?;

        let state: EcoState = load_or_create(&store, keys::ECO_STATE, EcoState::default)?;
        let node_state: NodeState = load_or_create(&store, &keys::service(ServiceId::Dcrd), || {
            NodeState {
                user_settings: UserSettings {
                    debug_level: config.debug_level.clone(),
                },
                rpc_user: generate_rpc_token(),
                rpc_pass: generate_rpc_token(),
            }
        })?;
        tracing::info!(
            "Loaded state: mode {}, version {:?}, wallet exists {}",
            state.sync_mode,
            state.version,
            state.wallet_exists
        );

        let services = ServiceId::ALL
            .into_iter()
            .map(|svc| (svc, ServiceStatus { service: svc, on: false }))
            .collect();

        Ok(Arc::new(Self {
            credentials: CredentialCache::new(store.clone()),
            store,
            paths,
            feed: Feed::new(),
            platform: parts.platform,
            installer: parts.installer,
            rpc: parts.rpc,
            inner: RwLock::new(EcoInner {
                state,
                services,
                node_state,
                node: None,
                wallet: None,
                exes: HashMap::new(),
                runs: HashMap::new(),
            }),
            flags: ServiceFlags::new(),
            init_flag: RunFlag::new(),
            window_flag: RunFlag::new(),
            node_synced: Gate::new(),
            wallet_ready: Gate::new(),
            outer: cancel.clone(),
            processes: CancellationToken::new(),
            config,
        }))
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn feed(&self) -> &Arc<Feed> {
        &self.feed
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Outer cancellation token
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.outer
    }

    pub async fn eco_state(&self) -> EcoState {
        self.inner.read().await.state.clone()
    }

    pub async fn meta_state(&self) -> MetaState {
        let inner = self.inner.read().await;
        MetaState {
            eco: inner.state.clone(),
            services: inner.services.clone(),
        }
    }

    pub async fn node_state(&self) -> NodeState {
        self.inner.read().await.node_state.clone()
    }

    /// Whether a supervising task currently holds the service
    pub fn is_running(&self, svc: ServiceId) -> bool {
        self.flags.get(svc).is_held()
    }

    /// Publish current statuses and start whatever the state calls for,
    /// then wait for cancellation and shut down
    pub async fn run(self: &Arc<Self>) {
        let meta = self.meta_state().await;
        for status in meta.services.values() {
            self.feed.publish_status(status);
        }

        if meta.eco.sync_mode == SyncMode::Uninitialized {
            tracing::info!("Waiting for initialization");
        } else {
            self.start_services().await;
        }

        self.outer.cancelled().await;
        self.shutdown().await;
    }

    /// Start the services an initialized install runs
    async fn start_services(self: &Arc<Self>) {
        let mode = self.eco_state().await.sync_mode;
        if mode == SyncMode::Full {
            if let Err(e) = self.start_service(ServiceId::Dcrd).await {
                tracing::error!("Error starting dcrd: {}", e);
            }
        }
        if let Err(e) = self.start_service(ServiceId::Dcrwallet).await {
            tracing::error!("Error starting dcrwallet: {}", e);
        }
        if self.credentials.contains(Purpose::ExchangeInit) {
            if let Err(e) = self.start_service(ServiceId::Dexc).await {
                tracing::error!("Error starting dexc: {}", e);
            }
        }
    }

    /// Start one service
    pub async fn start_service(self: &Arc<Self>, svc: ServiceId) -> Result<()> {
        match svc {
            ServiceId::Dcrd => self.start_node().await,
            ServiceId::Dcrwallet => self.start_wallet().await,
            ServiceId::Decrediton => self.start_gui().await,
            ServiceId::Dexc => self.start_exchange().await,
        }
    }

    /// Stop one service
    ///
    /// The node and wallet get their stop RPC; other services are killed.
    /// If the process has not exited within `stop_timeout` it is killed and
    /// [`DaemonError::StopTimeout`] is returned.
    pub async fn stop_service(&self, svc: ServiceId) -> Result<()> {
        let (exe, run, node, wallet) = {
            let inner = self.inner.read().await;
            (
                inner.exes.get(&svc).cloned(),
                inner.runs.get(&svc).cloned(),
                inner.node.clone(),
                inner.wallet.clone(),
            )
        };

        // No more restarts or polling either way
        if let Some(run) = run {
            run.cancel();
        }
        let exe = match exe {
            Some(exe) if !exe.is_done() => exe,
            _ => return Err(DaemonError::NotRunning(svc)),
        };

        tracing::info!("Stopping {}", svc);
        let requested = match svc {
            ServiceId::Dcrd => match node {
                Some(client) => client.stop().await,
                None => Err(DaemonError::Rpc("no dcrd RPC client".into())),
            },
            ServiceId::Dcrwallet => match wallet {
                Some(client) => client.stop().await,
                None => Err(DaemonError::Rpc("no dcrwallet RPC client".into())),
            },
            ServiceId::Decrediton | ServiceId::Dexc => {
                exe.kill();
                Ok(())
            }
        };
        if let Err(e) = requested {
            tracing::warn!("Error requesting {} shutdown: {}", svc, e);
        }

        if tokio::time::timeout(self.config.stop_timeout, exe.done())
            .await
            .is_err()
        {
            tracing::error!(
                "Timed out waiting for {} to shutdown. Killing the process (pid {:?})",
                svc,
                exe.pid()
            );
            exe.kill();
            return Err(DaemonError::StopTimeout(svc));
        }

        let mut inner = self.inner.write().await;
        match svc {
            ServiceId::Dcrd => inner.node = None,
            ServiceId::Dcrwallet => inner.wallet = None,
            _ => {}
        }
        Ok(())
    }

    /// Stop everything, giving graceful stops up to `shutdown_grace`
    pub async fn shutdown(&self) {
        self.outer.cancel();

        // The wallet depends on the node, so it goes first
        let stops = async {
            for svc in [ServiceId::Dcrwallet, ServiceId::Dcrd] {
                if !self.has_live_process(svc).await {
                    continue;
                }
                if let Err(e) = self.stop_service(svc).await {
                    tracing::warn!("{}", e);
                }
            }
        };
        if tokio::time::timeout(self.config.shutdown_grace, stops)
            .await
            .is_err()
        {
            tracing::warn!(
                "Services still running after {:?}, killing",
                self.config.shutdown_grace
            );
        }

        self.processes.cancel();
        tracing::info!("Orchestrator stopped");
    }

    async fn has_live_process(&self, svc: ServiceId) -> bool {
        self.inner
            .read()
            .await
            .exes
            .get(&svc)
            .is_some_and(|exe| !exe.is_done())
    }

    /// Installed release version, required to start anything
    async fn installed_version(&self) -> Result<String> {
        let version = self.inner.read().await.state.version.clone();
        if version.is_empty() {
            return Err(DaemonError::NotInitialized);
        }
        Ok(version)
    }

    fn exe_path(&self, version: &str, svc: ServiceId) -> PathBuf {
        self.paths
            .bundle_dir(version, svc)
            .join(self.platform.exe_name(svc.as_str()))
    }

    fn node_endpoint(&self, node_state: &NodeState) -> RpcEndpoint {
        RpcEndpoint {
            url: format!("https://localhost:{}", self.config.ports.node_rpc),
            user: node_state.rpc_user.clone(),
            pass: node_state.rpc_pass.clone(),
            cert: self.paths.node_rpc_cert(),
        }
    }

    fn wallet_endpoint(&self, node_state: &NodeState) -> RpcEndpoint {
        RpcEndpoint {
            url: format!("https://localhost:{}", self.config.ports.wallet_rpc),
            user: node_state.rpc_user.clone(),
            pass: node_state.rpc_pass.clone(),
            cert: self.paths.wallet_rpc_cert(),
        }
    }

    async fn set_status(&self, svc: ServiceId, on: bool) {
        let status = ServiceStatus { service: svc, on };
        self.inner.write().await.services.insert(svc, status);
        self.feed.publish_status(&status);
    }

    /// Persist a new eco state and make it current
    async fn commit_state(&self, state: EcoState) -> Result<()> {
        self.store.put(keys::ECO_STATE, &state)?;
        self.inner.write().await.state = state;
        Ok(())
    }

    /// New restart/poll lifetime for a service
    async fn begin_run(&self, svc: ServiceId) -> CancellationToken {
        let run = self.outer.child_token();
        self.inner.write().await.runs.insert(svc, run.clone());
        run
    }

    /// Run a service, restarting it after `restart_delay` until `run` is
    /// cancelled
    ///
    /// Status goes on once the process exists and off when it exits. The
    /// run guard is released last.
    async fn supervise(
        self: Arc<Self>,
        svc: ServiceId,
        guard: RunGuard,
        run: CancellationToken,
        launch: Launch,
        restart: bool,
    ) {
        loop {
            let exe = Arc::new(launch.exe(&self.processes));
            self.inner.write().await.exes.insert(svc, Arc::clone(&exe));

            let handle = Arc::clone(&exe).start();
            tokio::select! {
                biased;
                _ = exe.ready() => self.set_status(svc, true).await,
                _ = exe.done() => {}
            }

            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("{} supervisor task failed: {}", svc, e);
                    Ok(())
                }
            };

            {
                let mut inner = self.inner.write().await;
                if inner.exes.get(&svc).is_some_and(|e| Arc::ptr_eq(e, &exe)) {
                    inner.exes.remove(&svc);
                }
            }
            self.set_status(svc, false).await;

            match result {
                Ok(()) => tracing::info!(service = %svc, "{} exited", svc),
                Err(e) => tracing::error!(service = %svc, "{} exited with error: {}", svc, e),
            }

            if !restart || run.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = run.cancelled() => break,
                _ = tokio::time::sleep(self.config.restart_delay) => {
                    tracing::info!("Restarting {}", svc);
                }
            }
        }
        drop(guard);
    }

    /// Retry `attempt` until it yields a client or `run` is cancelled
    async fn connect<T, F, Fut>(
        &self,
        run: &CancellationToken,
        svc: ServiceId,
        mut attempt: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = Backoff::for_interval(self.config.rpc_retry);
        let mut attempts: u32 = 0;
        loop {
            match attempt().await {
                Ok(client) => {
                    tracing::info!(service = %svc, "Connected to {} RPC", svc);
                    return Some(client);
                }
                Err(e) => {
                    attempts += 1;
                    if should_warn(attempts) {
                        tracing::warn!(
                            service = %svc,
                            "Unable to connect to {} RPC after {} attempts: {}",
                            svc,
                            attempts,
                            e
                        );
                    } else {
                        tracing::debug!(service = %svc, "{} RPC not ready: {}", svc, e);
                    }
                }
            }

            tokio::select! {
                _ = run.cancelled() => return None,
                _ = tokio::time::sleep(backoff.next_delay()) => {}
            }
        }
    }
}

fn load_or_create<T, F>(store: &Store, key: &str, init: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if let Some(value) = store.get(key)? {
        return Ok(value);
    }
    let value = init();
    store.put(key, &value)?;
    tracing::info!("Created new {} record", key);
    Ok(value)
}
