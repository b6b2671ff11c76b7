//! Orchestrator integration tests
//!
//! Runs the orchestrator against shell-script stand-ins for the supervised
//! programs and in-memory RPC clients.
#![cfg(unix)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{
    eventually, install_scripts, open_eco, test_config, write_state, FakeInstaller, FakeRpc,
    VERSION,
};
use eco_core::credentials::Purpose;
use eco_daemon::error::DaemonError;
use eco_daemon::feed::ProgressReporter;
use eco_protocol::{EcoState, FeedEvent, Progress, ServiceId, SyncMode};

fn installed(mode: SyncMode) -> EcoState {
    EcoState {
        sync_mode: mode,
        wallet_exists: true,
        version: VERSION.to_string(),
    }
}

#[tokio::test]
async fn test_first_run_is_uninitialized() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cancel = CancellationToken::new();

    let installer = Arc::new(FakeInstaller::new(config.paths()));
    let eco = open_eco(config.clone(), installer.clone(), Arc::default(), &cancel);

    let meta = eco.meta_state().await;
    assert_eq!(meta.eco.sync_mode, SyncMode::Uninitialized);
    assert!(meta.eco.version.is_empty());
    assert!(!meta.eco.wallet_exists);
    assert_eq!(meta.services.len(), ServiceId::ALL.len());
    assert!(meta.services.values().all(|s| !s.on));

    let node_state = eco.node_state().await;
    assert!(!node_state.rpc_user.is_empty());
    assert_ne!(node_state.rpc_user, node_state.rpc_pass);
    drop(eco);

    // Generated credentials survive a restart
    let reopened = open_eco(config, installer, Arc::default(), &cancel);
    assert_eq!(reopened.node_state().await, node_state);
}

#[tokio::test]
async fn test_start_requires_install() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cancel = CancellationToken::new();
    let eco = open_eco(
        config.clone(),
        Arc::new(FakeInstaller::new(config.paths())),
        Arc::default(),
        &cancel,
    );

    assert!(matches!(
        eco.start_service(ServiceId::Decrediton).await,
        Err(DaemonError::NotInitialized)
    ));
    assert!(matches!(
        eco.ctl("getinfo").await,
        Err(DaemonError::NotInitialized)
    ));
    // A failed start leaves the service free
    assert!(!eco.is_running(ServiceId::Decrediton));
}

#[tokio::test]
async fn test_init_preconditions() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cancel = CancellationToken::new();
    let installer = Arc::new(FakeInstaller::new(config.paths()));
    let eco = open_eco(config, installer.clone(), Arc::default(), &cancel);

    let (tx, _rx) = mpsc::unbounded_channel();
    let reporter = ProgressReporter::new("eco", Arc::new(tx));

    assert!(matches!(
        eco.init(7, b"secret", &reporter).await,
        Err(DaemonError::UnknownSyncMode)
    ));
    assert!(matches!(
        eco.init(SyncMode::Uninitialized.as_u8(), b"secret", &reporter).await,
        Err(DaemonError::UnknownSyncMode)
    ));
    assert!(matches!(
        eco.init(SyncMode::Spv.as_u8(), b"", &reporter).await,
        Err(DaemonError::NoPassphrase)
    ));

    // Nothing was installed or committed
    assert_eq!(installer.installs.load(Ordering::SeqCst), 0);
    assert_eq!(eco.eco_state().await, EcoState::default());
}

#[tokio::test]
async fn test_spv_init_starts_wallet() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cancel = CancellationToken::new();
    let rpc = Arc::new(FakeRpc::default());
    let eco = open_eco(
        config.clone(),
        Arc::new(FakeInstaller::new(config.paths())),
        rpc.clone(),
        &cancel,
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
    let reporter = ProgressReporter::new("eco", Arc::new(tx));
    eco.init(SyncMode::Spv.as_u8(), b"hunter2", &reporter)
        .await
        .unwrap();

    let mut reports = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        reports.push(progress);
    }
    let last = reports.last().unwrap();
    assert!(last.err.is_empty());
    assert!(last.is_complete());
    assert_eq!(last.status, "Upgrade complete");
    assert!(reports
        .windows(2)
        .all(|pair| pair[0].progress <= pair[1].progress));

    let state = eco.eco_state().await;
    assert_eq!(state.sync_mode, SyncMode::Spv);
    assert!(state.wallet_exists);
    assert_eq!(state.version, VERSION);

    // The wallet comes up without a node in SPV mode
    let e = &eco;
    eventually("dcrwallet to run", || async move {
        e.meta_state().await.services[&ServiceId::Dcrwallet].on
    })
    .await;
    assert!(!eco.is_running(ServiceId::Dcrd));

    // The unlock secret is dropped once the wallet has loaded
    eventually("unlock secret to clear", || async move {
        !e.credentials().contains(Purpose::WalletUnlock)
    })
    .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let reporter = ProgressReporter::new("eco", Arc::new(tx));
    assert!(matches!(
        eco.init(SyncMode::Full.as_u8(), b"hunter2", &reporter).await,
        Err(DaemonError::AlreadyInitialized)
    ));

    cancel.cancel();
    eco.shutdown().await;
    assert!(rpc.wallet.stops.load(Ordering::SeqCst) >= 1);
    eventually("dcrwallet to stop", || async move {
        !e.meta_state().await.services[&ServiceId::Dcrwallet].on
    })
    .await;
}

#[tokio::test]
async fn test_concurrent_start_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    install_scripts(&config.paths(), VERSION);
    write_state(&config.paths(), &installed(SyncMode::Full));

    let cancel = CancellationToken::new();
    let eco = open_eco(
        config.clone(),
        Arc::new(FakeInstaller::new(config.paths())),
        Arc::default(),
        &cancel,
    );

    let (a, b) = tokio::join!(
        eco.start_service(ServiceId::Dcrd),
        eco.start_service(ServiceId::Dcrd)
    );
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(DaemonError::AlreadyRunning(ServiceId::Dcrd))))
            .count(),
        1
    );

    let e = &eco;
    eventually("dcrd to run", || async move {
        e.meta_state().await.services[&ServiceId::Dcrd].on
    })
    .await;
    assert!(matches!(
        eco.start_service(ServiceId::Dcrd).await,
        Err(DaemonError::AlreadyRunning(ServiceId::Dcrd))
    ));

    cancel.cancel();
    eco.shutdown().await;
}

#[tokio::test]
async fn test_stop_timeout_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    install_scripts(&config.paths(), VERSION);
    write_state(&config.paths(), &installed(SyncMode::Full));

    let cancel = CancellationToken::new();
    let rpc = Arc::new(FakeRpc::default());
    let eco = open_eco(
        config.clone(),
        Arc::new(FakeInstaller::new(config.paths())),
        rpc.clone(),
        &cancel,
    );

    assert!(matches!(
        eco.stop_service(ServiceId::Dexc).await,
        Err(DaemonError::NotRunning(ServiceId::Dexc))
    ));

    eco.start_service(ServiceId::Dcrd).await.unwrap();
    let e = &eco;
    eventually("dcrd to run", || async move {
        e.meta_state().await.services[&ServiceId::Dcrd].on
    })
    .await;

    // The stand-in ignores the stop request, so the process is killed
    assert!(matches!(
        eco.stop_service(ServiceId::Dcrd).await,
        Err(DaemonError::StopTimeout(ServiceId::Dcrd))
    ));
    eventually("dcrd to be released", || async move {
        !e.is_running(ServiceId::Dcrd) && !e.meta_state().await.services[&ServiceId::Dcrd].on
    })
    .await;

    // Stopped services can be started again
    eco.start_service(ServiceId::Dcrd).await.unwrap();
    cancel.cancel();
    eco.shutdown().await;
}

#[tokio::test]
async fn test_spv_refuses_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    install_scripts(&config.paths(), VERSION);
    write_state(&config.paths(), &installed(SyncMode::Spv));

    let cancel = CancellationToken::new();
    let eco = open_eco(
        config.clone(),
        Arc::new(FakeInstaller::new(config.paths())),
        Arc::default(),
        &cancel,
    );

    assert!(matches!(
        eco.start_service(ServiceId::Dexc).await,
        Err(DaemonError::ExchangeSpv)
    ));
    assert!(!eco.is_running(ServiceId::Dexc));
}

#[tokio::test]
async fn test_ctl_falls_back_to_node() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    install_scripts(&config.paths(), VERSION);
    write_state(&config.paths(), &installed(SyncMode::Full));

    let cancel = CancellationToken::new();
    let eco = open_eco(
        config.clone(),
        Arc::new(FakeInstaller::new(config.paths())),
        Arc::default(),
        &cancel,
    );

    assert_eq!(eco.ctl("getbalance").await.unwrap().trim(), "wallet 42");

    let out = eco.ctl("getblockcount").await.unwrap();
    assert!(out.starts_with("node "));
    assert!(out.trim_end().ends_with("getblockcount"));
    assert!(!out.contains("--wallet"));

    match eco.ctl("fail now").await {
        Err(DaemonError::CtlFailed { output, .. }) => {
            assert_eq!(output, "node rejected command");
        }
        other => panic!("expected CtlFailed, got {:?}", other),
    }

    assert!(matches!(eco.ctl("stop").await, Err(DaemonError::NotAllowed)));
    assert!(matches!(eco.ctl("  ").await, Err(DaemonError::NoCommand)));
}

#[tokio::test]
async fn test_crashed_service_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    install_scripts(&config.paths(), VERSION);
    write_state(&config.paths(), &installed(SyncMode::Full));
    let crash = config
        .paths()
        .bundle_dir(VERSION, ServiceId::Dcrd)
        .join("dcrd.crash");
    std::fs::write(&crash, b"").unwrap();

    let cancel = CancellationToken::new();
    let eco = open_eco(
        config.clone(),
        Arc::new(FakeInstaller::new(config.paths())),
        Arc::default(),
        &cancel,
    );
    let mut sub = eco.feed().subscribe();
    eco.start_service(ServiceId::Dcrd).await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let msg = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("dcrd status update")
            .unwrap();
        if let Some(FeedEvent::Status(status)) = msg.event().unwrap() {
            if status.service == ServiceId::Dcrd {
                seen.push(status.on);
            }
        }
    }
    assert_eq!(seen, [true, false, true]);
    // The restart loop keeps the service claimed between runs
    assert!(eco.is_running(ServiceId::Dcrd));
    assert!(matches!(
        eco.start_service(ServiceId::Dcrd).await,
        Err(DaemonError::AlreadyRunning(ServiceId::Dcrd))
    ));

    cancel.cancel();
    eco.shutdown().await;
    let e = &eco;
    eventually("dcrd to be released", || async move {
        !e.is_running(ServiceId::Dcrd)
    })
    .await;
}

#[tokio::test]
async fn test_full_mode_wallet_waits_for_node_sync() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    install_scripts(&config.paths(), VERSION);
    write_state(&config.paths(), &installed(SyncMode::Full));

    let cancel = CancellationToken::new();
    let rpc = Arc::new(FakeRpc::default());
    rpc.node.syncing.store(true, Ordering::SeqCst);
    let eco = open_eco(
        config.clone(),
        Arc::new(FakeInstaller::new(config.paths())),
        rpc.clone(),
        &cancel,
    );

    eco.start_service(ServiceId::Dcrd).await.unwrap();
    eco.start_service(ServiceId::Dcrwallet).await.unwrap();
    let e = &eco;
    eventually("dcrd to run", || async move {
        e.meta_state().await.services[&ServiceId::Dcrd].on
    })
    .await;

    // Several node polls go by while the chain is behind
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!eco.meta_state().await.services[&ServiceId::Dcrwallet].on);
    assert!(eco.is_running(ServiceId::Dcrwallet));

    rpc.node.syncing.store(false, Ordering::SeqCst);
    eventually("dcrwallet to run once dcrd syncs", || async move {
        e.meta_state().await.services[&ServiceId::Dcrwallet].on
    })
    .await;

    cancel.cancel();
    eco.shutdown().await;
}

/// Requests seen by the stand-in exchange web server
#[derive(Default)]
struct ExchangeCalls {
    init: AtomicUsize,
    new_wallet: AtomicUsize,
}

/// Serve a fresh exchange API on a loopback port
async fn serve_exchange(calls: Arc<ExchangeCalls>) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let app = Router::new()
        .route(
            "/api/user",
            get(|| async {
                Json(serde_json::json!({ "inited": false, "authed": false, "assets": {} }))
            }),
        )
        .route(
            "/api/init",
            post(|State(calls): State<Arc<ExchangeCalls>>| async move {
                calls.init.fetch_add(1, Ordering::SeqCst);
                Json(serde_json::json!({ "ok": true }))
            }),
        )
        .route(
            "/api/newwallet",
            post(|State(calls): State<Arc<ExchangeCalls>>| async move {
                calls.new_wallet.fetch_add(1, Ordering::SeqCst);
                Json(serde_json::json!({ "ok": true }))
            }),
        )
        .with_state(calls);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

#[tokio::test]
async fn test_exchange_setup_waits_for_wallet() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    let calls = Arc::new(ExchangeCalls::default());
    config.ports.dex_web = serve_exchange(calls.clone()).await;
    install_scripts(&config.paths(), VERSION);
    write_state(&config.paths(), &installed(SyncMode::Full));

    let cancel = CancellationToken::new();
    let rpc = Arc::new(FakeRpc::default());
    rpc.wallet.loading.store(true, Ordering::SeqCst);
    let eco = open_eco(
        config.clone(),
        Arc::new(FakeInstaller::new(config.paths())),
        rpc.clone(),
        &cancel,
    );
    eco.credentials()
        .store(Purpose::ExchangeInit, b"hunter2")
        .unwrap();

    for svc in [ServiceId::Dcrd, ServiceId::Dcrwallet, ServiceId::Dexc] {
        eco.start_service(svc).await.unwrap();
    }
    let e = &eco;
    eventually("dcrwallet and dexc to run", || async move {
        let services = e.meta_state().await.services;
        services[&ServiceId::Dcrwallet].on && services[&ServiceId::Dexc].on
    })
    .await;

    // Nothing is set up while the wallet is still loading
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(calls.init.load(Ordering::SeqCst), 0);
    assert_eq!(rpc.wallet.accounts_created.load(Ordering::SeqCst), 0);
    assert!(eco.credentials().contains(Purpose::ExchangeInit));

    rpc.wallet.loading.store(false, Ordering::SeqCst);
    eventually("exchange credentials to clear", || async move {
        !e.credentials().contains(Purpose::ExchangeInit)
    })
    .await;
    assert_eq!(calls.init.load(Ordering::SeqCst), 1);
    assert_eq!(calls.new_wallet.load(Ordering::SeqCst), 1);
    assert_eq!(rpc.wallet.accounts_created.load(Ordering::SeqCst), 1);

    cancel.cancel();
    eco.shutdown().await;
}
