//! Control server integration tests
//!
//! Drives a real TLS listener with the client library.
#![cfg(unix)]

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use common::{eventually, install_scripts, open_eco, test_config, write_state, FakeInstaller, VERSION};
use eco_cli::{App, EcoClient};
use eco_core::config::AppPaths;
use eco_core::tls;
use eco_core::NetAddr;
use eco_daemon::{ControlServer, Eco};
use eco_protocol::{EcoState, FeedEvent, Progress, ServiceId, SyncMode};

struct Harness {
    _dir: tempfile::TempDir,
    eco: Arc<Eco>,
    client: EcoClient,
    cancel: CancellationToken,
}

impl Harness {
    /// Serve an orchestrator rooted in a fresh directory on `listen`
    async fn start(listen: impl FnOnce(&Path) -> NetAddr, prepare: impl FnOnce(&AppPaths)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let paths = config.paths();
        prepare(&paths);

        tls::ensure_certificates(&paths.tls()).unwrap();
        let server_tls = tls::server_config(&paths.tls()).unwrap();

        let cancel = CancellationToken::new();
        let eco = open_eco(
            config,
            Arc::new(FakeInstaller::new(paths.clone())),
            Arc::default(),
            &cancel,
        );

        let server = ControlServer::new(Arc::clone(&eco), server_tls, cancel.clone());
        let addr = listen(dir.path());
        let addr_file = paths.addr_file();
        tokio::spawn(async move { server.run(&addr, &addr_file).await });

        let addr_file = paths.addr_file();
        eventually("address file", || {
            let exists = addr_file.exists();
            async move { exists }
        })
        .await;

        let client = EcoClient::from_addr_file(&paths.addr_file(), &paths.tls().ca_cert).unwrap();
        Self {
            _dir: dir,
            eco,
            client,
            cancel,
        }
    }

    async fn unix() -> Self {
        Self::start(|dir| NetAddr::unix(dir.join("eco.sock")), |_| {}).await
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn test_state_over_unix_socket() {
    let h = Harness::unix().await;

    let state = h.client.state().await.unwrap();
    assert_eq!(state, h.eco.meta_state().await);
    assert_eq!(state.eco.sync_mode, SyncMode::Uninitialized);
    assert_eq!(state.services.len(), ServiceId::ALL.len());

    let node = h.client.node_state().await.unwrap().unwrap();
    assert_eq!(node, h.eco.node_state().await);
}

#[tokio::test]
async fn test_state_over_tcp() {
    let h = Harness::start(|_| NetAddr::tcp("127.0.0.1:0"), |_| {}).await;

    // The advertised address carries the bound port
    assert_ne!(h.client.addr().address, "127.0.0.1:0");
    let state = h.client.state().await.unwrap();
    assert!(state.eco.version.is_empty());
}

#[tokio::test]
async fn test_init_failure_is_streamed() {
    let h = Harness::unix().await;

    let mut progress = h.client.init(SyncMode::Spv, b"").await.unwrap();
    let report: Progress = progress.recv().await.unwrap().unwrap();
    assert_eq!(report.service, "eco");
    assert_eq!(report.err, "Password required to initialize wallet");
    // The stream ends after a failure
    assert!(progress.recv().await.is_none());
}

#[tokio::test]
async fn test_init_streams_to_completion() {
    let h = Harness::unix().await;

    let mut progress = h.client.init(SyncMode::Spv, b"hunter2").await.unwrap();
    let mut last = None;
    while let Some(report) = progress.recv().await {
        last = Some(report.unwrap());
    }
    let last = last.unwrap();
    assert!(last.err.is_empty());
    assert!(last.is_complete());

    let state = h.client.state().await.unwrap();
    assert_eq!(state.eco.sync_mode, SyncMode::Spv);
    assert_eq!(state.eco.version, VERSION);
}

#[tokio::test]
async fn test_start_app_errors_are_returned() {
    let h = Harness::unix().await;

    let err = h.client.start_app(App::Decrediton).await.unwrap_err();
    assert_eq!(err.to_string(), "not initialized");

    let err = h.client.ctl("stop").await.unwrap_err();
    assert_eq!(err.to_string(), "method not allowed");
}

#[tokio::test]
async fn test_ctl_passthrough() {
    let h = Harness::start(
        |dir| NetAddr::unix(dir.join("eco.sock")),
        |paths| {
            install_scripts(paths, VERSION);
            write_state(
                paths,
                &EcoState {
                    sync_mode: SyncMode::Full,
                    wallet_exists: true,
                    version: VERSION.to_string(),
                },
            );
        },
    )
    .await;

    let body = h.client.ctl(r#"getbalance "my account""#).await.unwrap();
    assert_eq!(body.trim(), "wallet 42");
}

#[tokio::test]
async fn test_feed_replays_and_streams() {
    let h = Harness::unix().await;
    h.eco
        .feed()
        .publish_progress(&Progress::new("dcrd", "Syncing blockchain at block 10", 0.1));

    let mut events = h.client.feed().await.unwrap();

    // Cached state arrives first
    let mut saw_progress = false;
    while !saw_progress {
        let event = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let FeedEvent::Sync(progress) = event {
            assert_eq!(progress.status, "Syncing blockchain at block 10");
            saw_progress = true;
        }
    }

    let feed = Arc::clone(h.eco.feed());
    eventually("feed subscriber", || {
        let count = feed.subscriber_count();
        async move { count == 1 }
    })
    .await;
    h.eco
        .feed()
        .publish_progress(&Progress::new("dcrd", "Fully synced", 1.0));

    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let FeedEvent::Sync(progress) = event {
            if progress.status == "Fully synced" {
                assert!(progress.is_complete());
                break;
            }
        }
    }

    drop(events);
    eventually("subscriber to leave", || {
        let count = feed.subscriber_count();
        async move { count == 0 }
    })
    .await;
}
