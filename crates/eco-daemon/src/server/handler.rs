//! Per-connection request handling
//!
//! Every connection carries exactly one request. The first frame names the
//! route; after it the connection switches to route-less packets for the
//! response, or for the stream of updates on `init` and `sync`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use eco_protocol::{
    decode, encode, CtlRequest, CtlResponse, ErrorReply, InitRequest, PacketCodec, Progress,
    RequestCodec, Route, ServiceId, StateRequest, StateResponse,
};

use crate::error::Result;
use crate::feed::ProgressReporter;
use crate::orchestrator::Eco;

/// Service name on progress reports streamed back from `init`
pub const INIT_SERVICE: &str = "eco";

type Packets<S> = Framed<S, PacketCodec>;

/// Serve one client connection
///
/// Returns when the request has been answered, the client goes away or
/// `cancel` fires. A connection that sends nothing within
/// `request_timeout`, or names an unknown route, is dropped.
pub async fn serve<S>(
    eco: Arc<Eco>,
    stream: S,
    request_timeout: Duration,
    cancel: CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut requests = Framed::new(stream, RequestCodec::new());
    let frame = match tokio::time::timeout(request_timeout, requests.next()).await {
        Ok(Some(frame)) => frame?,
        Ok(None) => return Ok(()),
        Err(_) => {
            tracing::debug!("No request within {:?}, dropping connection", request_timeout);
            return Ok(());
        }
    };

    let route: Route = match frame.route.parse() {
        Ok(route) => route,
        Err(e) => {
            tracing::warn!("Dropping connection: {}", e);
            return Ok(());
        }
    };
    tracing::debug!("Request for route {}", route);

    // Bytes already buffered past the request stay with the new codec
    let mut packets = requests.map_codec(|_| PacketCodec::new());
    let payload = frame.payload;

    match route {
        Route::ServiceStatus => {
            let request: StateRequest = decode(&payload)?;
            let state = match request.service.as_str() {
                "eco" => encode(&eco.meta_state().await)?.to_vec(),
                "dcrd" => encode(&eco.node_state().await)?.to_vec(),
                _ => Vec::new(),
            };
            packets.send(encode(&StateResponse { state })?).await?;
        }
        Route::Init => {
            let request: InitRequest = decode(&payload)?;
            stream_init(eco, request, &mut packets).await?;
        }
        Route::Sync => stream_feed(eco, packets, cancel).await?,
        Route::StartDecrediton => {
            let result = eco.start_service(ServiceId::Decrediton).await;
            send_start_reply(&mut packets, result).await?;
        }
        Route::StartDex => {
            let result = eco.open_exchange_window().await;
            send_start_reply(&mut packets, result).await?;
        }
        Route::Ctl => {
            let request: CtlRequest = decode(&payload)?;
            let response = match eco.ctl(&request.cmd).await {
                Ok(body) => CtlResponse {
                    err: String::new(),
                    body,
                },
                Err(e) => CtlResponse {
                    err: e.to_string(),
                    body: String::new(),
                },
            };
            packets.send(encode(&response)?).await?;
        }
    }
    Ok(())
}

/// Run initialization, forwarding its progress until a terminal report
async fn stream_init<S>(eco: Arc<Eco>, request: InitRequest, packets: &mut Packets<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
    let reporter = ProgressReporter::new(INIT_SERVICE, Arc::new(tx));

    // Initialization outlives a client that hangs up
    tokio::spawn(async move {
        if let Err(e) = eco
            .init(request.sync_mode, &request.passphrase, &reporter)
            .await
        {
            if e.is_precondition() {
                tracing::warn!("Initialization refused: {}", e);
            } else if e.is_integrity() {
                tracing::error!("Release failed verification: {}", e);
            } else {
                tracing::error!("Initialization failed: {}", e);
            }
            reporter.fail(e);
        }
    });

    while let Some(progress) = rx.recv().await {
        packets.send(encode(&progress)?).await?;
        if progress.is_terminal() {
            break;
        }
    }
    Ok(())
}

/// Stream feed messages until the client leaves or the server stops
async fn stream_feed<S>(eco: Arc<Eco>, packets: Packets<S>, cancel: CancellationToken) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut subscription = eco.feed().subscribe();
    let (mut sink, mut incoming) = packets.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            // Clients send nothing on this route; any read result means gone
            _ = incoming.next() => break,
            msg = subscription.recv() => match msg {
                // A client that stops reading must not hold up shutdown
                Some(msg) => {
                    let packet = encode(&msg)?;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = sink.send(packet) => sent?,
                    }
                }
                None => break,
            },
        }
    }
    tracing::debug!("Feed subscriber {} disconnected", subscription.id());
    Ok(())
}

async fn send_start_reply<S>(packets: &mut Packets<S>, result: Result<()>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let reply = match result {
        Ok(()) => Bytes::new(),
        Err(e) => {
            if e.is_precondition() {
                tracing::debug!("Start request refused: {}", e);
            } else {
                tracing::warn!("Start request failed: {}", e);
            }
            encode(&ErrorReply {
                message: e.to_string(),
            })?
        }
    };
    packets.send(reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eco_core::config::DaemonConfig;
    use eco_protocol::RequestFrame;

    #[tokio::test]
    async fn test_feed_stream_ends_on_cancel_with_stalled_client() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig {
            app_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let eco = Eco::open(config, &cancel).unwrap();

        // Small pipe the client never drains
        let (client, server) = tokio::io::duplex(64);
        let task = tokio::spawn(serve(
            Arc::clone(&eco),
            server,
            Duration::from_secs(2),
            cancel.clone(),
        ));

        let mut requests = Framed::new(client, RequestCodec::new());
        requests
            .send(RequestFrame::new(Route::Sync.as_str(), Bytes::new()))
            .await
            .unwrap();

        for i in 0..20 {
            eco.feed()
                .publish_progress(&Progress::new("dcrd", format!("Syncing {}", i), 0.5));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("feed stream should stop once cancelled")
            .unwrap();
        assert!(result.is_ok());
        drop(requests);
    }
}
