use crate::command::{Command, Dispatcher};
use crate::config::Config;
use crate::connection::ClientState;
use crate::error::Error;
use crate::resp::{Reply, RequestParser};
use crate::store::Store;
use crate::types::rkey::KeyRepo;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Bind the configured address and serve until `shutdown` is cancelled.
pub async fn run_server(
    store: Store,
    config: Config,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Relis server listening on {addr}");
    serve(listener, store, config, shutdown).await
}

/// Serve clients on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    store: Store,
    config: Config,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let config = Arc::new(config);
    let dispatcher = Dispatcher::new(store.clone());

    let sweeper = tokio::spawn(expiration_loop(
        store,
        config.sweep_interval(),
        config.expire_batch,
        shutdown.clone(),
    ));

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = result?;
                debug!("New connection from {peer}");

                let dispatcher = dispatcher.clone();
                let config = config.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, dispatcher, config, shutdown).await {
                        debug!("Connection error from {peer}: {e}");
                    }
                    debug!("Connection closed: {peer}");
                });
            }
            _ = shutdown.cancelled() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    if let Err(e) = sweeper.await {
        warn!("Expiration task failed: {e}");
    }
    Ok(())
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let mut client = ClientState::new(peer);
    let mut buf = BytesMut::with_capacity(4096);
    let mut out = Vec::with_capacity(4096);

    loop {
        // Answer every complete request in the buffer, then flush once.
        loop {
            match RequestParser::parse(&mut buf) {
                Ok(Some(request)) if request.is_empty() => continue,
                Ok(Some(request)) => {
                    let reply = process_request(request, &dispatcher, &mut client).await;
                    reply.write_to(&mut out);
                    if client.should_close {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Protocol error from {peer}: {e}");
                    Reply::error("ERR", format!("Protocol error: {e}")).write_to(&mut out);
                    client.should_close = true;
                    break;
                }
            }
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
            out.clear();
        }
        if client.should_close {
            return Ok(());
        }

        let read = async {
            match config.client_timeout() {
                // An idle client counts as disconnected.
                Some(idle) => tokio::time::timeout(idle, stream.read_buf(&mut buf))
                    .await
                    .unwrap_or(Ok(0)),
                None => stream.read_buf(&mut buf).await,
            }
        };
        tokio::select! {
            result = read => {
                if result? == 0 {
                    return Ok(());
                }
            }
            _ = shutdown.cancelled() => return Ok(()),
        }
    }
}

async fn process_request(
    request: Vec<Vec<u8>>,
    dispatcher: &Dispatcher,
    client: &mut ClientState,
) -> Reply {
    client.commands += 1;
    let cmd = match Command::parse(request) {
        Ok(cmd) => cmd,
        Err(e) => {
            debug!("Client {} sent a bad command: {e}", client.id);
            return Reply::from(&e);
        }
    };
    if cmd.is_quit() {
        client.should_close = true;
    }

    let name = cmd.name();
    let result = if cmd.uses_store() {
        // rusqlite blocks, so store work runs off the async workers.
        let dispatcher = dispatcher.clone();
        tokio::task::spawn_blocking(move || dispatcher.execute(&cmd))
            .await
            .unwrap_or_else(|e| Err(Error::Io(std::io::Error::other(e))))
    } else {
        dispatcher.execute(&cmd)
    };

    match result {
        Ok(reply) => reply,
        Err(e) => {
            debug!("Client {} command {name} failed: {e}", client.id);
            Reply::from(&e)
        }
    }
}

/// Background task that periodically purges expired records.
async fn expiration_loop(
    store: Store,
    interval: Duration,
    batch: usize,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => return,
        }

        let store = store.clone();
        let swept = tokio::task::spawn_blocking(move || {
            store.update(|tx| KeyRepo::new(tx).delete_expired(batch))
        })
        .await;
        match swept {
            Ok(Ok(0)) => {}
            Ok(Ok(n)) => trace!("Removed {n} expired keys"),
            Ok(Err(e)) => warn!("Expiration sweep failed: {e}"),
            Err(e) => warn!("Expiration sweep aborted: {e}"),
        }
    }
}
