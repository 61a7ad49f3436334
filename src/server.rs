//! TCP server for TL1 connections.
//!
//! Accepts connections and runs each one as a [`Session`] on its own task.
//! At most `workers` sessions run at once; when every slot is taken the
//! accept loop waits for one to free up.

use crate::config::{ServerConfig, ShutdownMode};
use crate::dispatch::Dispatcher;
use crate::session::Session;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};

/// Listen backlog for the server socket
const LISTEN_BACKLOG: i32 = 1024;

/// Stops a running [`Server`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// Stop accepting connections. Safe to call more than once.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    worker_limit: Arc<Semaphore>,
    shutdown: CancellationToken,
    sessions_cancel: CancellationToken,
    sessions: TaskTracker,
    mode: ShutdownMode,
}

impl Server {
    /// Bind the listening socket. Must be called inside a tokio runtime.
    pub fn bind(config: &ServerConfig, dispatcher: Dispatcher) -> io::Result<Self> {
        let listener = TcpListener::from_std(create_listener(config.listen)?)?;
        let local_addr = listener.local_addr()?;

        Ok(Server {
            listener,
            local_addr,
            dispatcher: Arc::new(dispatcher),
            worker_limit: Arc::new(Semaphore::new(config.workers)),
            shutdown: CancellationToken::new(),
            sessions_cancel: CancellationToken::new(),
            sessions: TaskTracker::new(),
            mode: config.shutdown,
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    /// Accept connections until stopped.
    ///
    /// On return the listening socket is closed. With
    /// [`ShutdownMode::Drain`] sessions already running keep going until
    /// their clients disconnect; with [`ShutdownMode::Abort`] they are
    /// cancelled and awaited before returning.
    pub async fn run(self) -> io::Result<()> {
        let Server {
            listener,
            local_addr,
            dispatcher,
            worker_limit,
            shutdown,
            sessions_cancel,
            sessions,
            mode,
        } = self;
        info!(address = %local_addr, workers = worker_limit.available_permits(), "Server listening");

        loop {
            // Wait for a worker slot
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = worker_limit.clone().acquire_owned() => permit,
            };
            let Ok(permit) = permit else { break };

            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let session = Session::new(Arc::clone(&dispatcher), sessions_cancel.clone());
                    let span = info_span!("session", id = %session.id(), %peer);
                    span.in_scope(|| info!("Client connected"));

                    sessions.spawn(
                        async move {
                            let summary = session.run(stream).await;
                            drop(permit);
                            info!(
                                commands = summary.commands,
                                denied = summary.denied,
                                reason = ?summary.reason,
                                "Client disconnected"
                            );
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Error accepting client connection");
                }
            }
        }

        drop(listener);
        sessions.close();
        info!(active = sessions.len(), mode = ?mode, "Server stopped");

        if mode == ShutdownMode::Abort {
            sessions_cancel.cancel();
            sessions.wait().await;
        } else if !sessions.is_empty() {
            warn!(active = sessions.len(), "Leaving active sessions to drain");
        }

        Ok(())
    }
}

/// Create a TCP listener with SO_REUSEADDR so restarts can rebind at once.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    fn test_config(workers: usize, shutdown: ShutdownMode) -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            workers,
            shutdown,
        }
    }

    fn start(config: ServerConfig) -> (SocketAddr, ShutdownHandle, JoinHandle<io::Result<()>>) {
        let server = Server::bind(&config, Dispatcher::with_defaults()).unwrap();
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        (addr, handle, tokio::spawn(server.run()))
    }

    #[tokio::test]
    async fn test_request_response() {
        let (addr, handle, task) = start(test_config(4, ShutdownMode::Drain));

        let mut client = Client::connect(addr).await.unwrap();
        assert!(client.banner().starts_with("Welcome to TL1 Server - Session: SID-"));

        let resp = client.request("RTRV-NE:TID001::001;").await.unwrap();
        assert!(resp.starts_with("\n\n   TID001 "));
        assert!(resp.contains("M  001 COMPLD\n"));
        assert!(resp.ends_with("\n;\n"));

        let resp = client.request("BOGUS").await.unwrap();
        assert!(resp.contains("M  001 DENY\n"));

        let resp = client.request("ZZZZ:TID001::002;").await.unwrap();
        assert!(resp.contains("M  002 DENY\n"));

        client.disconnect().await.unwrap();
        handle.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clients_receive_own_responses() {
        let (addr, handle, task) = start(test_config(16, ShutdownMode::Drain));

        let mut clients = Vec::new();
        for n in 0..8 {
            clients.push(tokio::spawn(async move {
                let mut client = Client::connect(addr).await.unwrap();
                let tid = format!("TID{:03}", n);
                for ctag in 0..25 {
                    let resp = client
                        .request(&format!("RTRV-NE:{}::{};", tid, ctag))
                        .await
                        .unwrap();
                    let lines: Vec<&str> = resp.lines().collect();
                    assert!(lines[2].starts_with(&format!("   {} ", tid)));
                    assert_eq!(lines[3], format!("M  {} COMPLD", ctag));
                    assert_eq!(lines.last(), Some(&";"));
                }
                client.disconnect().await.unwrap();
            }));
        }
        for client in clients {
            client.await.unwrap();
        }

        handle.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_refuses_new_connections() {
        let (addr, handle, task) = start(test_config(4, ShutdownMode::Drain));

        Client::connect(addr).await.unwrap();
        handle.stop();
        assert!(handle.is_stopped());
        task.await.unwrap().unwrap();

        assert!(Client::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_drain_keeps_existing_sessions() {
        let (addr, handle, task) = start(test_config(4, ShutdownMode::Drain));

        let mut client = Client::connect(addr).await.unwrap();
        handle.stop();
        task.await.unwrap().unwrap();

        let resp = client.request("ENT-T1:TID001:AID002:003::RATE=1544;").await.unwrap();
        assert!(resp.contains("M  003 COMPLD\n"));
    }

    #[tokio::test]
    async fn test_abort_closes_existing_sessions() {
        let (addr, handle, task) = start(test_config(4, ShutdownMode::Abort));

        let mut client = Client::connect(addr).await.unwrap();
        client.request("RTRV-NE:TID001::001;").await.unwrap();

        handle.stop();
        task.await.unwrap().unwrap();

        let err = client.read_response().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_worker_limit_queues_connections() {
        let (addr, handle, task) = start(test_config(1, ShutdownMode::Drain));

        let first = Client::connect(addr).await.unwrap();

        // The second connection sits in the backlog until the first ends.
        let second = tokio::spawn(Client::connect(addr));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!second.is_finished());

        first.disconnect().await.unwrap();
        let mut second = tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let resp = second.request("ACT-SVC:TID001:AID003:004;").await.unwrap();
        assert!(resp.contains("M  004 COMPLD\n"));

        handle.stop();
        task.await.unwrap().unwrap();
    }
}
