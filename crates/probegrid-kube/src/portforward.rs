//! Pod port-forward tunnels.
//!
//! The connector binds the leased local port itself, so a port taken in
//! the meantime surfaces as `PortInUse` before any API call is made. A
//! background task then opens one portforward to the pod. That first
//! portforward is the ready signal, and it serves the first accepted
//! connection. Every later connection gets its own portforward, bridged
//! with `copy_bidirectional`.

use k8s_openapi::api::core::v1::Pod;
use kube::api::Portforwarder;
use kube::{Api, Client};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use probegrid_core::Target;
use probegrid_tunnel::{
    CloseFuture, ConnectFuture, ReadyFuture, Tunnel, TunnelConnector, TunnelError, TunnelResult,
};

/// Opens `kubectl port-forward`-style tunnels through the API server.
#[derive(Clone)]
pub struct KubeConnector {
    client: Client,
}

impl KubeConnector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl TunnelConnector for KubeConnector {
    fn connect<'a>(
        &'a self,
        target: &'a Target,
        local_port: u16,
        remote_port: u16,
    ) -> ConnectFuture<'a> {
        Box::pin(async move {
            let listener = TcpListener::bind(("127.0.0.1", local_port))
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::AddrInUse => TunnelError::PortInUse(local_port),
                    _ => TunnelError::Setup(format!("bind 127.0.0.1:{local_port}: {e}")),
                })?;

            let forward = Forward {
                pods: Api::namespaced(self.client.clone(), &target.namespace),
                pod: target.name.clone(),
                remote_port,
            };
            let shutdown = CancellationToken::new();
            let (ready_tx, ready_rx) = oneshot::channel();
            let task = tokio::spawn(forward.run(listener, ready_tx, shutdown.clone()));

            debug!(instance = %target.id(), local_port, remote_port, "port-forward starting");
            Ok(Box::new(KubeTunnel {
                local_port,
                ready: Some(ready_rx),
                task,
                shutdown: shutdown.drop_guard(),
            }) as Box<dyn Tunnel>)
        })
    }
}

struct KubeTunnel {
    local_port: u16,
    ready: Option<oneshot::Receiver<TunnelResult<()>>>,
    task: JoinHandle<TunnelResult<()>>,
    /// Stops the forwarding task when the tunnel is closed or dropped.
    shutdown: DropGuard,
}

impl Tunnel for KubeTunnel {
    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn ready(&mut self) -> ReadyFuture<'_> {
        let ready = self.ready.take();
        Box::pin(async move {
            let Some(ready) = ready else {
                return Ok(());
            };
            match ready.await {
                Ok(result) => result,
                Err(_) => Err(TunnelError::Setup(
                    "port-forward ended before it was ready".to_string(),
                )),
            }
        })
    }

    fn close(self: Box<Self>) -> CloseFuture {
        let KubeTunnel { task, shutdown, .. } = *self;
        drop(shutdown);
        Box::pin(async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(TunnelError::Teardown(e.to_string())),
            }
        })
    }
}

struct Forward {
    pods: Api<Pod>,
    pod: String,
    remote_port: u16,
}

impl Forward {
    /// Open a portforward, or `None` once `shutdown` fires.
    async fn open(
        &self,
        shutdown: &CancellationToken,
    ) -> Option<Result<Portforwarder, kube::Error>> {
        let ports = [self.remote_port];
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            opened = self.pods.portforward(&self.pod, &ports) => Some(opened),
        }
    }

    /// Accept and bridge connections until shut down. Returns the first
    /// stream error seen, if any.
    async fn run(
        self,
        listener: TcpListener,
        ready: oneshot::Sender<TunnelResult<()>>,
        shutdown: CancellationToken,
    ) -> TunnelResult<()> {
        let Some(first) = self.open(&shutdown).await else {
            return Ok(());
        };
        let mut spare = match first {
            Ok(forwarder) => {
                let _ = ready.send(Ok(()));
                Some(forwarder)
            }
            Err(e) => {
                let err = TunnelError::Setup(format!("port-forward to pod {}: {e}", self.pod));
                let _ = ready.send(Err(err.clone()));
                return Err(err);
            }
        };

        let mut bridges = JoinSet::new();
        let mut failure: Option<TunnelError> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let socket = match accepted {
                        Ok((socket, _)) => socket,
                        Err(e) => {
                            failure = Some(TunnelError::Stream(format!("accept: {e}")));
                            break;
                        }
                    };
                    let forwarder = match spare.take() {
                        Some(forwarder) => forwarder,
                        None => match self.open(&shutdown).await {
                            Some(Ok(forwarder)) => forwarder,
                            Some(Err(e)) => {
                                failure = Some(TunnelError::Stream(format!("port-forward to pod {}: {e}", self.pod)));
                                break;
                            }
                            None => break,
                        },
                    };
                    bridges.spawn(bridge(socket, forwarder, self.remote_port));
                }
                Some(joined) = bridges.join_next() => {
                    if let Ok(Err(e)) = joined {
                        failure.get_or_insert(e);
                    }
                }
            }
        }

        if let Some(forwarder) = spare {
            forwarder.abort();
        }
        // Bridges that finished are still reported; live ones are cut.
        bridges.abort_all();
        while let Some(joined) = bridges.join_next().await {
            if let Ok(Err(e)) = joined {
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => {
                warn!(pod = %self.pod, error = %e, "port-forward stream failed");
                Err(e)
            }
            None => Ok(()),
        }
    }
}

async fn bridge(
    mut socket: TcpStream,
    mut forwarder: Portforwarder,
    remote_port: u16,
) -> TunnelResult<()> {
    let Some(mut upstream) = forwarder.take_stream(remote_port) else {
        forwarder.abort();
        return Err(TunnelError::Stream(format!("port {remote_port} not forwarded")));
    };

    let copied = tokio::io::copy_bidirectional(&mut socket, &mut upstream).await;
    drop(upstream);
    forwarder.abort();

    match copied {
        Ok((sent, received)) => {
            debug!(remote_port, sent, received, "port-forward connection closed");
            Ok(())
        }
        Err(e) => Err(TunnelError::Stream(e.to_string())),
    }
}
