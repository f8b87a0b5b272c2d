use crate::{config::ServerConfig, handler::ServerHandler, metrics::ServerMetrics};
use batch_core::ServerName;
use batch_persistence::{QueueStore, RocksQueueStore};
use batch_protocol::{dispatch, Dispatched, Inbound, Registry, ServerCodec};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tokio_util::codec::Framed;

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Batch request server
pub struct BatchServer {
    config: Arc<ServerConfig>,
    handler: Arc<ServerHandler>,
    registry: Arc<Registry>,
    metrics: Arc<ServerMetrics>,
    connections: Arc<Semaphore>,
    shutdown: Arc<Notify>,
}

impl BatchServer {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let store = RocksQueueStore::open(config.to_store_config())?;
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn QueueStore>) -> anyhow::Result<Self> {
        let server_name = ServerName::new(config.server.server_name.clone())?;
        let handler = ServerHandler::new(server_name, store)
            .with_max_tracked(config.server.max_tracked_jobs);
        let metrics = ServerMetrics::new()?;

        Ok(BatchServer {
            connections: Arc::new(Semaphore::new(config.server.max_connections)),
            config: Arc::new(config),
            handler: Arc::new(handler),
            registry: Arc::new(Registry::standard()),
            metrics: Arc::new(metrics),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    pub fn handler(&self) -> Arc<ServerHandler> {
        self.handler.clone()
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr = self.config.listen_address();
        let listener = TcpListener::bind(&addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and serve until shut down
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let Ok(permit) = self.connections.clone().try_acquire_owned() else {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            };
                            debug!("New connection from {}", addr);
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    error!("Connection error: {}", e);
                                }
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutting down server");
                    break;
                }
            }
        }

        Ok(())
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn handle_connection(&self, stream: TcpStream) -> anyhow::Result<()> {
        self.metrics.connections_active.inc();
        let result = self.process_stream(stream).await;
        self.metrics.connections_active.dec();
        result
    }

    /// Decode, dispatch and reply until the peer disconnects or sends garbage
    async fn process_stream(&self, stream: TcpStream) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, ServerCodec::new(self.registry.clone()));

        while let Some(result) = framed.next().await {
            match result {
                Ok(inbound) => {
                    let label = match &inbound {
                        Inbound::Request(request) => request.request_type().as_str(),
                        Inbound::Unsupported(_) => "unsupported",
                    };
                    self.metrics.inc_requests(label);

                    match dispatch(self.handler.as_ref(), inbound).await {
                        Dispatched::Reply(reply) => framed.send(reply).await?,
                        Dispatched::Close => {
                            debug!("Client disconnected");
                            break;
                        }
                    }
                }
                Err(e) => {
                    self.metrics.inc_decode_errors(e.kind());
                    error!("Protocol error: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }
}
