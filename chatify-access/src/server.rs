//! Access 服务装配与生命周期

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chatify_im_core::discovery::{ServiceInstance, ServiceRegistry};
use chatify_im_core::service_names;
use chatify_im_core::session::{RedisSessionStore, SessionStore};

use crate::application::MessageDispatcher;
use crate::config::AccessConfig;
use crate::domain::manager::ConnectionManager;
use crate::domain::repositories::{EventPublisher, UpstreamDispatcher};
use crate::infrastructure::KafkaEventPublisher;
use crate::interface::{AccessGrpcHandler, GrpcServer, WsListener};

pub struct AccessServer {
    config: Arc<AccessConfig>,
    manager: Arc<ConnectionManager>,
    ws: WsListener,
    grpc: GrpcServer,
    registry: Option<ServiceRegistry>,
    token: CancellationToken,
}

impl AccessServer {
    pub async fn new(config: AccessConfig) -> Result<Self> {
        let config = Arc::new(config);
        let token = CancellationToken::new();

        let redis_client = Arc::new(
            redis::Client::open(config.redis_url.as_str())
                .context("failed to create redis client")?,
        );
        let session: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(redis_client));
        let publisher: Arc<dyn EventPublisher> =
            Arc::new(KafkaEventPublisher::new(&config.kafka)?);
        let dispatcher: Arc<dyn UpstreamDispatcher> =
            Arc::new(MessageDispatcher::new(publisher.clone()));
        let manager = Arc::new(ConnectionManager::new(
            config.instance_id.clone(),
            session,
            publisher,
            dispatcher,
        ));

        let grpc_addr: SocketAddr = config
            .grpc_addr
            .parse()
            .with_context(|| format!("invalid grpc addr {}", config.grpc_addr))?;
        let grpc = GrpcServer::new(
            AccessGrpcHandler::new(manager.clone()),
            grpc_addr,
            token.clone(),
        );
        let ws = WsListener::new(config.clone(), manager.clone(), token.clone());

        let instance = ServiceInstance {
            id: config.instance_id.clone(),
            name: service_names::ACCESS.to_string(),
            endpoint: config.advertise_endpoint.clone(),
        };
        let registry =
            ServiceRegistry::register(&config.etcd_endpoints, &instance, config.lease_ttl_seconds)
                .await?;

        Ok(Self {
            config,
            manager,
            ws,
            grpc,
            registry: Some(registry),
            token,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        info!(
            node_id = %self.config.instance_id,
            ws_addr = %self.config.ws_addr,
            grpc_addr = %self.config.grpc_addr,
            "Access Server started"
        );

        let result = tokio::select! {
            result = self.ws.run() => result,
            result = self.grpc.run() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                Ok(())
            }
        };

        self.token.cancel();
        self.manager.shutdown().await;
        if let Some(registry) = self.registry.take() {
            if let Err(err) = registry.deregister().await {
                warn!(error = %err, "deregister failed");
            }
        }
        info!("Access Server stopped");
        result
    }
}
