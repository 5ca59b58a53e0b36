//! Push 服务装配与生命周期

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chatify_im_core::dedup::{DedupStore, RedisDedupStore};
use chatify_im_core::discovery::{ServiceInstance, ServiceRegistry, ServiceWatcher};
use chatify_im_core::service_names;
use chatify_im_core::session::{RedisSessionStore, SessionStore};

use crate::config::PushConfig;
use crate::domain::replay::PresenceReplayService;
use crate::domain::repositories::{AccessDispatcher, MessageRepository, OfflineRepository};
use crate::domain::service::PushDomainService;
use crate::infrastructure::directory::AccessDirectory;
use crate::infrastructure::offline_client::OfflineGrpcClient;
use crate::infrastructure::persistence::PostgresMessageRepository;
use crate::interface::consumers::UserStateConsumer;
use crate::interface::grpc::{GrpcServer, PushGrpcHandler};

pub struct PushServer {
    config: Arc<PushConfig>,
    directory: Arc<AccessDirectory>,
    grpc: GrpcServer,
    consumer: UserStateConsumer,
    registry: Option<ServiceRegistry>,
    token: CancellationToken,
}

impl PushServer {
    pub async fn new(config: PushConfig) -> Result<Self> {
        let config = Arc::new(config);
        let token = CancellationToken::new();

        let redis_client = Arc::new(
            redis::Client::open(config.redis_url.as_str())
                .context("failed to create redis client")?,
        );
        let session: Arc<dyn SessionStore> =
            Arc::new(RedisSessionStore::new(redis_client.clone()));
        let dedup: Arc<dyn DedupStore> = Arc::new(RedisDedupStore::new(redis_client));

        let messages: Arc<dyn MessageRepository> =
            Arc::new(PostgresMessageRepository::new(&config).await?);
        let offline: Arc<dyn OfflineRepository> = Arc::new(OfflineGrpcClient::new(&config));

        let watcher =
            ServiceWatcher::connect(&config.etcd_endpoints, service_names::ACCESS).await?;
        let directory = AccessDirectory::new(watcher, &config, token.clone());
        directory.clone().start().await?;
        let dispatcher: Arc<dyn AccessDispatcher> = directory.clone();

        let push_service = Arc::new(PushDomainService::new(
            session,
            messages,
            offline.clone(),
            dispatcher.clone(),
        ));
        let replay = Arc::new(PresenceReplayService::new(dedup, offline, dispatcher));

        let grpc_addr: SocketAddr = config
            .grpc_addr
            .parse()
            .with_context(|| format!("invalid grpc addr {}", config.grpc_addr))?;
        let grpc = GrpcServer::new(PushGrpcHandler::new(push_service), grpc_addr, token.clone());
        let consumer = UserStateConsumer::new(&config, replay, token.clone())?;

        let instance = ServiceInstance {
            id: config.instance_id.clone(),
            name: service_names::PUSH.to_string(),
            endpoint: config.advertise_endpoint.clone(),
        };
        let registry =
            ServiceRegistry::register(&config.etcd_endpoints, &instance, config.lease_ttl_seconds)
                .await?;

        Ok(Self {
            config,
            directory,
            grpc,
            consumer,
            registry: Some(registry),
            token,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        info!(
            instance_id = %self.config.instance_id,
            grpc_addr = %self.config.grpc_addr,
            group = %self.config.consumer_group,
            "Push Server started"
        );

        let result = tokio::select! {
            result = self.grpc.run() => result,
            result = self.consumer.run() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                Ok(())
            }
        };

        self.token.cancel();
        self.directory.close().await;
        if let Some(registry) = self.registry.take() {
            if let Err(err) = registry.deregister().await {
                warn!(error = %err, "deregister failed");
            }
        }
        info!("Push Server stopped");
        result
    }
}
