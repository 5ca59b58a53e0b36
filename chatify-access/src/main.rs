use chatify_access::config::AccessConfig;
use chatify_access::server::AccessServer;
use chatify_im_core::config::{conf_path_from_args, load_config};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let conf_dir = conf_path_from_args();
    let app_config = load_config(conf_dir.as_deref());
    let config = AccessConfig::from_app_config(&app_config);

    let server = AccessServer::new(config).await?;

    info!("Starting Access Server");

    server.run().await
}
