use chatify_im_core::config::{conf_path_from_args, load_config};
use chatify_push::config::PushConfig;
use chatify_push::server::PushServer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let conf_dir = conf_path_from_args();
    let app_config = load_config(conf_dir.as_deref());
    let config = PushConfig::from_app_config(&app_config);

    let server = PushServer::new(config).await?;

    info!("Starting Push Server");

    server.run().await
}
