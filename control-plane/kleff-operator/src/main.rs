use envconfig::Envconfig;
use kleff_operator::{config::OperatorConfig, init_tracing, runtime};
use kube::Client;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let cfg = OperatorConfig::init_from_env()?.apply_profile_defaults();
    info!(?cfg, "Starting tenant operator");

    let client = Client::try_default().await?;
    runtime::run_all(client, cfg).await
}
