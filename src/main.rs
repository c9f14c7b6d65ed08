use anyhow::Context;
use conductor::config::AppConfig;
use conductor::jobs::JobsModule;
use conductor::lifecycle::Application;
use conductor::server::WebServerModule;
use conductor::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    telemetry::init_tracing(&config.log_level)?;

    tracing::info!(
        "Starting {} ({} environment)",
        config.app_name,
        config.env
    );

    let app = Application::builder()
        .startup_module(WebServerModule::new(config.listen_addr()))
        .startup_module(JobsModule::new())
        .config(config)
        .build()?;

    app.run().await?;
    Ok(())
}
