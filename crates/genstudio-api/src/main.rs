use genstudio_api::{setup, telemetry};
use genstudio_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    telemetry::init_telemetry(config.log_format());

    let (state, router) = setup::initialize_app(config).await?;
    setup::server::start_server(state, router).await?;

    Ok(())
}
