use anyhow::Result;
use override_proxy::config::{LoggingSettings, Settings};
use override_proxy::infrastructure::log_messages;
use override_proxy::Application;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    init_tracing(&settings.logging);

    info!(
        environment = %settings.application.environment,
        "{}",
        log_messages::application::STARTING
    );

    let app = Application::with_settings(settings)?;
    app.run().await?;

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match logging.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        _ => subscriber.json().init(),
    }
}
