use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use powerbuddy::config::Settings;
use powerbuddy::mqtt::config::MqttConfig;
use powerbuddy::mqtt::mqtt_handler::MqttSession;
use powerbuddy::power::{retrigger, OnDuration, PowerDispatcher};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Switch a tent's Tasmota devices on for a bounded time, retriggered on an interval"
)]
struct Args {
    /// Tent from the settings file whose device topics are driven
    tent: String,

    /// How long each power-on lasts, 0.1..=11.1 or 12..=64800 seconds
    #[arg(long)]
    seconds_on: Option<OnDuration>,

    /// Seconds between power-on passes
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Settings file, defaults to ~/.config/powerbuddy/settings.toml
    #[arg(long, env = "POWERBUDDY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup()?;

    let settings_path = args.config.unwrap_or_else(Settings::default_path);
    if Settings::ensure_default(&settings_path).await? {
        warn!(
            "No settings found, wrote defaults to {}",
            settings_path.display()
        );
    }
    let settings = Settings::load(&settings_path).await?;

    let duration = match args.seconds_on {
        Some(duration) => duration,
        None => OnDuration::new(settings.retrigger.seconds_on)?,
    };
    let interval =
        Duration::from_secs(args.interval_secs.unwrap_or(settings.retrigger.interval_secs));

    let session = MqttSession::new(MqttConfig::from_settings(&settings.broker)?);
    info!("MQTT client id: {}", session.client_id());
    let mut dispatcher = PowerDispatcher::new(settings.dispatcher_config(&args.tent)?, session)?;
    dispatcher.start().await?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C: {}", e);
        }
        info!("Shutdown requested");
        ctrl_c_cancel.cancel();
    });

    let outcome = retrigger::run(&mut dispatcher, interval, duration, cancel).await;

    if let Err(e) = dispatcher.stop().await {
        error!("Failed to stop dispatcher: {}", e);
    }

    let passes = outcome?;
    info!(
        "Done after {} pass(es), {} message(s) sent",
        passes,
        dispatcher.session().status().messages_sent
    );
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

/// `RUST_LOG` picks the level, `info` when unset or unparsable
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tent_alone_leaves_the_rest_to_settings() {
        let args = Args::try_parse_from(["powerbuddy", "tent_one"]).unwrap();
        assert_eq!(args.tent, "tent_one");
        assert!(args.seconds_on.is_none());
        assert!(args.interval_secs.is_none());
    }

    #[test]
    fn parses_overrides() {
        let args = Args::try_parse_from([
            "powerbuddy",
            "tent_one",
            "--seconds-on",
            "30",
            "--interval-secs",
            "90",
            "--config",
            "/tmp/powerbuddy.toml",
        ])
        .unwrap();
        assert_eq!(args.seconds_on.map(OnDuration::seconds), Some(30.0));
        assert_eq!(args.interval_secs, Some(90));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/powerbuddy.toml")));
    }

    #[test]
    fn rejects_durations_in_the_gap() {
        let err = Args::try_parse_from(["powerbuddy", "tent_one", "--seconds-on", "11.5"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn tent_is_required() {
        assert!(Args::try_parse_from(["powerbuddy"]).is_err());
    }

    #[test]
    fn log_level_follows_rust_log() {
        use tracing::level_filters::LevelFilter;

        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(
            log_filter(Some("debug".to_string())).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(
            log_filter(Some("warn".to_string())).max_level_hint(),
            Some(LevelFilter::WARN)
        );
    }
}
