//! `whip-publish`: stream an Ogg/Opus file to a WHIP endpoint

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use whip_publisher::config::{DEFAULT_AUDIO_FILE, DEFAULT_ENDPOINT};
use whip_publisher::transport::DEFAULT_STREAM_ID;
use whip_publisher::logging::{parse_log_level, setup_logging, LoggingConfig};
use whip_publisher::{BearerToken, Publisher, PublisherConfig, Termination, WhipError, VERSION};

#[derive(Parser, Debug)]
#[command(name = "whip-publish", version, about = "Publish an Ogg/Opus file to a WHIP endpoint")]
struct Cli {
    /// Bearer token for the ingestion endpoint
    token: String,

    /// WHIP endpoint URL
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Ogg/Opus file to publish
    #[arg(long, default_value = DEFAULT_AUDIO_FILE)]
    audio_file: PathBuf,

    /// Page release interval in milliseconds
    #[arg(long, default_value_t = 20)]
    page_interval_ms: u64,

    /// HTTP timeout in seconds (0 disables)
    #[arg(long, default_value_t = 30)]
    http_timeout_secs: u64,

    /// ICE gathering timeout in seconds (0 disables)
    #[arg(long, default_value_t = 10)]
    gathering_timeout_secs: u64,

    /// Media stream id for the published tracks
    #[arg(long, default_value = DEFAULT_STREAM_ID)]
    stream_id: String,

    /// STUN/TURN server URL, may be repeated
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,

    /// Default log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Include source file and line in log output
    #[arg(long)]
    log_file_info: bool,
}

impl Cli {
    fn into_config(self) -> PublisherConfig {
        let mut config = PublisherConfig::new(BearerToken::new(self.token))
            .with_endpoint(self.endpoint)
            .with_audio_file(self.audio_file)
            .with_page_interval(Duration::from_millis(self.page_interval_ms))
            .with_http_timeout(optional_secs(self.http_timeout_secs))
            .with_gathering_timeout(optional_secs(self.gathering_timeout_secs))
            .with_stream_id(self.stream_id);

        for server in self.ice_servers {
            config = config.with_ice_server(server);
        }
        config
    }
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

async fn publish(config: PublisherConfig) -> Result<Termination, WhipError> {
    Publisher::from_config(config)?.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match parse_log_level(&cli.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    let mut logging = LoggingConfig::new(level);
    if cli.log_file_info {
        logging = logging.with_file_info();
    }
    if let Err(e) = setup_logging(logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting whip-publish v{}", VERSION);

    match publish(cli.into_config()).await {
        Ok(Termination::StreamFinished(report)) => {
            info!(
                "Stream finished: {} pages, {:?} of audio",
                report.pages, report.media_time
            );
            ExitCode::SUCCESS
        }
        Ok(Termination::ConnectionFailed) => {
            error!("Peer connection failed");
            ExitCode::FAILURE
        }
        Ok(Termination::MediaFailed(e)) | Err(e) => {
            error!("{} failed: {}", e.stage(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_required() {
        assert!(Cli::try_parse_from(["whip-publish"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["whip-publish", "secret"]).unwrap();
        let config = cli.into_config();

        assert_eq!(config.token.expose(), "secret");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.audio_file, PathBuf::from("output.ogg"));
        assert_eq!(config.page_interval, Duration::from_millis(20));
        assert_eq!(config.http_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.stream_id, DEFAULT_STREAM_ID);
    }

    #[test]
    fn test_zero_disables_timeouts() {
        let cli = Cli::try_parse_from([
            "whip-publish",
            "secret",
            "--http-timeout-secs",
            "0",
            "--gathering-timeout-secs",
            "0",
            "--ice-server",
            "stun:stun.example.com:3478",
            "--stream-id",
            "studio-a",
        ])
        .unwrap();
        let config = cli.into_config();

        assert_eq!(config.http_timeout, None);
        assert_eq!(config.gathering_timeout, None);
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.stream_id, "studio-a");
    }
}
