// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};

use transcribe_backend::api::{self, AppState};
use transcribe_backend::auth::HttpCredentialVerifier;
use transcribe_backend::config::Config;
use transcribe_backend::poller;
use transcribe_backend::repository::TranscriptRepository;
use transcribe_backend::speech::{HttpSpeechClient, SpeechClient};
use transcribe_backend::store::FileStore;
use transcribe_backend::uploads::HttpUploadUrlSigner;

#[derive(Parser)]
#[command(name = "transcribe-backend")]
#[command(about = "HTTP backend for the speech-transcription pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one recovery sweep over stalled transcripts and exit
    Recover,
}

fn build_repository(config: &Config) -> Arc<TranscriptRepository> {
    let store = Arc::new(FileStore::new(config.store.data_directory.clone()));
    Arc::new(TranscriptRepository::new(store).with_delete_batch_size(config.store.delete_batch_size))
}

fn build_speech_client(config: &Config) -> Result<Arc<dyn SpeechClient>> {
    Ok(Arc::new(HttpSpeechClient::new(
        &config.speech.base_url,
        config.speech.timeout_secs,
    )?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::load()?;

    env_logger::Builder::new()
        .parse_filters(&config.logging.level)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let config = Arc::new(config);

            let repo = build_repository(&config);
            let speech = build_speech_client(&config)?;
            let verifier = Arc::new(HttpCredentialVerifier::new(
                &config.auth.token_info_url,
                config.auth.timeout_secs,
            )?);
            let signer = Arc::new(HttpUploadUrlSigner::new(
                &config.uploads.signer_url,
                config.uploads.url_ttl_secs,
                config.uploads.timeout_secs,
            )?);

            if config.recovery.enabled {
                let repo = repo.clone();
                let speech = speech.clone();
                let interval_secs = config.recovery.interval_secs;
                tokio::spawn(async move {
                    let mut ticker =
                        tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
                    ticker.tick().await; // the first tick fires immediately
                    loop {
                        ticker.tick().await;
                        if let Err(err) =
                            poller::recover_stalled(repo.clone(), speech.clone()).await
                        {
                            error!("recovery sweep failed: {}", err);
                        }
                    }
                });
            }

            let state = AppState {
                repo,
                verifier,
                signer,
                speech,
                config: config.clone(),
            };
            let app = api::create_router(state);

            let listener = tokio::net::TcpListener::bind(config.server_address()).await?;
            info!("listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
        Commands::Recover => {
            let repo = build_repository(&config);
            let speech = build_speech_client(&config)?;
            poller::recover_stalled(repo, speech).await?;
        }
    }

    Ok(())
}
