use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use mailslurper::{
    Broadcaster, Config, MemoryStore, ServerContext, SmtpServer, StorageWriter, logging,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Capture mail sent by your applications")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address the SMTP listener binds to
    #[arg(long)]
    address: Option<String>,

    /// Port the SMTP listener binds to
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve at most this many connections at once
    #[arg(long)]
    max_workers: Option<usize>,
}

impl Args {
    fn into_config(self) -> Result<Config, mailslurper::ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(address) = self.address {
            config.smtp.address = address;
        }
        if let Some(port) = self.port {
            config.smtp.port = port;
        }
        if self.max_workers.is_some() {
            config.smtp.max_workers = self.max_workers;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Unable to load configuration");
            return ExitCode::FAILURE;
        }
    };

    println!("Starting MailSlurper SMTP server...");
    println!("Address: {}", config.smtp_binding_address());

    let store = Arc::new(MemoryStore::new());
    let broadcaster = Broadcaster::new(config.notify.subscriber_buffer);

    let subscription = broadcaster.subscribe();
    let announcer = thread::Builder::new()
        .name("mail-announcer".to_owned())
        .spawn(move || {
            while let Some(summary) = subscription.recv() {
                match summary.to_json() {
                    Ok(json) => info!(mail = %json, "New mail"),
                    Err(e) => warn!(error = %e, "Unable to serialize mail summary"),
                }
            }
        });
    if let Err(e) = announcer {
        warn!(error = %e, "Unable to start mail announcer");
    }

    let (mail_queue, _writer) = match StorageWriter::new(store, broadcaster.clone())
        .spawn(config.storage.queue_capacity)
    {
        Ok(writer) => writer,
        Err(e) => {
            error!(error = %e, "Unable to start storage writer");
            return ExitCode::FAILURE;
        }
    };

    let context = ServerContext::new(config.session, mail_queue, broadcaster);
    let server = match config.smtp.max_workers {
        Some(max_workers) => SmtpServer::with_worker_pool(context, max_workers),
        None => SmtpServer::new(context),
    };

    if let Err(e) = server.start(config.smtp_binding_address()) {
        error!(error = %e, "Failed to start server");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
