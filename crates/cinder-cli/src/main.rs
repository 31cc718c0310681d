//! Cinder command line client.
//!
//! # Usage
//!
//! ```bash
//! # Store a note for a day, using a server-issued passphrase
//! cinder create "meet at noon" --ttl 24h
//!
//! # Read it once; prompts for the passphrase
//! cinder read https://localhost/notes/<id>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;
mod error;
mod read;

use std::process::ExitCode;

use cinder_client::{
    Composer, NoteGateway, NoteId, Passphrase, parse_share_link,
    session::{ProvisionerSession, RetrievalSession, submit_note},
    transport::QuicGateway,
};
use clap::Parser;
use cli::{Args, Command};
use error::CliError;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", report(e.as_ref()));
            ExitCode::FAILURE
        },
    }
}

/// Line shown for a failed command: the error's message, never its `Debug`.
fn report(error: &dyn std::error::Error) -> String {
    format!("error: {error}")
}

async fn run(args: Args) -> Result<(), BoxError> {
    let config = args.client_config();
    let gateway = QuicGateway::new(&config.api_addr, args.transport_config())?;

    let result = match args.command {
        Command::Create { text, ttl, secret } => {
            let text = match text {
                Some(text) => text,
                None => read_stdin().await?,
            };
            let mut composer = Composer::new(config.share_base_url);
            composer.set_note(text);
            composer.set_ttl(ttl);
            create(&gateway, composer, secret).await
        },
        Command::Read { link, secret, .. } => match parse_share_link(&link) {
            Ok(id) => read(&gateway, id, config.max_fetch_attempts, secret).await,
            Err(e) => Err(e.into()),
        },
        Command::Key => match gateway.issue_key().await {
            Ok(passphrase) => {
                println!("{}", passphrase.encode());
                Ok(())
            },
            Err(e) => Err(e.into()),
        },
    };

    gateway.close().await;
    result
}

async fn create(
    gateway: &QuicGateway,
    mut composer: Composer,
    secret: Option<Passphrase>,
) -> Result<(), BoxError> {
    let passphrase = match secret {
        Some(passphrase) => {
            composer.provisioner_mut().supply(passphrase.clone());
            passphrase
        },
        None => ProvisionerSession::new(gateway)
            .ensure(composer.provisioner_mut())
            .await
            .ok_or(CliError::NoPassphrase)?,
    };

    let link = submit_note(gateway, &mut composer).await?;
    println!("link:   {link}");
    println!("secret: {}", passphrase.encode());
    println!("expires after {}", composer.ttl());
    Ok(())
}

async fn read(
    gateway: &QuicGateway,
    id: NoteId,
    max_fetch_attempts: u32,
    secret: Option<Passphrase>,
) -> Result<(), BoxError> {
    let (mut session, handle) = RetrievalSession::new(gateway, id, max_fetch_attempts);
    let cancel = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abandon();
        }
    });

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut out = std::io::stdout();
    let result = read::run_read(&mut session, secret, &mut input, &mut out).await;
    cancel.abort();

    println!("{}", result?);
    Ok(())
}

async fn read_stdin() -> std::io::Result<String> {
    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;
    Ok(text)
}
