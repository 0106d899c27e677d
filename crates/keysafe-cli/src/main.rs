mod cli;
mod commands;
mod config;
mod storage;
mod tui;

use std::{fs, io, path::Path};

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use keysafe_core::{
    book::CredentialBook,
    credentials::{CredentialRecord, RecordCollection},
    storage::CredentialStore,
};
use keysafe_storage::encrypted_store::EncryptedFileStore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the credential book.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(cli::Command::Tui) {
        cli::Command::Tui => tui::launch(open_book(&config).await?).await?,
        cli::Command::Entry(cmd) => {
            let mut book = open_book(&config).await?;
            commands::handle(cmd, &mut book, &mut io::stdin().lock(), &mut io::stdout()).await?
        }
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info. Logs go to stderr so
    // stdout stays clean for `get` and the TUI.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("keysafe {}", env!("CARGO_PKG_VERSION"));
}

async fn open_book(config: &config::Config) -> Result<CredentialBook<storage::AppStore>> {
    let store = storage::store_from_config(config)?;
    Ok(CredentialBook::open(store, config.on_corrupt).await?)
}

/// Checks that the real store decrypts, then that the configured key can
/// encrypt and read back a throwaway store in a scratch directory beside it.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let path = storage::store_path(config)?;
    let store = storage::store_from_config(config)?;
    let records = store.load().await?;
    info!(path = %path.display(), "credential store readable");
    println!("Store: ok ({} entries)", records.len());

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let scratch = tempfile::Builder::new()
        .prefix(".keysafe-health-")
        .tempdir_in(parent)?;
    let scratch_store = EncryptedFileStore::in_dir(scratch.path(), storage::key_provider(config));
    let result = run_store_health(&scratch_store).await;
    scratch.close()?;
    result?;
    println!("Encryption: ok");
    Ok(())
}

async fn run_store_health<S: CredentialStore>(store: &S) -> Result<()> {
    let payload = RecordCollection::from(vec![CredentialRecord::new("health", "check", "ok")]);
    store.save(&payload).await?;
    let round_trip = store.load().await?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;

    #[tokio::test]
    async fn health_check_with_test_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(dir.path());
        run_store_health(&store)
            .await
            .expect("health check should succeed");
    }

    #[tokio::test]
    async fn open_book_with_corrupt_file_honors_policy() {
        use keysafe_core::book::CorruptPolicy;

        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = config::Config {
            data_dir: Some(dir.path().to_path_buf()),
            key: config::KeySource::Passphrase {
                passphrase: "test".into(),
            },
            ..config::Config::default()
        };
        fs::write(storage::store_path(&cfg).expect("path"), b"not encrypted").expect("write");

        assert!(open_book(&cfg).await.is_err());

        cfg.on_corrupt = CorruptPolicy::StartEmpty;
        let book = open_book(&cfg).await.expect("start empty");
        assert!(book.records().is_empty());
    }

    #[tokio::test]
    async fn health_check_never_touches_store_with_look_alike_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config::Config {
            data_dir: Some(dir.path().to_path_buf()),
            file_name: Some(".keysafe-health-vault".into()),
            key: config::KeySource::Passphrase {
                passphrase: "test".into(),
            },
            ..config::Config::default()
        };
        let store = storage::store_from_config(&cfg).expect("store");
        store
            .save(&RecordCollection::from(vec![CredentialRecord::new(
                "Email", "alice", "p@ss1",
            )]))
            .await
            .expect("save");

        run_health_check(&cfg).await.expect("health");

        let records = store.load().await.expect("store still readable");
        assert_eq!(records.labels(), vec!["Email - alice"]);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from(".keysafe-health-vault")]);
    }

    #[tokio::test]
    async fn health_check_reports_unreadable_store_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config::Config {
            data_dir: Some(dir.path().to_path_buf()),
            key: config::KeySource::Passphrase {
                passphrase: "test".into(),
            },
            ..config::Config::default()
        };
        let path = storage::store_path(&cfg).expect("path");
        fs::write(&path, b"not encrypted").expect("write");

        assert!(run_health_check(&cfg).await.is_err());
        assert_eq!(fs::read(&path).expect("read"), b"not encrypted");
    }
}
