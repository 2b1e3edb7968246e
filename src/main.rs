use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use mail_triage::config::AppConfig;
use mail_triage::llm::create_provider;
use mail_triage::mailbox::{ImapMailbox, Mailbox};
use mail_triage::pipeline::TriageRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Warning: a rustls crypto provider was already installed");
    }

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export GEMINI_API_KEY=... MAIL_IMAP_HOST=imap.gmail.com MAIL_USERNAME=... MAIL_PASSWORD=...");
        std::process::exit(1);
    });

    let _log_guard = init_tracing(config.triage.log_dir.as_deref());

    eprintln!("📬 Mail Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!(
        "   Mailbox: {}@{}:{}",
        config.imap.username, config.imap.host, config.imap.port
    );
    eprintln!("   Rules: {}", config.triage.rules_path.display());
    eprintln!("   Max messages: {}\n", config.triage.max_messages);

    let llm = create_provider(&config.llm).context("failed to create model client")?;
    let mailbox: Arc<dyn Mailbox> = Arc::new(ImapMailbox::new(config.imap.clone()));

    let mut runner = TriageRunner::from_config(&config.triage, mailbox, llm).await?;
    let summary = runner.run().await.context("triage run aborted")?;

    eprintln!(
        "\nDone: {} found, {} classified, {} skipped, {} failed, {} new categories, {} unsubscribed",
        summary.found,
        summary.classified,
        summary.skipped,
        summary.failed,
        summary.new_categories,
        summary.unsubscribed
    );
    Ok(())
}

/// Console logging, plus a daily-rolling file when `log_dir` is set.
/// The returned guard must live until exit so buffered lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mail-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}
