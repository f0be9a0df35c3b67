mod bill_store;
mod classify;
mod config;
mod extract;
mod llm_extract;
mod mail_api;
mod notify;
mod payments;
mod policy;
mod processor;

use bill_store::BillStore;
use llm_extract::{ChatModel, HttpChatModel};
use mail_api::MailClient;
use processor::Processor;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let once = args.iter().any(|a| a == "--once");
    let setup = args.iter().any(|a| a == "setup");
    let config_path = args
        .iter()
        .find(|a| !a.starts_with("--") && *a != "setup")
        .cloned()
        .unwrap_or_else(|| "inboxpay.toml".to_string());

    let cfg = config::Config::load(&config_path)?;
    let mail = MailClient::new(&cfg.mail)?;

    if setup {
        let inbox_id = mail.create_inbox().await?;
        config::Config::update_inbox_id(&config_path, &inbox_id)?;
        info!(inbox_id = %inbox_id, config = %config_path, "Inbox saved to config");
        return Ok(());
    }

    if cfg.mail.inbox_id.is_empty() {
        return Err("No inbox_id configured; run the setup subcommand first".into());
    }

    let store = BillStore::new(&cfg.db_path)?;
    let model = HttpChatModel::from_config(&cfg.llm);
    let processor = Processor::new(
        &mail,
        &store,
        model.as_ref().map(|m| m as &dyn ChatModel),
        &cfg,
    );

    info!(
        inbox = %cfg.mail.inbox_id,
        poll_interval_secs = cfg.poll_interval_secs,
        "Watching inbox for bills"
    );

    loop {
        match processor.sweep_inbox().await {
            Ok(processed) => {
                let (total, autopay, approval) = store.counts()?;
                info!(
                    processed,
                    bills_total = total,
                    autopay,
                    approval,
                    "Sweep complete"
                );
            }
            // A failed sweep (network blip, mail API down) is retried on
            // the next tick rather than killing the watcher.
            Err(e) => error!(error = %e, "Inbox sweep failed"),
        }

        if once || cfg.poll_interval_secs == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_secs(cfg.poll_interval_secs)).await;
    }

    Ok(())
}
