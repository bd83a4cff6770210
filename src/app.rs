use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;

use crate::client::HttpTicketService;
use crate::config::{self, RuntimeSettings, TicketsConfig};
use crate::orchestrator::Orchestrator;
use crate::run_lock::{self, RunLock};
use crate::session::{FileSessionCache, SessionStore};
use crate::summary::{self, Summary};
use crate::util::format_local;

pub fn poll(config: &TicketsConfig, runtime: &RuntimeSettings, text: bool) -> Result<()> {
    let summary = run_poll(config, runtime)?;
    if text {
        print!("{}", summary::render_text(&summary, &config.staff_url));
        io::stdout().flush().context("failed to flush output")?;
        Ok(())
    } else {
        print_json(&summary)
    }
}

pub fn run_poll(config: &TicketsConfig, runtime: &RuntimeSettings) -> Result<Summary> {
    let cache = FileSessionCache::new(config.session_path());
    let _lock = lock_session(&cache, runtime)?;
    let client = HttpTicketService::new(config.base_url.clone(), runtime.request_timeout);
    let mut orchestrator = Orchestrator::new(config.poll_settings(), client, cache);
    let summary = orchestrator.run()?;
    Ok(summary)
}

pub fn login(config: &TicketsConfig, runtime: &RuntimeSettings) -> Result<()> {
    let cache = FileSessionCache::new(config.session_path());
    let session_file = cache.path().display().to_string();
    let _lock = lock_session(&cache, runtime)?;
    let client = HttpTicketService::new(config.base_url.clone(), runtime.request_timeout);
    let mut orchestrator = Orchestrator::new(config.poll_settings(), client, cache);
    orchestrator.login()?;
    print_json(&json!({ "status": "authenticated", "session_file": session_file }))
}

pub fn logout(config: &TicketsConfig, runtime: &RuntimeSettings) -> Result<()> {
    let cache = FileSessionCache::new(config.session_path());
    let _lock = lock_session(&cache, runtime)?;
    let status = if cache.clear()? { "cleared" } else { "absent" };
    print_json(&json!({ "status": status }))
}

pub fn print_status(config: &TicketsConfig) -> Result<()> {
    let cache = FileSessionCache::new(config.session_path());
    let cached = cache.load()?.is_some();

    println!("kayako-tickets status");
    println!("config: {}", config::config_path().display());
    println!("base_url: {}", config.base_url);
    println!("session_file: {}", cache.path().display());
    println!("session_cached: {cached}");
    if cached && let Some(modified) = cache.modified_at() {
        println!("session_written_at: {}", format_local(modified));
    }
    println!("departments: {}", config.department_ids.join(", "));
    println!("open_status_id: {}", config.open_status_id);
    println!(
        "credentials: {}",
        if config.effective_credentials().is_some() {
            "configured"
        } else {
            "missing"
        }
    );
    Ok(())
}

pub fn error_document(err: &anyhow::Error) -> String {
    json!({ "error": format!("{err:#}") }).to_string()
}

fn lock_session(cache: &FileSessionCache, runtime: &RuntimeSettings) -> Result<RunLock> {
    run_lock::acquire(&run_lock::lock_path_for(cache.path()), runtime.lock_wait)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to encode output JSON")?;
    println!("{rendered}");
    Ok(())
}
