pub mod models {
    pub mod jablotron;
}

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod entities;
pub mod entry;
pub mod env_file;
pub mod jablotron;
pub mod services {
    pub mod control;
    pub mod polling;
}

#[cfg(test)]
mod testing;

use crate::cli::{CliArgs, Command};
use crate::client::CloudConnector;
use crate::config::Config;
use crate::coordinator::{Coordinator, Phase, UpdateError};
use crate::entities::Entities;
use crate::entry::ConfigEntry;
use crate::jablotron::JablotronClient;
use crate::services::{control, polling};
use log::{error, info, warn};
use std::path::Path;

fn load_entry(path: &Path) -> Result<Option<ConfigEntry>, String> {
    let Some(mut entry) = ConfigEntry::load(path).map_err(|e| format!("Reading config entry failed: {}", e))? else {
        info!("No stored config entry at {}; starting fresh", path.display());
        return Ok(None);
    };

    let migrated = entry
        .migrate()
        .map_err(|e| format!("Config entry migration failed: {}", e))?;
    if migrated {
        entry
            .save(path)
            .map_err(|e| format!("Saving migrated config entry failed: {}", e))?;
    }
    Ok(Some(entry))
}

fn register_entities(entry: &mut ConfigEntry, entities: &Entities, path: &Path) {
    let added = entry.register_entities(entities.iter());
    if added == 0 {
        return;
    }
    match entry.save(path) {
        Ok(()) => info!("Registered {} new entities in {}", added, path.display()),
        Err(e) => warn!("Saving entity registry failed: {}", e),
    }
}

pub fn run(args: CliArgs) -> Result<(), String> {
    // 1) Load and migrate the stored entry
    let entry_file = config::entry_file_from_env();
    let stored = load_entry(&entry_file)?;

    // 2) Resolve config
    let cfg = Config::from_env(stored.as_ref().map(|e| &e.data))
        .map_err(|e| format!("Invalid configuration ({}): {}", e.code(), e))?;
    info!(
        "Config loaded (scan_interval={}s, scan_timeout={}s, force_arm={}, default_pin={}, api={})",
        cfg.scan_interval.as_secs(),
        cfg.scan_timeout.as_secs(),
        cfg.force_arm,
        if cfg.default_pin.is_empty() { "unset" } else { "set" },
        cfg.api_url
    );

    let mut entry = stored.unwrap_or_else(|| ConfigEntry::new(cfg.to_entry_data()));
    entry.data = cfg.to_entry_data();

    // 3) Client and coordinator
    let connector = CloudConnector::new(cfg.api_url.clone(), cfg.scan_timeout);
    let client = JablotronClient::new(
        connector,
        &cfg.username,
        &cfg.password,
        &cfg.default_pin,
        cfg.force_arm,
    );
    let mut coordinator = Coordinator::new(client, cfg.scan_interval, cfg.scan_timeout);

    // 4) First refresh
    let mut entities = Entities::default();
    match coordinator.first_refresh() {
        Ok(_) => {
            // 5) Entities
            entities = Entities::setup(coordinator.services());
            info!("Set up {} entities", entities.len());
            register_entities(&mut entry, &entities, &cfg.entry_file);
        }
        Err(UpdateError::AuthFailed(e)) => {
            return Err(format!("Jablotron Cloud authentication failed (invalid_auth): {}", e));
        }
        Err(e) => warn!("Initial refresh failed, retrying on the next cycle: {}", e),
    }

    // 6) One-shot control or the poll loop
    match args.command {
        Command::Control { unique_id, action, code } => {
            if coordinator.phase() != Phase::Ready {
                return Err("Jablotron Cloud is not reachable; cannot run control command".to_string());
            }
            let state = control::execute(
                &mut entities,
                coordinator.client(),
                &unique_id,
                action,
                code.as_deref(),
            )
            .map_err(|e| format!("Control '{}' on {} failed: {}", action.as_str(), unique_id, e))?;
            info!("{} is now {}", unique_id, state);
            Ok(())
        }
        Command::Poll => {
            info!(
                "Starting poll loop: services={}, interval={}s",
                coordinator.services().len(),
                coordinator.update_interval().as_secs()
            );
            let entry_file = cfg.entry_file.clone();
            polling::run_loop(&mut coordinator, &mut entities, |entities| {
                register_entities(&mut entry, entities, &entry_file)
            })
        }
    }
}

fn main() {
    let args = match cli::parse_args(std::env::args_os().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(2);
        }
    };

    let loaded_env = match env_file::load(args.env_file.clone()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "jablotron-cloud {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(args) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
