use log::{debug, error, info, warn};
use std::thread;
use std::time::Instant;

use crate::cache::ServiceCache;
use crate::client::Connector;
use crate::coordinator::{Coordinator, Phase, UpdateError};
use crate::entities::Entities;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub unique_id: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Entities were created during this cycle, either by a delayed setup or
    /// for services discovered after it.
    pub entities_created: bool,
    pub changes: Vec<StateChange>,
}

/// Poll forever on a steady cadence. `on_setup` runs whenever entities are
/// created after startup.
pub fn run_loop<C, F>(coordinator: &mut Coordinator<C>, entities: &mut Entities, mut on_setup: F) -> Result<(), String>
where
    C: Connector,
    F: FnMut(&Entities),
{
    let interval = coordinator.update_interval();
    loop {
        let tick_start = Instant::now();

        let outcome = poll_once(coordinator, entities);
        if outcome.entities_created {
            on_setup(entities);
        }

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        } else {
            warn!(
                "Poll cycle took {}s, longer than the {}s interval",
                elapsed.as_secs(),
                interval.as_secs()
            );
        }
    }
}

/// One refresh pass followed by an entity update.
pub fn poll_once<C: Connector>(coordinator: &mut Coordinator<C>, entities: &mut Entities) -> PollOutcome {
    let was_ready = coordinator.phase() == Phase::Ready;
    let mut outcome = PollOutcome::default();

    let report = match coordinator.refresh() {
        Ok(report) => {
            debug!(
                "Refresh finished: updated={:?}, stale={:?}, timed_out={}",
                report.updated, report.stale, report.timed_out
            );
            report
        }
        Err(UpdateError::AuthFailed(e)) => {
            error!(
                "Jablotron Cloud rejected the credentials ({}); update JABLOTRON_USERNAME/JABLOTRON_PASSWORD. Retrying next cycle",
                e
            );
            return outcome;
        }
        Err(e) => {
            warn!(
                "Update failed ({} consecutive failure(s)): {}",
                coordinator.failure_count(),
                e
            );
            return outcome;
        }
    };

    if !was_ready {
        *entities = Entities::setup(coordinator.services());
        info!("Created {} entities after delayed setup", entities.len());
        outcome.entities_created = true;
        return outcome;
    }

    if !report.discovered.is_empty() {
        let fresh: ServiceCache = coordinator
            .services()
            .iter()
            .filter(|(id, _)| report.discovered.contains(*id))
            .map(|(id, service)| (*id, service.clone()))
            .collect();
        let added = Entities::setup(&fresh);
        info!(
            "Created {} entities for {} newly discovered service(s)",
            added.len(),
            report.discovered.len()
        );
        entities.extend(added);
        outcome.entities_created = true;
    }

    let before: Vec<(String, String)> = entities
        .iter()
        .map(|e| (e.unique_id().to_string(), e.state()))
        .collect();
    entities.handle_coordinator_update(coordinator.services());

    for (entity, (unique_id, from)) in entities.iter().zip(before) {
        let to = entity.state();
        if to != from {
            info!("{} '{}' changed: {} -> {}", entity.platform().as_str(), entity.name(), from, to);
            outcome.changes.push(StateChange { unique_id, from, to });
        }
    }
    outcome
}
