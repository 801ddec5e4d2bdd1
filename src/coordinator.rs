//! Periodic refresh of the service cache.
//!
//! The first refresh discovers services and everything below them. Later
//! refreshes re-read component states for services already known, and pick
//! up services missing from the cache whenever the session is validated.
//! Every refresh is bounded by a single deadline. A pass is fetched in full
//! before it is applied: running out of time keeps the services fetched so
//! far and leaves the rest stale, any other failure leaves the cache as it was.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

use crate::cache::{ServiceCache, ServiceData};
use crate::client::{Connector, JablotronBridge, JablotronClientError};
use crate::jablotron::JablotronClient;
use crate::models::jablotron::{ProgrammableGates, Sections, Service, ServiceId, ThermoDevice};

#[derive(Debug)]
pub enum UpdateError {
    /// Credentials were rejected; they have to be re-entered before polling can recover.
    AuthFailed(JablotronClientError),
    Api(JablotronClientError),
    NoServices,
    Timeout,
}

impl core::fmt::Display for UpdateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UpdateError::AuthFailed(e) => write!(f, "authentication failed: {}", e),
            UpdateError::Api(e) => write!(f, "error communicating with API: {}", e),
            UpdateError::NoServices => write!(f, "no services returned by Jablotron Cloud"),
            UpdateError::Timeout => write!(f, "refresh timed out"),
        }
    }
}

impl std::error::Error for UpdateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpdateError::AuthFailed(e) | UpdateError::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<JablotronClientError> for UpdateError {
    fn from(value: JablotronClientError) -> Self {
        match value {
            JablotronClientError::Unauthorized(_) => UpdateError::AuthFailed(value),
            JablotronClientError::Timeout => UpdateError::Timeout,
            other => UpdateError::Api(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Ready,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub discovered: Vec<ServiceId>,
    pub skipped: Vec<ServiceId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: Vec<ServiceId>,
    /// Services added to the cache by this pass.
    pub discovered: Vec<ServiceId>,
    /// Services that kept their previous data because the pass ran out of time.
    pub stale: Vec<ServiceId>,
    pub timed_out: bool,
}

struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Deadline {
            expires_at: Instant::now() + timeout,
        }
    }

    fn check(&self) -> Result<(), UpdateError> {
        if Instant::now() >= self.expires_at {
            Err(UpdateError::Timeout)
        } else {
            Ok(())
        }
    }
}

pub struct Coordinator<C: Connector> {
    client: JablotronClient<C>,
    update_interval: Duration,
    scan_timeout: Duration,
    phase: Phase,
    failure_count: u32,
    reauth_required: bool,
    last_update_success: Option<DateTime<Utc>>,
}

impl<C: Connector> Coordinator<C> {
    pub fn new(client: JablotronClient<C>, update_interval: Duration, scan_timeout: Duration) -> Self {
        Coordinator {
            client,
            update_interval,
            scan_timeout,
            phase: Phase::Uninitialized,
            failure_count: 0,
            reauth_required: false,
            last_update_success: None,
        }
    }

    pub fn client(&self) -> &JablotronClient<C> {
        &self.client
    }

    pub fn services(&self) -> &ServiceCache {
        &self.client.services
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn is_degraded(&self) -> bool {
        self.failure_count > 0
    }

    pub fn reauth_required(&self) -> bool {
        self.reauth_required
    }

    pub fn last_update_success(&self) -> Option<DateTime<Utc>> {
        self.last_update_success
    }

    /// Discover services and their components.
    pub fn first_refresh(&mut self) -> Result<SetupReport, UpdateError> {
        let result = self.setup();
        match &result {
            Ok(report) => {
                self.phase = Phase::Ready;
                self.record_success();
                info!(
                    "Discovered {} service(s), skipped {} unsupported",
                    report.discovered.len(),
                    report.skipped.len()
                );
            }
            Err(e) => self.record_failure(e),
        }
        result
    }

    fn setup(&mut self) -> Result<SetupReport, UpdateError> {
        debug!("Discovering available Jablotron services");
        let bridge = self.client.get_bridge()?;
        let services = bridge.get_services()?;
        if services.is_empty() {
            warn!("No services were discovered and therefore no entities will be generated!");
        }
        let (discovered, report) = discover(&bridge, services, None)?;
        self.client.services.extend(discovered);
        Ok(report)
    }

    /// Refresh component states of all known services.
    ///
    /// A timeout is not an error: the report lists which services are stale.
    pub fn refresh(&mut self) -> Result<RefreshReport, UpdateError> {
        if self.phase == Phase::Uninitialized {
            let setup = self.first_refresh()?;
            return Ok(RefreshReport {
                updated: setup.discovered.clone(),
                discovered: setup.discovered,
                ..RefreshReport::default()
            });
        }

        let deadline = Deadline::after(self.scan_timeout);
        let mut report = RefreshReport::default();
        match self.update_data(&deadline, &mut report) {
            Ok(()) => {
                self.record_success();
                Ok(report)
            }
            Err(UpdateError::Timeout) => {
                report.timed_out = true;
                report.stale = self
                    .client
                    .services
                    .keys()
                    .filter(|id| !report.updated.contains(*id))
                    .copied()
                    .collect();
                warn!(
                    "Timeout while updating data for available services, data may be out of date! (stale services: {:?})",
                    report.stale
                );
                Ok(report)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Fetch everything for one pass, then apply it. Nothing reaches the cache
    /// unless the pass completes or runs out of time.
    fn update_data(&mut self, deadline: &Deadline, report: &mut RefreshReport) -> Result<(), UpdateError> {
        debug!("Updating data for available Jablotron services");
        let bridge = self.client.get_bridge()?;

        let mut pass = PendingPass::default();
        let result = self.fetch_pass(&bridge, deadline, &mut pass);
        match &result {
            Ok(()) | Err(UpdateError::Timeout) => self.commit(pass, report),
            Err(_) => debug!("Discarding data fetched for {} service(s)", pass.states.len()),
        }
        result
    }

    fn fetch_pass<B: JablotronBridge>(
        &self,
        bridge: &B,
        deadline: &Deadline,
        pass: &mut PendingPass,
    ) -> Result<(), UpdateError> {
        let cache = &self.client.services;

        if self.is_degraded() || cache.is_empty() {
            // Confirm the session actually serves data before touching the cache.
            deadline.check()?;
            let services = bridge.get_services()?;
            if services.is_empty() {
                return Err(UpdateError::NoServices);
            }
            let unknown: Vec<Service> = services
                .into_iter()
                .filter(|s| !cache.contains_key(&s.service_id))
                .collect();
            if !unknown.is_empty() {
                debug!("Discovering {} service(s) missing from the cache", unknown.len());
                let (discovered, _) = discover(bridge, unknown, Some(deadline))?;
                pass.discovered = discovered;
            }
        }

        for (service_id, service) in cache {
            deadline.check()?;
            debug!("Updating sections data for service '{}'", service_id);
            let sections = bridge.get_sections(*service_id, &service.service_type)?;

            deadline.check()?;
            debug!("Updating gates data for service '{}'", service_id);
            let gates = bridge.get_programmable_gates(*service_id, &service.service_type)?;

            deadline.check()?;
            debug!("Updating thermo devices data for service '{}'", service_id);
            let thermo = bridge.get_thermo_devices(*service_id, &service.service_type)?;

            pass.states.push((*service_id, FetchedStates { sections, gates, thermo }));
        }
        Ok(())
    }

    fn commit(&mut self, pass: PendingPass, report: &mut RefreshReport) {
        for (service_id, fetched) in pass.states {
            let Some(service) = self.client.services.get_mut(&service_id) else {
                continue;
            };
            service.apply_sections(fetched.sections);
            service.apply_gates(fetched.gates);
            service.apply_thermo(fetched.thermo);
            debug!("Successfully updated platforms data for service '{}'", service_id);
            report.updated.push(service_id);
        }

        for (service_id, data) in pass.discovered {
            info!("Discovered service '{}' ({})", service_id, data.name);
            self.client.services.insert(service_id, data);
            report.updated.push(service_id);
            report.discovered.push(service_id);
        }
    }

    fn record_success(&mut self) {
        if self.failure_count > 0 {
            info!("Jablotron Cloud recovered after {} failed update(s)", self.failure_count);
        }
        self.failure_count = 0;
        self.reauth_required = false;
        self.last_update_success = Some(Utc::now());
    }

    fn record_failure(&mut self, e: &UpdateError) {
        match e {
            UpdateError::AuthFailed(_) => {
                self.reauth_required = true;
                error!("Jablotron Cloud rejected the stored credentials: {}", e);
            }
            UpdateError::Timeout => {
                warn!("Timeout while discovering Jablotron services");
            }
            _ => {
                self.failure_count += 1;
                warn!("Error fetching Jablotron data (failure #{}): {}", self.failure_count, e);
            }
        }
    }
}

/// Data fetched by one steady pass, not yet applied.
#[derive(Default)]
struct PendingPass {
    discovered: ServiceCache,
    states: Vec<(ServiceId, FetchedStates)>,
}

struct FetchedStates {
    sections: Sections,
    gates: ProgrammableGates,
    thermo: Vec<ThermoDevice>,
}

/// Fetch everything for every supported service in `services`. The result is
/// only returned once all of them are complete.
fn discover<B: JablotronBridge>(
    bridge: &B,
    services: Vec<Service>,
    deadline: Option<&Deadline>,
) -> Result<(ServiceCache, SetupReport), UpdateError> {
    let check = || deadline.map_or(Ok(()), Deadline::check);
    let mut cache = ServiceCache::new();
    let mut report = SetupReport::default();
    for service in services {
        let Service {
            service_id,
            name,
            service_type,
        } = service;

        if !service_type.is_supported() {
            debug!("Service '{}' is not supported, ignoring!", service_type);
            report.skipped.push(service_id);
            continue;
        }

        check()?;
        debug!("Fetching additional data for service '{}'", service_id);
        let info = bridge.get_service_information(service_id)?;
        let mut data = ServiceData::new(name, service_type, &info);

        check()?;
        debug!("Discovering available sections for service '{}'", service_id);
        data.alarm = bridge.get_sections(service_id, &data.service_type)?;

        check()?;
        debug!("Discovering available gates for service '{}'", service_id);
        data.gates = bridge.get_programmable_gates(service_id, &data.service_type)?;

        check()?;
        debug!("Discovering available thermo devices for service '{}'", service_id);
        data.thermo = bridge.get_thermo_devices(service_id, &data.service_type)?;

        cache.insert(service_id, data);
        report.discovered.push(service_id);
        debug!("Successfully discovered available platforms for service '{}'", service_id);
    }
    Ok((cache, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::jablotron::{SectionState, component_state};
    use crate::testing::{Call, Fault, FakeConnector, FakeState};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn coordinator_with(setup: impl FnOnce(&mut FakeState)) -> (Coordinator<FakeConnector>, Rc<RefCell<FakeState>>) {
        let connector = FakeConnector::default();
        let state = connector.state();
        setup(&mut *state.borrow_mut());
        let client = JablotronClient::new(connector, "user", "pass", "1234", true);
        let coordinator = Coordinator::new(client, Duration::from_secs(30), Duration::from_secs(15));
        (coordinator, state)
    }

    fn section_state(c: &Coordinator<FakeConnector>, id: i64, component: &str) -> Option<SectionState> {
        let service = c.services().get(&ServiceId(id))?;
        component_state(component, &service.alarm.states)
    }

    #[test]
    fn first_refresh_skips_unsupported_services() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1001, "OASiS");
            s.add_fixture_service(2002, "FUTURA2");
        });

        let report = c.first_refresh().expect("setup");
        assert_eq!(report.discovered, vec![ServiceId(1001)]);
        assert_eq!(report.skipped, vec![ServiceId(2002)]);
        assert_eq!(c.phase(), Phase::Ready);
        assert_eq!(c.services().len(), 1);
        assert_eq!(c.services()[&ServiceId(1001)].firmware, "LJ60422");
        assert!(!state.borrow().calls.contains(&Call::Sections(ServiceId(2002))));
    }

    #[test]
    fn zero_services_is_not_an_error() {
        let (mut c, _) = coordinator_with(|_| {});
        let report = c.first_refresh().expect("setup");
        assert!(report.discovered.is_empty());
        assert_eq!(c.phase(), Phase::Ready);
        assert!(c.services().is_empty());
    }

    #[test]
    fn steady_refresh_updates_states() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1001, "OASiS");
        });
        c.first_refresh().expect("setup");
        assert_eq!(section_state(&c, 1001, "S1"), Some(SectionState::Arm));

        state
            .borrow_mut()
            .set_section_state(ServiceId(1001), "S1", SectionState::Disarm);
        state.borrow_mut().set_temperature(ServiceId(1001), "TD-7", 19.0);
        let report = c.refresh().expect("refresh");

        assert_eq!(report.updated, vec![ServiceId(1001)]);
        assert!(!report.timed_out);
        assert_eq!(section_state(&c, 1001, "S1"), Some(SectionState::Disarm));
        assert_eq!(c.services()[&ServiceId(1001)].thermo[0].temperature, 19.0);
        assert!(c.last_update_success().is_some());
    }

    #[test]
    fn uninitialized_refresh_runs_setup() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1001, "OASiS");
            s.fail(Call::Services, Fault::Transport);
        });
        assert!(matches!(c.first_refresh(), Err(UpdateError::Api(_))));
        assert_eq!(c.phase(), Phase::Uninitialized);

        state.borrow_mut().clear_faults();
        let report = c.refresh().expect("refresh");
        assert_eq!(report.updated, vec![ServiceId(1001)]);
        assert_eq!(c.phase(), Phase::Ready);
    }

    #[test]
    fn auth_failure_keeps_cache_and_requests_reauth() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1001, "OASiS");
        });
        c.first_refresh().expect("setup");
        let before = c.services().clone();

        {
            let mut s = state.borrow_mut();
            s.set_section_state(ServiceId(1001), "S1", SectionState::Disarm);
            s.reject_login = true;
        }
        assert!(matches!(c.refresh(), Err(UpdateError::AuthFailed(_))));
        assert!(c.reauth_required());
        assert_eq!(c.services(), &before);

        state.borrow_mut().reject_login = false;
        let logins = state.borrow().logins;
        c.refresh().expect("refresh after reauth");
        assert!(state.borrow().logins > logins);
        assert!(!c.reauth_required());
        assert_eq!(section_state(&c, 1001, "S1"), Some(SectionState::Disarm));
    }

    #[test]
    fn auth_failure_mid_pass_is_escalated() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1001, "OASiS");
        });
        c.first_refresh().expect("setup");
        state
            .borrow_mut()
            .fail(Call::Gates(ServiceId(1001)), Fault::Unauthorized);
        state
            .borrow_mut()
            .set_section_state(ServiceId(1001), "S1", SectionState::Disarm);
        let before = c.services().clone();

        assert!(matches!(c.refresh(), Err(UpdateError::AuthFailed(_))));
        assert!(c.reauth_required());
        assert_eq!(c.failure_count(), 0);
        // Sections were fetched before the rejection but never applied.
        assert_eq!(c.services(), &before);
        assert_eq!(section_state(&c, 1001, "S1"), Some(SectionState::Arm));
    }

    #[test]
    fn service_cut_off_mid_fetch_stays_untouched() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1, "OASiS");
            s.add_fixture_service(2, "OASiS");
        });
        c.first_refresh().expect("setup");

        {
            let mut s = state.borrow_mut();
            s.set_section_state(ServiceId(1), "S1", SectionState::Disarm);
            s.set_section_state(ServiceId(2), "S1", SectionState::Disarm);
            s.fail(Call::Gates(ServiceId(2)), Fault::Timeout);
        }
        let report = c.refresh().expect("timeout is not an error");

        assert_eq!(report.updated, vec![ServiceId(1)]);
        assert_eq!(report.stale, vec![ServiceId(2)]);
        assert_eq!(section_state(&c, 1, "S1"), Some(SectionState::Disarm));
        assert_eq!(section_state(&c, 2, "S1"), Some(SectionState::Arm));
    }

    #[test]
    fn interrupted_rediscovery_is_retried() {
        let (mut c, state) = coordinator_with(|_| {});
        c.first_refresh().expect("setup");

        {
            let mut s = state.borrow_mut();
            s.add_fixture_service(1, "OASiS");
            s.add_fixture_service(2, "OASiS");
            s.fail(Call::Information(ServiceId(2)), Fault::Timeout);
        }
        let report = c.refresh().expect("timeout is not an error");
        assert!(report.timed_out);
        assert!(report.discovered.is_empty());
        assert!(c.services().is_empty());

        state.borrow_mut().clear_faults();
        let report = c.refresh().expect("refresh");
        assert_eq!(report.discovered, vec![ServiceId(1), ServiceId(2)]);
        assert_eq!(c.services().keys().copied().collect::<Vec<_>>(), vec![ServiceId(1), ServiceId(2)]);
    }

    #[test]
    fn validation_picks_up_new_services() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1, "OASiS");
        });
        c.first_refresh().expect("setup");
        state
            .borrow_mut()
            .fail(Call::Sections(ServiceId(1)), Fault::Transport);
        assert!(c.refresh().is_err());

        {
            let mut s = state.borrow_mut();
            s.clear_faults();
            s.add_fixture_service(2, "OASiS");
        }
        let report = c.refresh().expect("refresh");
        assert_eq!(report.updated, vec![ServiceId(1), ServiceId(2)]);
        assert_eq!(report.discovered, vec![ServiceId(2)]);
        assert_eq!(c.services().len(), 2);
    }

    #[test]
    fn transient_failure_validates_session_on_next_cycle() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1001, "OASiS");
        });
        c.first_refresh().expect("setup");

        state
            .borrow_mut()
            .fail(Call::Sections(ServiceId(1001)), Fault::Transport);
        assert!(matches!(c.refresh(), Err(UpdateError::Api(_))));
        assert!(c.is_degraded());
        assert!(matches!(c.refresh(), Err(UpdateError::Api(_))));
        assert_eq!(c.failure_count(), 2);

        {
            let mut s = state.borrow_mut();
            s.clear_faults();
            s.calls.clear();
        }
        c.refresh().expect("recovered");
        assert_eq!(state.borrow().calls.first(), Some(&Call::Services));
        assert_eq!(c.failure_count(), 0);

        // Healthy cycles go straight to the component states.
        state.borrow_mut().calls.clear();
        c.refresh().expect("refresh");
        assert_eq!(state.borrow().calls.first(), Some(&Call::Sections(ServiceId(1001))));
    }

    #[test]
    fn empty_service_list_while_degraded_is_an_error() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1001, "OASiS");
        });
        c.first_refresh().expect("setup");
        state
            .borrow_mut()
            .fail(Call::Thermo(ServiceId(1001)), Fault::Transport);
        assert!(c.refresh().is_err());

        {
            let mut s = state.borrow_mut();
            s.clear_faults();
            s.services.clear();
        }
        assert!(matches!(c.refresh(), Err(UpdateError::NoServices)));
        assert_eq!(c.failure_count(), 2);
        assert_eq!(c.services().len(), 1);
    }

    #[test]
    fn empty_cache_is_rediscovered() {
        let (mut c, state) = coordinator_with(|_| {});
        c.first_refresh().expect("setup");
        assert!(c.services().is_empty());

        state.borrow_mut().add_fixture_service(1001, "OASiS");
        let report = c.refresh().expect("refresh");
        assert_eq!(report.updated, vec![ServiceId(1001)]);
        assert_eq!(c.services().len(), 1);
    }

    #[test]
    fn timeout_keeps_partial_progress() {
        let (mut c, state) = coordinator_with(|s| {
            s.add_fixture_service(1, "OASiS");
            s.add_fixture_service(2, "OASiS");
            s.add_fixture_service(3, "OASiS");
        });
        c.first_refresh().expect("setup");

        {
            let mut s = state.borrow_mut();
            for id in [1, 2, 3] {
                s.set_section_state(ServiceId(id), "S1", SectionState::Disarm);
            }
            s.fail(Call::Sections(ServiceId(3)), Fault::Timeout);
        }
        let report = c.refresh().expect("timeout is not an error");

        assert!(report.timed_out);
        assert_eq!(report.updated, vec![ServiceId(1), ServiceId(2)]);
        assert_eq!(report.stale, vec![ServiceId(3)]);
        assert_eq!(section_state(&c, 1, "S1"), Some(SectionState::Disarm));
        assert_eq!(section_state(&c, 2, "S1"), Some(SectionState::Disarm));
        assert_eq!(section_state(&c, 3, "S1"), Some(SectionState::Arm));
        assert_eq!(c.failure_count(), 0);
    }

    #[test]
    fn expired_deadline_skips_all_fetches() {
        let connector = FakeConnector::default();
        let state = connector.state();
        state.borrow_mut().add_fixture_service(1001, "OASiS");
        let client = JablotronClient::new(connector, "user", "pass", "", true);
        let mut c = Coordinator::new(client, Duration::from_secs(30), Duration::ZERO);
        c.first_refresh().expect("setup");

        state.borrow_mut().calls.clear();
        let report = c.refresh().expect("timeout is not an error");
        assert!(report.timed_out);
        assert_eq!(report.stale, vec![ServiceId(1001)]);
        assert!(state.borrow().calls.is_empty());
    }
}
