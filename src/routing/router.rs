//! The MTP3 router.
//!
//! Dispatches MSUs between attached layer 3 networks and layer 4 user
//! parts, runs the MTP restart sequence, tracks per-destination route
//! state and drives the management advertisements that follow from
//! state changes.
//!
//! Locking: a coarse component lock guards the layer lists, flags,
//! timers and counters; the route table has its own mutex. The two are
//! never held at the same time, and no lock is held across an upcall
//! that can re-enter the router (route-table-held calls are limited to
//! read-only layer 3 queries). List iteration with the component lock
//! released relies on the `changes` generation counter: when it moved,
//! the scan restarts from the beginning.

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use ss7_config::RouterConfig;

use crate::common::label::RoutingLabel;
use crate::common::msu::{Msu, SIF_MTN, SIF_MTNS, SIF_SNM};
use crate::common::params::CtlParams;
use crate::common::pointcode::{PcType, PointCode};
use crate::common::timer::IntervalTimer;
use crate::layers::{link, same_object, HandledMsu, Layer3, Layer4, NetRoute};
use crate::routing::route::{
    format_pc, transmit_over, RouteState, RouteTable, ANY_STATE, NOT_PROHIBITED,
};
use crate::snm::maintenance::Maintenance;
use crate::snm::management::Snm;
use crate::snm::msg::SnmType;

/// STP restart enters its second phase this long before the restart
/// timer expires (Q.704 figure 29).
const RESTART_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Ctl {
    Pause,
    Resume,
    Restart,
    Traffic,
    Status,
    Advertise,
    Route(SnmType),
}

static CTL_OPS: &[(&str, Ctl)] = &[
    ("pause", Ctl::Pause),
    ("resume", Ctl::Resume),
    ("restart", Ctl::Restart),
    ("traffic", Ctl::Traffic),
    ("status", Ctl::Status),
    ("advertise", Ctl::Advertise),
    ("prohibit", Ctl::Route(SnmType::Tfp)),
    ("restrict", Ctl::Route(SnmType::Tfr)),
    ("congest", Ctl::Route(SnmType::Tfc)),
    ("allow", Ctl::Route(SnmType::Tfa)),
    ("allowed", Ctl::Route(SnmType::Tra)),
    ("test-prohibited", Ctl::Route(SnmType::Rst)),
    ("test-restricted", Ctl::Route(SnmType::Rsr)),
];

/// Route state implied by a management message type.
fn route_state_of(cmd: SnmType) -> RouteState {
    match cmd {
        SnmType::Tfp | SnmType::Rst => RouteState::Prohibited,
        SnmType::Tfr | SnmType::Rsr => RouteState::Restricted,
        SnmType::Tfc => RouteState::Congestion,
        SnmType::Tfa | SnmType::Tra => RouteState::Allowed,
        _ => RouteState::Unknown,
    }
}

#[derive(Clone, Copy)]
struct Flags {
    transfer: bool,
    started: bool,
    phase2: bool,
    test_restricted: bool,
}

struct RouterState {
    layer3: Vec<Weak<dyn Layer3>>,
    layer4: Vec<Weak<dyn Layer4>>,
    mngmt: Option<Arc<Snm>>,
    maintenance: Option<Arc<Maintenance>>,
    changes: u64,
    transfer: bool,
    started: bool,
    phase2: bool,
    check_routes: bool,
    send_unavail: bool,
    send_prohibited: bool,
    test_restricted: bool,
    restart: IntervalTimer,
    isolate: IntervalTimer,
    route_test: IntervalTimer,
    rx_msu: u64,
    tx_msu: u64,
    fwd_msu: u64,
}

pub struct Router {
    name: String,
    self_ref: Weak<Router>,
    state: Mutex<RouterState>,
    routes: Mutex<RouteTable>,
}

impl Router {
    pub fn new(cfg: &RouterConfig) -> Arc<Router> {
        let restart_ms = if cfg.start_time_ms != 0 {
            cfg.start_time_ms
        } else if cfg.transfer {
            60_000
        } else {
            10_000
        };
        let router = Arc::new_cyclic(|weak: &Weak<Router>| Router {
            name: cfg.name.clone(),
            self_ref: weak.clone(),
            state: Mutex::new(RouterState {
                layer3: Vec::new(),
                layer4: Vec::new(),
                mngmt: None,
                maintenance: None,
                changes: 0,
                transfer: cfg.transfer,
                started: false,
                phase2: false,
                check_routes: false,
                send_unavail: cfg.send_upu,
                send_prohibited: cfg.send_tfp,
                test_restricted: cfg.test_restricted,
                restart: IntervalTimer::from_config(restart_ms, 5_000),
                isolate: IntervalTimer::from_config(cfg.isolation_ms, 500),
                route_test: IntervalTimer::from_config(cfg.test_routes_ms, 10_000),
                rx_msu: 0,
                tx_msu: 0,
                fwd_msu: 0,
            }),
            routes: Mutex::new(RouteTable::new()),
        });
        router.load_local_pc(&cfg.local);
        if cfg.management {
            router.set_management(&Snm::new());
        }
        if cfg.maintenance {
            let mtn = Maintenance::new();
            router.state.lock().unwrap().maintenance = Some(mtn.clone());
            router.attach_service(&(mtn as Arc<dyn Layer4>));
        }
        if cfg.autostart {
            router.restart();
        }
        router
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn self_arc(&self) -> Option<Arc<Router>> {
        self.self_ref.upgrade()
    }

    fn self_layer3(&self) -> Option<Arc<dyn Layer3>> {
        self.self_arc().map(|a| a as Arc<dyn Layer3>)
    }

    fn flags(&self) -> Flags {
        let st = self.state.lock().unwrap();
        Flags {
            transfer: st.transfer,
            started: st.started,
            phase2: st.phase2,
            test_restricted: st.test_restricted,
        }
    }

    pub fn started(&self) -> bool {
        self.state.lock().unwrap().started
    }

    /// rx / tx / forwarded MSU counters.
    pub fn counters(&self) -> (u64, u64, u64) {
        let st = self.state.lock().unwrap();
        (st.rx_msu, st.tx_msu, st.fwd_msu)
    }

    pub fn management(&self) -> Option<Arc<Snm>> {
        self.state.lock().unwrap().mngmt.clone()
    }

    fn networks(&self) -> Vec<Arc<dyn Layer3>> {
        self.state.lock().unwrap().layer3.iter().filter_map(|w| w.upgrade()).collect()
    }

    fn services(&self) -> Vec<Arc<dyn Layer4>> {
        self.state.lock().unwrap().layer4.iter().filter_map(|w| w.upgrade()).collect()
    }

    fn load_local_pc(&self, locals: &[String]) {
        let mut tbl = self.routes.lock().unwrap();
        for entry in locals {
            let mut it = entry.splitn(2, ',');
            let t = it.next().and_then(PcType::from_token);
            let pc = match (t, it.next()) {
                (Some(t), Some(s)) => PointCode::parse(t, s).map(|pc| (t, pc)),
                _ => None,
            };
            match pc {
                Some((t, pc)) if pc.valid(t) => tbl.locals[t.index()] = pc.pack(t),
                _ => tracing::warn!("{}: invalid local point code '{}'", self.name, entry),
            }
        }
    }

    /// Register the management user part; it also joins the layer 4
    /// list like any other service.
    pub fn set_management(&self, snm: &Arc<Snm>) {
        self.state.lock().unwrap().mngmt = Some(snm.clone());
        self.attach_service(&(snm.clone() as Arc<dyn Layer4>));
    }

    /// Attach a layer 3 network. Idempotent; refreshes the routes the
    /// network advertises either way.
    pub fn attach_network(&self, network: &Arc<dyn Layer3>) {
        {
            let mut st = self.state.lock().unwrap();
            let present = st
                .layer3
                .iter()
                .filter_map(|w| w.upgrade())
                .any(|n| same_object(&n, network));
            if !present {
                st.changes += 1;
                st.layer3.push(Arc::downgrade(network));
                tracing::debug!("{}: attached network '{}'", self.name, network.name());
            }
        }
        self.routes.lock().unwrap().update_routes(network);
        if let Some(me) = self.self_arc() {
            network.attach_router(Some(&me));
        }
    }

    pub fn detach_network(&self, network: &Arc<dyn Layer3>) {
        let removed = {
            let mut st = self.state.lock().unwrap();
            let before = st.layer3.len();
            st.layer3.retain(|w| match w.upgrade() {
                Some(n) => !same_object(&n, network),
                None => false,
            });
            let removed = st.layer3.len() != before;
            if removed {
                st.changes += 1;
            }
            removed
        };
        if removed {
            self.routes.lock().unwrap().remove_routes(network);
            network.attach_router(None);
            tracing::debug!("{}: detached network '{}'", self.name, network.name());
        }
    }

    /// Attach a layer 4 user part. Idempotent.
    pub fn attach_service(&self, service: &Arc<dyn Layer4>) {
        {
            let mut st = self.state.lock().unwrap();
            let present = st
                .layer4
                .iter()
                .filter_map(|w| w.upgrade())
                .any(|s| same_object(&s, service));
            if !present {
                st.changes += 1;
                st.layer4.push(Arc::downgrade(service));
                tracing::debug!("{}: attached service '{}'", self.name, service.name());
            }
        }
        if let Some(me) = self.self_arc() {
            service.attach_router(Some(&me));
        }
    }

    pub fn detach_service(&self, service: &Arc<dyn Layer4>) {
        let removed = {
            let mut st = self.state.lock().unwrap();
            let before = st.layer4.len();
            st.layer4.retain(|w| match w.upgrade() {
                Some(s) => !same_object(&s, service),
                None => false,
            });
            let removed = st.layer4.len() != before;
            if removed {
                st.changes += 1;
                if st.mngmt.as_ref().map_or(false, |m| same_object(m, service)) {
                    st.mngmt = None;
                }
                if st.maintenance.as_ref().map_or(false, |m| same_object(m, service)) {
                    st.maintenance = None;
                }
            }
            removed
        };
        if removed {
            service.attach_router(None);
            tracing::debug!("{}: detached service '{}'", self.name, service.name());
        }
    }

    /// Begin an MTP restart.
    pub fn restart(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        tracing::info!(
            "{}: restart of {} initiated",
            self.name,
            if st.transfer { "STP" } else { "SN" }
        );
        st.phase2 = false;
        st.started = false;
        st.check_routes = true;
        st.isolate.stop();
        st.restart.start(Instant::now());
        st.route_test.stop();
        true
    }

    /// Stop MTP operation entirely.
    pub fn disable(&self) {
        let mut st = self.state.lock().unwrap();
        tracing::info!("{}: MTP operation is disabled", self.name);
        st.phase2 = false;
        st.started = false;
        st.check_routes = false;
        st.isolate.stop();
        st.restart.stop();
        st.route_test.stop();
    }

    /// Periodic timer evaluation; drives restart, isolation and route
    /// test deadlines.
    pub fn timer_tick(&self, now: Instant) {
        let mut st = self.state.lock().unwrap();
        if st.isolate.timeout(now) {
            tracing::warn!("{}: node is isolated and down", self.name);
            st.phase2 = false;
            st.started = false;
            st.isolate.stop();
            st.restart.stop();
            return;
        }
        if st.started {
            if st.route_test.timeout(now) {
                st.route_test.start(now);
                drop(st);
                self.send_route_test();
            }
            return;
        }
        if st.transfer && !st.phase2 {
            if st.restart.timeout(now + RESTART_GRACE) {
                drop(st);
                self.restart2();
            }
        } else if st.restart.timeout(now) {
            tracing::info!(
                "{}: restart of {} complete",
                self.name,
                if st.transfer { "STP" } else { "SN" }
            );
            st.restart.stop();
            st.started = true;
            st.phase2 = false;
            let check = st.check_routes;
            let transfer = st.transfer;
            st.route_test.start(now);
            drop(st);
            // Traffic restart allowed towards every operational adjacent
            self.send_restart(None);
            if check {
                self.check_routes(None, now);
            }
            // advertise all non-Prohibited routes learned so far
            if transfer {
                self.notify_routes(NOT_PROHIBITED, None);
            }
            let me = self.self_layer3();
            for s in self.services() {
                s.notify(me.as_ref(), -1);
            }
        }
    }

    /// Second phase of an STP restart: broadcast the prohibited routes
    /// learned so far.
    fn restart2(&self) {
        {
            let mut st = self.state.lock().unwrap();
            if st.phase2 || !st.transfer {
                return;
            }
            tracing::info!("{}: restart of STP entering second phase", self.name);
            st.phase2 = true;
        }
        self.notify_routes(RouteState::Prohibited.mask(), None);
    }

    /// Route an MSU by destination under a state mask. `network` is the
    /// network the MSU came from when forwarding.
    pub fn route_msu(
        &self,
        msu: &Msu,
        label: &RoutingLabel,
        network: Option<&Arc<dyn Layer3>>,
        sls: i32,
        states: u8,
    ) -> Option<u8> {
        let snapshot = {
            let tbl = self.routes.lock().unwrap();
            tbl.find_masked(label.pc_type, label.dpc.pack(label.pc_type), states)
                .map(|r| (r.shift, r.network_refs()))
        };
        let (shift, nets) = snapshot?;
        let used = transmit_over(&nets, shift, msu, label, sls)?;
        let mut st = self.state.lock().unwrap();
        st.tx_msu += 1;
        if network.is_some() {
            st.fwd_msu += 1;
        }
        Some(used)
    }

    /// Transmit an outbound MSU. Management and maintenance traffic may
    /// use routes in any state, everything else needs a non-prohibited
    /// route.
    pub fn transmit(&self, msu: &Msu, label: &RoutingLabel, sls: i32) -> Option<u8> {
        let states = match msu.sif() {
            SIF_SNM | SIF_MTN | SIF_MTNS => ANY_STATE,
            _ => NOT_PROHIBITED,
        };
        self.route_msu(msu, label, None, sls, states)
    }

    /// Inbound MSU from a layer 3: offer it to every user part, then
    /// fall back to local/unequipped handling or STP forwarding.
    pub fn received(
        &self,
        msu: &Msu,
        label: &RoutingLabel,
        network: Option<&Arc<dyn Layer3>>,
        sls: i32,
    ) -> HandledMsu {
        let mut ret = HandledMsu::Rejected;
        let mut st = self.state.lock().unwrap();
        st.rx_msu += 1;
        'scan: loop {
            let mut idx = 0;
            while idx < st.layer4.len() {
                let Some(l4) = st.layer4[idx].upgrade() else {
                    idx += 1;
                    continue;
                };
                let chg = st.changes;
                drop(st);
                let handled = l4.received(msu, label, network, sls);
                tracing::trace!(
                    "{}: service '{}' returned {:?}",
                    self.name,
                    l4.name(),
                    handled
                );
                match handled {
                    HandledMsu::Accepted | HandledMsu::Failure => return handled,
                    HandledMsu::Rejected => {}
                    other => ret = other,
                }
                st = self.state.lock().unwrap();
                // the list changed while unlocked: restart the scan
                if st.changes != chg {
                    continue 'scan;
                }
                idx += 1;
            }
            break;
        }
        let send_unavail = st.send_unavail;
        let transfer = st.transfer;
        let send_prohibited = st.send_prohibited;
        drop(st);
        match ret {
            HandledMsu::Unequipped | HandledMsu::Inaccessible => {
                return if send_unavail { ret } else { HandledMsu::Failure };
            }
            _ => {}
        }
        let dpc = label.dpc.pack(label.pc_type);
        let mut local = dpc != 0 && self.get_local(label.pc_type) == dpc;
        if !local && dpc != 0 {
            if let Some(net) = network {
                local = net.get_local(label.pc_type) == dpc;
            }
        }
        if local {
            return if send_unavail { HandledMsu::Unequipped } else { HandledMsu::Failure };
        }
        if transfer {
            if self
                .route_msu(msu, label, network, label.sls() as i32, NOT_PROHIBITED)
                .is_some()
            {
                return HandledMsu::Accepted;
            }
            return if send_prohibited { HandledMsu::NoAddress } else { HandledMsu::Failure };
        }
        HandledMsu::Failure
    }

    /// Relay a user part unavailable indication to every service.
    pub fn received_upu(
        &self,
        pc_type: PcType,
        node: PointCode,
        part: u8,
        cause: u8,
        label: &RoutingLabel,
        sls: i32,
    ) {
        for s in self.services() {
            s.received_upu(pc_type, node, part, cause, label, sls);
        }
    }

    /// Layer 3 status notification.
    pub fn notify(&self, network: Option<&Arc<dyn Layer3>>, sls: i32) {
        let net_op = network.map_or(false, |n| n.operational(None));
        let link_op = match network {
            Some(n) if sls >= 0 => n.operational(Some(sls as u8)),
            _ => true,
        };
        let first_link = network
            .and_then(|n| n.links_active())
            .map_or(true, |active| active <= 1);
        tracing::debug!(
            "{}: notified {} on sls {}",
            self.name,
            network.map_or("no-net", |n| if net_op { "net-up" } else { "net-down" }),
            sls
        );
        let mut use_me = false;
        let mut do_restart = false;
        let mut send_tra = false;
        let mut do_check = false;
        {
            let mut st = self.state.lock().unwrap();
            if network.is_some() {
                if net_op {
                    if st.isolate.started() {
                        tracing::info!("{}: isolation ended before shutting down", self.name);
                        st.isolate.stop();
                    }
                    if st.started {
                        // TRA only towards the first activated link
                        send_tra = link_op && first_link;
                    } else {
                        if !st.restart.started() {
                            do_restart = true;
                        }
                        use_me = true;
                    }
                } else {
                    do_check = true;
                }
            }
        }
        if do_restart {
            self.restart();
        }
        if send_tra {
            self.send_restart(network);
        }
        if do_check {
            self.check_routes(network, Instant::now());
        }
        let me = self.self_layer3();
        let mngmt = self.management();
        for s in self.services() {
            let is_mngmt = mngmt.as_ref().map_or(false, |m| same_object(m, &s));
            if use_me && !is_mngmt {
                s.notify(me.as_ref(), -1);
            } else {
                s.notify(network, sls);
            }
        }
    }

    /// Verify that at least one adjacent route is operational; when not,
    /// force-resume candidate links and start the isolation timer.
    pub fn check_routes(&self, no_resume: Option<&Arc<dyn Layer3>>, now: Instant) {
        {
            let mut st = self.state.lock().unwrap();
            if st.isolate.started() {
                return;
            }
            st.check_routes = false;
        }
        let flags = self.flags();
        let mut isolated = true;
        let mut adverts = Vec::new();
        {
            let mut tbl = self.routes.lock().unwrap();
            let mut changed = Vec::new();
            for t in PcType::ALL {
                for route in tbl.routes_mut(t).iter_mut() {
                    if route.operational(None) {
                        isolated = false;
                    } else if route.state != RouteState::Prohibited {
                        route.state = RouteState::Prohibited;
                        changed.push((t, route.packed));
                    }
                }
            }
            for (t, packed) in changed {
                adverts.extend(self.collect_adverts(&tbl, flags, t, packed, None));
            }
        }
        self.execute_mngmt(adverts);
        if !isolated {
            return;
        }
        tracing::warn!("{}: node has become isolated", self.name);
        self.state.lock().unwrap().isolate.start(now);
        // emergency: try to uninhibit and resume every possible link
        for n in self.networks() {
            if no_resume.map_or(false, |x| same_object(&n, x)) {
                continue;
            }
            let mut ctl = CtlParams::new("resume");
            ctl.set("automatic", "true");
            ctl.set("emergency", "true");
            n.control(&ctl);
            if !self.state.lock().unwrap().isolate.started() {
                break;
            }
        }
    }

    /// Fold a state reported by an adjacent node into the route and
    /// advertise the change.
    pub fn set_route_specific_state(
        &self,
        pc_type: PcType,
        packed: u32,
        src_pc: u32,
        state: RouteState,
    ) -> bool {
        if packed == 0 || src_pc == 0 {
            return false;
        }
        let mut advertise = false;
        {
            let mut tbl = self.routes.lock().unwrap();
            let Some(best) = tbl.fold_specific_state(pc_type, packed, src_pc, state) else {
                return false;
            };
            let Some(route) = tbl.find_mut(pc_type, packed) else {
                return false;
            };
            if best != route.state {
                route.state = best;
                tracing::debug!(
                    "{}: destination {}:{} state changed to {}",
                    self.name,
                    pc_type.token(),
                    format_pc(pc_type, packed),
                    best.token()
                );
                if state != RouteState::Unknown {
                    advertise = true;
                }
            }
        }
        if advertise {
            self.route_changed(pc_type, packed, None);
        }
        true
    }

    /// Set the merged state of a route directly.
    pub fn set_route_state(&self, pc_type: PcType, packed: u32, state: RouteState) -> bool {
        {
            let mut tbl = self.routes.lock().unwrap();
            let Some(route) = tbl.find_mut(pc_type, packed) else {
                return false;
            };
            if route.state == state {
                return true;
            }
            route.state = state;
        }
        if state != RouteState::Unknown {
            self.route_changed(pc_type, packed, None);
        }
        true
    }

    pub fn get_route_state(&self, pc_type: PcType, packed: u32) -> RouteState {
        self.routes
            .lock()
            .unwrap()
            .find(pc_type, packed)
            .map(|r| r.state)
            .unwrap_or(RouteState::Unknown)
    }

    /// Advertise a changed route to the other adjacent nodes.
    fn route_changed(&self, pc_type: PcType, packed: u32, only_apc: Option<u32>) {
        let flags = self.flags();
        let adverts = {
            let tbl = self.routes.lock().unwrap();
            self.collect_adverts(&tbl, flags, pc_type, packed, only_apc)
        };
        self.execute_mngmt(adverts);
    }

    /// Build the advertisement controls for one changed route: only an
    /// STP in Started/Phase2 advertises, Phase2 only Prohibited, never
    /// back towards a network the route runs over, and each local point
    /// code is used at most once per adjacent route.
    fn collect_adverts(
        &self,
        tbl: &RouteTable,
        flags: Flags,
        pc_type: PcType,
        packed: u32,
        only_apc: Option<u32>,
    ) -> Vec<CtlParams> {
        let mut out = Vec::new();
        if !(flags.transfer && (flags.started || flags.phase2)) {
            return out;
        }
        let Some(route) = tbl.find(pc_type, packed) else {
            return out;
        };
        if route.state == RouteState::Unknown {
            return out;
        }
        if route.state != RouteState::Prohibited && !flags.started {
            return out;
        }
        let dest = format_pc(pc_type, packed);
        for r in tbl.routes(pc_type) {
            // only different adjacent nodes
            if r.packed == packed || r.priority != 0 {
                continue;
            }
            if only_apc.is_some_and(|apc| apc != r.packed) {
                continue;
            }
            let mut local = tbl.locals[pc_type.index()];
            for n in r.network_refs() {
                if !n.operational(None) {
                    continue;
                }
                if route.has_network(&n) {
                    tracing::debug!(
                        "{}: not advertising route {} back on '{}'",
                        self.name,
                        dest,
                        n.name()
                    );
                    continue;
                }
                let mut net_local = n.get_local(pc_type);
                if net_local == 0 {
                    net_local = local;
                }
                if net_local == 0 {
                    continue;
                }
                if local == net_local {
                    local = 0;
                }
                let mut ctl = CtlParams::new(route.state.token());
                ctl.set(
                    "address",
                    format!(
                        "{},{},{}",
                        pc_type.token(),
                        format_pc(pc_type, net_local),
                        format_pc(pc_type, r.packed)
                    ),
                );
                ctl.set("destination", dest.clone());
                ctl.set("automatic", "true");
                tracing::debug!(
                    "{}: advertising route {} {} via {}",
                    self.name,
                    dest,
                    route.state.token(),
                    format_pc(pc_type, r.packed)
                );
                out.push(ctl);
            }
        }
        out
    }

    /// Advertise every route matching the state mask, optionally only
    /// to a single adjacent node.
    pub fn notify_routes(&self, states: u8, only_pc: Option<(PcType, u32)>) {
        let flags = self.flags();
        let mut adverts = Vec::new();
        {
            let tbl = self.routes.lock().unwrap();
            for t in PcType::ALL {
                for route in tbl.routes(t) {
                    if route.state.mask() & states == 0 {
                        continue;
                    }
                    let apc = match only_pc {
                        Some((ot, apc)) => {
                            if ot != t {
                                continue;
                            }
                            Some(apc)
                        }
                        None => None,
                    };
                    adverts.extend(self.collect_adverts(&tbl, flags, t, route.packed, apc));
                }
            }
        }
        self.execute_mngmt(adverts);
    }

    /// Send traffic-restart-allowed towards adjacent nodes, or only the
    /// given network.
    pub fn send_restart(&self, only: Option<&Arc<dyn Layer3>>) {
        let mut ctls = Vec::new();
        {
            let tbl = self.routes.lock().unwrap();
            for t in PcType::ALL {
                for r in tbl.routes(t) {
                    if r.priority != 0 {
                        continue;
                    }
                    let mut local = tbl.locals[t.index()];
                    for n in r.network_refs() {
                        if only.map_or(false, |o| !same_object(&n, o)) {
                            continue;
                        }
                        if !n.operational(None) {
                            continue;
                        }
                        let mut net_local = n.get_local(t);
                        if net_local == 0 {
                            net_local = local;
                        }
                        if net_local == 0 {
                            continue;
                        }
                        if local == net_local {
                            local = 0;
                        }
                        let mut ctl = CtlParams::new("restart");
                        ctl.set(
                            "address",
                            format!(
                                "{},{},{}",
                                t.token(),
                                format_pc(t, net_local),
                                format_pc(t, r.packed)
                            ),
                        );
                        ctl.set("automatic", "true");
                        tracing::debug!(
                            "{}: sending restart allowed to {}",
                            self.name,
                            format_pc(t, r.packed)
                        );
                        ctls.push(ctl);
                        if only.is_some() {
                            break;
                        }
                    }
                }
            }
        }
        self.execute_mngmt(ctls);
    }

    /// Periodic route testing of prohibited/restricted destinations.
    pub fn send_route_test(&self) {
        let flags = self.flags();
        let mut ctls = Vec::new();
        {
            let tbl = self.routes.lock().unwrap();
            for t in PcType::ALL {
                for route in tbl.routes(t) {
                    // adjacent routes are not tested this way
                    if route.priority == 0 {
                        continue;
                    }
                    let oper = match route.state {
                        RouteState::Prohibited => "test-prohibited",
                        RouteState::Restricted if flags.test_restricted => "test-restricted",
                        _ => continue,
                    };
                    let mut local = tbl.locals[t.index()];
                    for n in route.network_refs() {
                        if !n.operational(None) {
                            continue;
                        }
                        let mut net_local = n.get_local(t);
                        if net_local == 0 {
                            net_local = local;
                        }
                        if net_local == 0 {
                            continue;
                        }
                        let remote = tbl
                            .routes(t)
                            .iter()
                            .find(|r2| r2.priority == 0 && r2.has_network(&n))
                            .map(|r2| r2.packed);
                        let Some(remote) = remote else {
                            continue;
                        };
                        if local == net_local {
                            local = 0;
                        }
                        let mut ctl = CtlParams::new(oper);
                        ctl.set(
                            "address",
                            format!(
                                "{},{},{}",
                                t.token(),
                                format_pc(t, net_local),
                                format_pc(t, remote)
                            ),
                        );
                        ctl.set("destination", format_pc(t, route.packed));
                        ctl.set("automatic", "true");
                        ctls.push(ctl);
                    }
                }
            }
        }
        self.execute_mngmt(ctls);
    }

    fn execute_mngmt(&self, ctls: Vec<CtlParams>) {
        if ctls.is_empty() {
            return;
        }
        let Some(snm) = self.management() else {
            return;
        };
        for ctl in ctls {
            snm.control(&ctl);
        }
    }

    /// Find the adjacent network for a link label and inhibit it. With
    /// `not_last` the request is refused when it would take down the
    /// last active link of the network.
    pub fn inhibit(&self, link_lbl: &RoutingLabel, set: u8, clr: u8, not_last: bool) -> bool {
        let remote = link_lbl.dpc.pack(link_lbl.pc_type);
        if remote == 0 {
            return false;
        }
        for n in self.networks() {
            if !matches!(n.route_priority(link_lbl.pc_type, remote), Some(0)) {
                continue;
            }
            if not_last && set != 0 {
                if let Some(active) = n.links_active() {
                    if active <= 1 && !n.inhibited(link_lbl.sls() as i32, link::ANY) {
                        return false;
                    }
                }
            }
            return n.inhibit(link_lbl.sls() as i32, set, clr);
        }
        false
    }

    pub fn inhibited(&self, link_lbl: &RoutingLabel, flags: u8) -> bool {
        let remote = link_lbl.dpc.pack(link_lbl.pc_type);
        if remote == 0 {
            return false;
        }
        for n in self.networks() {
            if !matches!(n.route_priority(link_lbl.pc_type, remote), Some(0)) {
                continue;
            }
            return n.inhibited(link_lbl.sls() as i32, flags);
        }
        false
    }

    /// Last received sequence of the link towards `label.dpc`, for
    /// changeover.
    pub fn get_sequence(&self, link_lbl: &RoutingLabel) -> Option<u32> {
        let remote = link_lbl.dpc.pack(link_lbl.pc_type);
        if remote == 0 {
            return None;
        }
        for n in self.networks() {
            if !matches!(n.route_priority(link_lbl.pc_type, remote), Some(0)) {
                continue;
            }
            return n.get_sequence(link_lbl.sls() as i32);
        }
        None
    }

    /// Flush the retransmission queue of the link towards `label.dpc`.
    pub fn recover_msu(&self, link_lbl: &RoutingLabel, seq: u32) {
        let remote = link_lbl.dpc.pack(link_lbl.pc_type);
        if remote == 0 {
            return;
        }
        for n in self.networks() {
            if !matches!(n.route_priority(link_lbl.pc_type, remote), Some(0)) {
                continue;
            }
            n.recover_msu(link_lbl.sls() as i32, seq);
            return;
        }
    }

    pub fn get_local(&self, pc_type: PcType) -> u32 {
        self.routes.lock().unwrap().locals[pc_type.index()]
    }

    /// The local point code to use by default: the router's own, or the
    /// single unambiguous one among the attached networks.
    pub fn get_default_local(&self, pc_type: PcType) -> u32 {
        let mut local = self.get_local(pc_type);
        if local == 0 {
            for n in self.networks() {
                let l = n.get_local(pc_type);
                if l != 0 && local != 0 {
                    return 0;
                }
                if l != 0 {
                    local = l;
                }
            }
        }
        local
    }

    pub fn get_ni(&self, pc_type: PcType, default_ni: u8) -> u8 {
        for n in self.networks() {
            if n.get_local(pc_type) != 0 || !n.get_routes(pc_type).is_empty() {
                return n.get_ni(pc_type, default_ni);
            }
        }
        default_ni
    }

    pub fn operational(&self, sls: Option<u8>) -> bool {
        {
            let st = self.state.lock().unwrap();
            if !st.started || st.isolate.started() {
                return false;
            }
        }
        self.networks().iter().any(|n| n.operational(sls))
    }

    /// Control entry point; see the module docs for the operation set.
    pub fn control(&self, params: &CtlParams) -> bool {
        let Some(op) = params.operation() else {
            return false;
        };
        let Some((_, cmd)) = CTL_OPS.iter().find(|(t, _)| *t == op) else {
            tracing::debug!("{}: unimplemented control '{}'", self.name, op);
            return false;
        };
        {
            let mut st = self.state.lock().unwrap();
            st.send_unavail = params.get_bool("sendupu", st.send_unavail);
            st.send_prohibited = params.get_bool("sendtfp", st.send_prohibited);
        }
        match *cmd {
            Ctl::Pause => {
                self.disable();
                true
            }
            Ctl::Resume => {
                {
                    let st = self.state.lock().unwrap();
                    if st.started || st.restart.started() {
                        return true;
                    }
                }
                self.restart()
            }
            Ctl::Restart => self.restart(),
            Ctl::Traffic => {
                self.send_restart(None);
                self.operational(None)
            }
            Ctl::Status => self.operational(None),
            Ctl::Advertise => {
                let flags = self.flags();
                if !(flags.transfer && (flags.started || flags.phase2)) {
                    return false;
                }
                self.notify_routes(ANY_STATE, None);
                true
            }
            Ctl::Route(cmd) => self.control_route_cmd(cmd, params),
        }
    }

    fn control_route_cmd(&self, cmd: SnmType, params: &CtlParams) -> bool {
        let automatic = params.get_bool("automatic", false);
        let Some(pc_type) = params.get("pointcodetype").and_then(PcType::from_token) else {
            if !automatic {
                tracing::warn!("{}: control error: missing 'pointcodetype'", self.name);
            }
            return false;
        };
        let Some(dest) = params.get("destination") else {
            if !automatic {
                tracing::warn!("{}: control error: missing 'destination'", self.name);
            }
            return false;
        };
        let Some(pc) = PointCode::parse(pc_type, dest) else {
            if !automatic {
                tracing::warn!("{}: control error: invalid destination '{}'", self.name, dest);
            }
            return false;
        };
        let packed = pc.pack(pc_type);
        if matches!(cmd, SnmType::Rst | SnmType::Rsr) {
            let state = self.get_route_state(pc_type, packed);
            if state == RouteState::Unknown {
                return false;
            }
            if route_state_of(cmd) == state {
                return true;
            }
            // the tested state no longer holds: answer the current one
            let flags = self.flags();
            if !(flags.transfer && flags.started) {
                return false;
            }
            let Some(addr) = params.get("back-address").or_else(|| params.get("address"))
            else {
                if !automatic {
                    tracing::warn!("{}: control error: missing 'address'", self.name);
                }
                return false;
            };
            let mut ctl = CtlParams::new(state.token());
            ctl.set("address", addr);
            ctl.set("destination", dest);
            ctl.set("automatic", "true");
            tracing::debug!("{}: advertising {} {} to {}", self.name, dest, state.token(), addr);
            self.execute_mngmt(vec![ctl]);
            return true;
        }
        let src = params.get("source").map(str::to_string).or_else(|| {
            params
                .get("address")
                .and_then(|a| a.split(',').nth(1))
                .map(str::to_string)
        });
        if let Some(src) = src {
            let Some(opc) = PointCode::parse(pc_type, &src) else {
                if !automatic {
                    tracing::warn!("{}: control error: invalid source '{}'", self.name, src);
                }
                return false;
            };
            if !self.set_route_specific_state(pc_type, packed, opc.pack(pc_type), route_state_of(cmd))
            {
                if !automatic {
                    tracing::warn!(
                        "{}: control error: no such route {} from {}",
                        self.name,
                        dest,
                        src
                    );
                }
                return false;
            }
            true
        } else {
            if !self.set_route_state(pc_type, packed, route_state_of(cmd)) {
                if !automatic {
                    tracing::warn!("{}: control error: no such route {}", self.name, dest);
                }
                return false;
            }
            // a restarted node: advertise every route to it
            if cmd == SnmType::Tra {
                let flags = self.flags();
                if flags.transfer && flags.started {
                    self.notify_routes(ANY_STATE, Some((pc_type, packed)));
                }
            }
            true
        }
    }
}

/// Mirror of the layer 3 contract so a router can stack under another
/// router or be handed to user parts in notifications.
impl Layer3 for Router {
    fn name(&self) -> &str {
        &self.name
    }

    fn operational(&self, sls: Option<u8>) -> bool {
        Router::operational(self, sls)
    }

    fn inhibited(&self, _sls: i32, _flags: u8) -> bool {
        false
    }

    fn inhibit(&self, _sls: i32, _set: u8, _clr: u8) -> bool {
        false
    }

    fn get_local(&self, pc_type: PcType) -> u32 {
        Router::get_local(self, pc_type)
    }

    fn get_ni(&self, pc_type: PcType, default_ni: u8) -> u8 {
        Router::get_ni(self, pc_type, default_ni)
    }

    fn route_priority(&self, pc_type: PcType, packed: u32) -> Option<u32> {
        self.routes.lock().unwrap().find(pc_type, packed).map(|r| r.priority)
    }

    fn get_routes(&self, pc_type: PcType) -> Vec<NetRoute> {
        let tbl = self.routes.lock().unwrap();
        tbl.routes(pc_type)
            .iter()
            .map(|r| NetRoute { packed: r.packed, priority: r.priority, state: r.state })
            .collect()
    }

    fn transmit(&self, msu: &Msu, label: &RoutingLabel, sls: i32) -> Option<u8> {
        Router::transmit(self, msu, label, sls)
    }

    fn control(&self, params: &CtlParams) -> bool {
        Router::control(self, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::msu::SIF_ISUP;
    use std::collections::HashMap;

    struct TestNet {
        name: String,
        local: u32,
        routes: Mutex<Vec<(u32, u32)>>,
        up: Mutex<bool>,
        inhibits: Mutex<HashMap<i32, u8>>,
        sent: Mutex<Vec<(Msu, RoutingLabel, i32)>>,
        controls: Mutex<Vec<CtlParams>>,
    }

    impl TestNet {
        fn new(name: &str, local: u32, routes: &[(u32, u32)]) -> Arc<TestNet> {
            Arc::new(TestNet {
                name: name.into(),
                local,
                routes: Mutex::new(routes.to_vec()),
                up: Mutex::new(true),
                inhibits: Mutex::new(HashMap::new()),
                sent: Mutex::new(Vec::new()),
                controls: Mutex::new(Vec::new()),
            })
        }

        fn set_up(&self, up: bool) {
            *self.up.lock().unwrap() = up;
        }

        fn sent_headings(&self) -> Vec<u8> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(msu, label, _)| msu.at(label.length() + 1))
                .collect()
        }
    }

    impl Layer3 for TestNet {
        fn name(&self) -> &str {
            &self.name
        }
        fn operational(&self, _sls: Option<u8>) -> bool {
            *self.up.lock().unwrap()
        }
        fn inhibited(&self, sls: i32, flags: u8) -> bool {
            self.inhibits.lock().unwrap().get(&sls).map_or(false, |f| f & flags != 0)
        }
        fn inhibit(&self, sls: i32, set: u8, clr: u8) -> bool {
            let mut inhibits = self.inhibits.lock().unwrap();
            let entry = inhibits.entry(sls).or_insert(0);
            *entry = (*entry | set) & !clr;
            true
        }
        fn get_local(&self, pc_type: PcType) -> u32 {
            if pc_type == PcType::Itu {
                self.local
            } else {
                0
            }
        }
        fn route_priority(&self, pc_type: PcType, packed: u32) -> Option<u32> {
            if pc_type != PcType::Itu {
                return None;
            }
            self.routes.lock().unwrap().iter().find(|(p, _)| *p == packed).map(|(_, pr)| *pr)
        }
        fn get_routes(&self, pc_type: PcType) -> Vec<NetRoute> {
            if pc_type != PcType::Itu {
                return Vec::new();
            }
            self.routes
                .lock()
                .unwrap()
                .iter()
                .map(|(p, pr)| NetRoute::new(*p, *pr))
                .collect()
        }
        fn transmit(&self, msu: &Msu, label: &RoutingLabel, sls: i32) -> Option<u8> {
            if !*self.up.lock().unwrap() {
                return None;
            }
            self.sent.lock().unwrap().push((msu.clone(), *label, sls));
            Some(sls.max(0) as u8)
        }
        fn control(&self, params: &CtlParams) -> bool {
            self.controls.lock().unwrap().push(params.clone());
            true
        }
    }

    fn stp_config(local: &str) -> RouterConfig {
        RouterConfig {
            transfer: true,
            autostart: false,
            start_time_ms: 5000,
            local: vec![format!("ITU,{}", local)],
            ..RouterConfig::default()
        }
    }

    fn sn_config(local: &str) -> RouterConfig {
        RouterConfig {
            autostart: false,
            start_time_ms: 5000,
            local: vec![format!("ITU,{}", local)],
            ..RouterConfig::default()
        }
    }

    const LOCAL: &str = "1-1-1";

    fn start(router: &Arc<Router>) {
        router.restart();
        let t0 = Instant::now();
        router.timer_tick(t0 + Duration::from_secs(5));
        router.timer_tick(t0 + Duration::from_secs(10));
        assert!(router.started());
    }

    fn itu_label(dpc: u32, opc: u32, sls: u8) -> RoutingLabel {
        RoutingLabel::new(PcType::Itu, PointCode::new(dpc), PointCode::new(opc), sls, 0)
    }

    #[test]
    fn attach_detach_restores_route_table() {
        let router = Router::new(&sn_config(LOCAL));
        let net = TestNet::new("a", 10, &[(10, 0), (99, 1)]);
        let arc: Arc<dyn Layer3> = net.clone();
        assert!(Layer3::get_routes(&*router, PcType::Itu).is_empty());
        router.attach_network(&arc);
        assert_eq!(Layer3::get_routes(&*router, PcType::Itu).len(), 2);
        // attaching twice stays idempotent
        router.attach_network(&arc);
        assert_eq!(Layer3::get_routes(&*router, PcType::Itu).len(), 2);
        router.detach_network(&arc);
        assert!(Layer3::get_routes(&*router, PcType::Itu).is_empty());
    }

    #[test]
    fn management_traffic_ignores_route_state() {
        let router = Router::new(&sn_config(LOCAL));
        let net = TestNet::new("a", 10, &[(50, 0)]);
        let arc: Arc<dyn Layer3> = net.clone();
        router.attach_network(&arc);
        router.set_route_state(PcType::Itu, 50, RouteState::Prohibited);
        let label = itu_label(50, 10, 0);
        let snm_msu = Msu::build(Msu::make_sio(0, 0, SIF_SNM), &label, &[0x17]);
        assert!(Router::transmit(&router, &snm_msu, &label, 0).is_some());
        let isup_msu = Msu::build(Msu::make_sio(0, 0, SIF_ISUP), &label, &[1, 2]);
        assert!(Router::transmit(&router, &isup_msu, &label, 0).is_none());
    }

    #[test]
    fn stp_forwarding_under_prohibited_returns_no_address() {
        let router = Router::new(&stp_config(LOCAL));
        let from = TestNet::new("from", 0, &[(7, 0)]);
        let dest = TestNet::new("dest", 0, &[(50, 0)]);
        let from_arc: Arc<dyn Layer3> = from.clone();
        let dest_arc: Arc<dyn Layer3> = dest.clone();
        router.attach_network(&from_arc);
        router.attach_network(&dest_arc);
        start(&router);
        router.set_route_state(PcType::Itu, 50, RouteState::Prohibited);
        dest.sent.lock().unwrap().clear();
        let label = itu_label(50, 7, 2);
        let msu = Msu::build(Msu::make_sio(0, 0, SIF_ISUP), &label, &[0xaa]);
        let handled = router.received(&msu, &label, Some(&from_arc), 2);
        assert_eq!(handled, HandledMsu::NoAddress);
        assert!(dest.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn local_destination_without_user_part_is_unequipped() {
        let router = Router::new(&sn_config(LOCAL));
        let net = TestNet::new("a", 0, &[(10, 0)]);
        let arc: Arc<dyn Layer3> = net.clone();
        router.attach_network(&arc);
        let local = router.get_local(PcType::Itu);
        let label = itu_label(local, 10, 0);
        let msu = Msu::build(Msu::make_sio(0, 0, SIF_ISUP), &label, &[0x01]);
        assert_eq!(router.received(&msu, &label, Some(&arc), 0), HandledMsu::Unequipped);
        // with UPU reporting disabled the drop is silent
        let mut cfg = sn_config(LOCAL);
        cfg.send_upu = false;
        let router = Router::new(&cfg);
        router.attach_network(&arc);
        assert_eq!(router.received(&msu, &label, Some(&arc), 0), HandledMsu::Failure);
    }

    #[test]
    fn split_horizon_advertisement() {
        // A is adjacent to STP 10 and carries the route to 99;
        // B is adjacent to node 20 with no path to 99
        let router = Router::new(&stp_config(LOCAL));
        let a = TestNet::new("a", 0, &[(10, 0), (99, 1)]);
        let b = TestNet::new("b", 0, &[(20, 0)]);
        let a_arc: Arc<dyn Layer3> = a.clone();
        let b_arc: Arc<dyn Layer3> = b.clone();
        router.attach_network(&a_arc);
        router.attach_network(&b_arc);
        start(&router);
        a.sent.lock().unwrap().clear();
        b.sent.lock().unwrap().clear();
        // A reports transfer-prohibited for 99
        let mut ctl = CtlParams::new("prohibit");
        ctl.set("pointcodetype", "ITU");
        ctl.set("destination", format_pc(PcType::Itu, 99));
        ctl.set("source", format_pc(PcType::Itu, 10));
        ctl.set("automatic", "true");
        assert!(router.control(&ctl));
        assert_eq!(router.get_route_state(PcType::Itu, 99), RouteState::Prohibited);
        // the TFP went to B only
        assert_eq!(b.sent_headings(), vec![SnmType::Tfp as u8]);
        assert!(a.sent_headings().is_empty());
    }

    #[test]
    fn restart_completion_sends_tra_and_notifies() {
        let router = Router::new(&sn_config(LOCAL));
        let net = TestNet::new("a", 0, &[(10, 0)]);
        let arc: Arc<dyn Layer3> = net.clone();
        router.attach_network(&arc);
        start(&router);
        // a TRA reached the adjacent node
        assert!(net.sent_headings().contains(&(SnmType::Tra as u8)));
    }

    #[test]
    fn isolation_detection_and_shutdown() {
        let router = Router::new(&sn_config(LOCAL));
        let a = TestNet::new("a", 0, &[(10, 0)]);
        let b = TestNet::new("b", 0, &[(20, 0)]);
        let a_arc: Arc<dyn Layer3> = a.clone();
        let b_arc: Arc<dyn Layer3> = b.clone();
        router.attach_network(&a_arc);
        router.attach_network(&b_arc);
        start(&router);
        a.set_up(false);
        router.notify(Some(&a_arc), -1);
        // B still carries traffic, no isolation yet
        assert!(router.operational(None));
        b.set_up(false);
        router.notify(Some(&b_arc), -1);
        // emergency resume went out to the other network
        let resumes: Vec<CtlParams> = a.controls.lock().unwrap().clone();
        assert!(resumes
            .iter()
            .any(|c| c.operation() == Some("resume") && c.get_bool("emergency", false)));
        assert!(!router.operational(None));
        // both stayed down past the isolation interval
        router.timer_tick(Instant::now() + Duration::from_secs(2));
        assert!(!router.started());
    }

    #[test]
    fn tra_control_marks_route_allowed() {
        let router = Router::new(&sn_config(LOCAL));
        let net = TestNet::new("a", 0, &[(10, 0)]);
        let arc: Arc<dyn Layer3> = net.clone();
        router.attach_network(&arc);
        router.set_route_state(PcType::Itu, 10, RouteState::Prohibited);
        let mut ctl = CtlParams::new("allowed");
        ctl.set("pointcodetype", "ITU");
        ctl.set("destination", format_pc(PcType::Itu, 10));
        ctl.set("automatic", "true");
        assert!(router.control(&ctl));
        assert_eq!(router.get_route_state(PcType::Itu, 10), RouteState::Allowed);
    }

    #[test]
    fn inhibit_respects_last_link_guard() {
        struct OneLink(Arc<TestNet>);
        impl Layer3 for OneLink {
            fn name(&self) -> &str {
                self.0.name()
            }
            fn operational(&self, sls: Option<u8>) -> bool {
                self.0.operational(sls)
            }
            fn inhibited(&self, sls: i32, flags: u8) -> bool {
                self.0.inhibited(sls, flags)
            }
            fn inhibit(&self, sls: i32, set: u8, clr: u8) -> bool {
                self.0.inhibit(sls, set, clr)
            }
            fn get_local(&self, pc_type: PcType) -> u32 {
                self.0.get_local(pc_type)
            }
            fn route_priority(&self, pc_type: PcType, packed: u32) -> Option<u32> {
                self.0.route_priority(pc_type, packed)
            }
            fn get_routes(&self, pc_type: PcType) -> Vec<NetRoute> {
                self.0.get_routes(pc_type)
            }
            fn transmit(&self, msu: &Msu, label: &RoutingLabel, sls: i32) -> Option<u8> {
                self.0.transmit(msu, label, sls)
            }
            fn links_active(&self) -> Option<u32> {
                Some(1)
            }
        }
        let router = Router::new(&sn_config(LOCAL));
        let inner = TestNet::new("one", 0, &[(10, 0)]);
        let net = Arc::new(OneLink(inner.clone()));
        let arc: Arc<dyn Layer3> = net.clone();
        router.attach_network(&arc);
        let lbl = itu_label(10, 5, 0);
        // refusing to take down the last active link
        assert!(!router.inhibit(&lbl, link::INACTIVE, 0, true));
        // without the guard the request goes through
        assert!(router.inhibit(&lbl, link::INACTIVE, 0, false));
        assert!(router.inhibited(&lbl, link::INACTIVE));
    }
}
