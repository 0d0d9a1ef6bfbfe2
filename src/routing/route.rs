//! Per-destination routes and the route table.
//!
//! Each route keys on (variant, packed DPC) and keeps the attached
//! networks ordered ascending by the priority each network declares to
//! the destination, stable on ties, adjacent (priority 0) first. The
//! merged route state is folded from the per-network sub-route states
//! kept alongside in the table.

use std::sync::{Arc, Weak};

use crate::common::pointcode::{PcType, PointCode, PC_TYPE_COUNT};
use crate::common::label::RoutingLabel;
use crate::common::msu::Msu;
use crate::layers::{Layer3, NetRoute};

/// Route availability. The numeric values double as mask bits; within
/// the known states a larger value is a less restricted route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RouteState {
    Prohibited = 0x01,
    Restricted = 0x02,
    Congestion = 0x04,
    Allowed = 0x08,
    Unknown = 0x80,
}

/// Mask over the four standard states.
pub const KNOWN_STATE: u8 = 0x0f;
/// Everything except Prohibited; Unknown counts as usable.
pub const NOT_PROHIBITED: u8 = 0x8e;
/// Any state at all (management traffic mask).
pub const ANY_STATE: u8 = 0x8f;

static STATE_TOKENS: &[(&str, RouteState)] = &[
    ("prohibit", RouteState::Prohibited),
    ("unknown", RouteState::Unknown),
    ("restrict", RouteState::Restricted),
    ("congest", RouteState::Congestion),
    ("allow", RouteState::Allowed),
];

impl RouteState {
    pub fn mask(self) -> u8 {
        self as u8
    }

    /// The control-operation token advertising this state.
    pub fn token(self) -> &'static str {
        STATE_TOKENS
            .iter()
            .find(|(_, s)| *s == self)
            .map(|(t, _)| *t)
            .unwrap_or("unknown")
    }

    pub fn from_token(s: &str) -> Option<RouteState> {
        STATE_TOKENS.iter().find(|(t, _)| *t == s).map(|(_, v)| *v)
    }
}

/// A destination route: merged view over the attached networks.
pub struct Route {
    pub packed: u32,
    pub priority: u32,
    pub shift: u32,
    pub state: RouteState,
    networks: Vec<Weak<dyn Layer3>>,
}

impl Route {
    pub fn new(packed: u32, priority: u32, shift: u32) -> Self {
        Self { packed, priority, shift, state: RouteState::Unknown, networks: Vec::new() }
    }

    /// Attach a network or refresh its position. The network's own
    /// priority to the destination decides the slot; unreachable
    /// destinations are rejected.
    pub fn attach(&mut self, network: &Arc<dyn Layer3>, pc_type: PcType) {
        let Some(priority) = network.route_priority(pc_type, self.packed) else {
            return;
        };
        self.detach(network);
        let mut pos = self.networks.len();
        for (i, w) in self.networks.iter().enumerate() {
            let Some(n) = w.upgrade() else { continue };
            let p = n.route_priority(pc_type, self.packed).unwrap_or(u32::MAX);
            if p > priority {
                pos = i;
                break;
            }
        }
        self.networks.insert(pos, Arc::downgrade(network));
    }

    /// Remove a network; returns true when the route has no networks
    /// left (and should be dropped from the table).
    pub fn detach(&mut self, network: &Arc<dyn Layer3>) -> bool {
        self.networks.retain(|w| match w.upgrade() {
            Some(n) => !crate::layers::same_object(&n, network),
            None => false,
        });
        self.networks.is_empty()
    }

    pub fn has_network(&self, network: &Arc<dyn Layer3>) -> bool {
        self.networks
            .iter()
            .filter_map(|w| w.upgrade())
            .any(|n| crate::layers::same_object(&n, network))
    }

    /// True when any attached network is operational on that SLS.
    pub fn operational(&self, sls: Option<u8>) -> bool {
        self.networks
            .iter()
            .filter_map(|w| w.upgrade())
            .any(|n| n.operational(sls))
    }

    /// Upgraded snapshot of the attached networks, in priority order.
    pub fn network_refs(&self) -> Vec<Arc<dyn Layer3>> {
        self.networks.iter().filter_map(|w| w.upgrade()).collect()
    }

    /// Try each network starting at the SLS-derived offset; first
    /// successful transmit wins.
    pub fn transmit(&self, msu: &Msu, label: &RoutingLabel, sls: i32) -> Option<u8> {
        transmit_over(&self.network_refs(), self.shift, msu, label, sls)
    }
}

/// Load-shared transmit over an ordered network snapshot.
pub fn transmit_over(
    nets: &[Arc<dyn Layer3>],
    shift: u32,
    msu: &Msu,
    label: &RoutingLabel,
    sls: i32,
) -> Option<u8> {
    if nets.is_empty() {
        return None;
    }
    let offset = (sls.max(0) as usize >> shift) % nets.len();
    for i in 0..nets.len() {
        let n = &nets[(offset + i) % nets.len()];
        if let Some(used) = n.transmit(msu, label, sls) {
            return Some(used);
        }
    }
    None
}

/// Sub-route: one network's own entry for a destination, with the
/// state last reported relative to that network.
#[derive(Clone, Copy, Debug)]
pub struct SubRoute {
    pub packed: u32,
    pub priority: u32,
    pub state: RouteState,
}

/// Per-network sub-route tables kept by the router.
pub struct NetTables {
    pub network: Weak<dyn Layer3>,
    pub routes: [Vec<SubRoute>; PC_TYPE_COUNT],
}

/// The router's route table: merged routes plus per-network sub-route
/// tables and the local point codes, all guarded by the route mutex.
pub struct RouteTable {
    pub locals: [u32; PC_TYPE_COUNT],
    routes: [Vec<Route>; PC_TYPE_COUNT],
    nets: Vec<NetTables>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            locals: [0; PC_TYPE_COUNT],
            routes: Default::default(),
            nets: Vec::new(),
        }
    }

    pub fn routes(&self, pc_type: PcType) -> &[Route] {
        &self.routes[pc_type.index()]
    }

    pub fn routes_mut(&mut self, pc_type: PcType) -> &mut Vec<Route> {
        &mut self.routes[pc_type.index()]
    }

    pub fn find(&self, pc_type: PcType, packed: u32) -> Option<&Route> {
        self.routes[pc_type.index()].iter().find(|r| r.packed == packed)
    }

    pub fn find_mut(&mut self, pc_type: PcType, packed: u32) -> Option<&mut Route> {
        self.routes[pc_type.index()].iter_mut().find(|r| r.packed == packed)
    }

    /// Find a route whose state matches the mask.
    pub fn find_masked(&self, pc_type: PcType, packed: u32, mask: u8) -> Option<&Route> {
        self.find(pc_type, packed).filter(|r| r.state.mask() & mask != 0)
    }

    /// Merge every route a network advertises, creating routes as
    /// needed, and (re)build its sub-route table.
    pub fn update_routes(&mut self, network: &Arc<dyn Layer3>) {
        self.drop_net_tables(network);
        let mut tables: [Vec<SubRoute>; PC_TYPE_COUNT] = Default::default();
        for t in PcType::ALL {
            for nr in network.get_routes(t) {
                if nr.packed == 0 {
                    continue;
                }
                tables[t.index()].push(SubRoute {
                    packed: nr.packed,
                    priority: nr.priority,
                    state: nr.state,
                });
                let list = &mut self.routes[t.index()];
                let route = match list.iter_mut().find(|r| r.packed == nr.packed) {
                    Some(r) => r,
                    None => {
                        list.push(Route::new(nr.packed, nr.priority, 0));
                        list.last_mut().unwrap()
                    }
                };
                route.attach(network, t);
            }
        }
        self.nets.push(NetTables { network: Arc::downgrade(network), routes: tables });
    }

    /// Remove a network from every route, dropping routes that end up
    /// with no networks, and drop its sub-route table.
    pub fn remove_routes(&mut self, network: &Arc<dyn Layer3>) {
        for t in PcType::ALL {
            self.routes[t.index()].retain_mut(|r| !r.detach(network));
        }
        self.drop_net_tables(network);
    }

    fn drop_net_tables(&mut self, network: &Arc<dyn Layer3>) {
        self.nets.retain(|nt| match nt.network.upgrade() {
            Some(n) => !crate::layers::same_object(&n, network),
            None => false,
        });
    }

    pub fn sub_route_mut(
        &mut self,
        network: &Arc<dyn Layer3>,
        pc_type: PcType,
        packed: u32,
    ) -> Option<&mut SubRoute> {
        let nt = self.nets.iter_mut().find(|nt| match nt.network.upgrade() {
            Some(n) => crate::layers::same_object(&n, network),
            None => false,
        })?;
        nt.routes[pc_type.index()].iter_mut().find(|s| s.packed == packed)
    }

    /// Fold a state reported by `src_pc` for `packed` into the
    /// per-network sub-routes, per Q.704: networks for which the source
    /// is adjacent take the state directly, the others contribute their
    /// own last known state when operational. Returns the resulting
    /// best state, or None when no network had the source adjacent.
    pub fn fold_specific_state(
        &mut self,
        pc_type: PcType,
        packed: u32,
        src_pc: u32,
        state: RouteState,
    ) -> Option<RouteState> {
        let networks = self.find(pc_type, packed)?.network_refs();
        let mut best = state;
        let mut ok = false;
        for n in &networks {
            let Some(sub) = self.sub_route_mut(n, pc_type, packed) else {
                continue;
            };
            if matches!(n.route_priority(pc_type, src_pc), Some(0)) {
                sub.state = state;
                ok = true;
            } else {
                let s = sub.state;
                if (s.mask() & KNOWN_STATE) > best.mask() && n.operational(None) {
                    best = s;
                }
            }
        }
        ok.then_some(best)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Formatting helper used by advertisement builders.
pub fn format_pc(pc_type: PcType, packed: u32) -> String {
    PointCode::new(packed).format(pc_type)
}
