//! Interfaces between the router and its neighbours.
//!
//! A [`Layer3`] is an adjacent signalling network (an MTP3 link set, a
//! SIGTRAN adapter, or another router); a [`Layer4`] is a user part
//! consuming MSUs by service indicator. Both are held by the router as
//! weak references that are upgraded before every upcall, so component
//! lifetimes stay acyclic.

use std::sync::Arc;

use crate::common::label::RoutingLabel;
use crate::common::msu::Msu;
use crate::common::params::CtlParams;
use crate::common::pointcode::{PcType, PointCode};
use crate::routing::route::RouteState;
use crate::routing::router::Router;

/// Link inhibition flags, as kept per SLS by a layer 3.
pub mod link {
    /// Link not yet tested (no SLTA seen).
    pub const UNCHECKED: u8 = 0x01;
    /// Traffic moved away by changeover.
    pub const INACTIVE: u8 = 0x02;
    /// Locally inhibited by management.
    pub const LOCAL: u8 = 0x04;
    /// Remotely inhibited by the adjacent node.
    pub const REMOTE: u8 = 0x08;
    /// Any inhibition.
    pub const ANY: u8 = UNCHECKED | INACTIVE | LOCAL | REMOTE;
}

/// Classification a receiver returns for an inbound MSU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandledMsu {
    /// Not for this receiver, try the next one.
    Rejected,
    /// Consumed or forwarded.
    Accepted,
    /// Destination is local but no user part serves the SIF.
    Unequipped,
    /// User part exists but cannot be reached.
    Inaccessible,
    /// Transfer failed, destination route unknown or prohibited.
    NoAddress,
    /// Dropped silently.
    Failure,
}

/// One route advertised by a layer 3, as seen from its own tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetRoute {
    pub packed: u32,
    pub priority: u32,
    pub state: RouteState,
}

impl NetRoute {
    pub fn new(packed: u32, priority: u32) -> Self {
        Self { packed, priority, state: RouteState::Unknown }
    }
}

/// An adjacent signalling network as consumed by the router.
pub trait Layer3: Send + Sync {
    fn name(&self) -> &str;

    /// Operational status, of the whole network or of one link.
    fn operational(&self, sls: Option<u8>) -> bool;

    /// True when the link carries any of the given inhibition flags.
    fn inhibited(&self, sls: i32, flags: u8) -> bool;

    /// Set and clear inhibition flags on a link.
    fn inhibit(&self, sls: i32, set: u8, clr: u8) -> bool;

    /// Local point code for a variant, packed; 0 if none.
    fn get_local(&self, pc_type: PcType) -> u32;

    /// Network indicator for a variant, raw 0..3.
    fn get_ni(&self, _pc_type: PcType, default_ni: u8) -> u8 {
        default_ni
    }

    /// Priority of this network's route to a destination; None when it
    /// has no route at all. 0 means directly adjacent.
    fn route_priority(&self, pc_type: PcType, packed: u32) -> Option<u32>;

    /// The routes this network advertises for a variant.
    fn get_routes(&self, pc_type: PcType) -> Vec<NetRoute>;

    /// Send an MSU; returns the SLS actually used, None on failure.
    fn transmit(&self, msu: &Msu, label: &RoutingLabel, sls: i32) -> Option<u8>;

    /// Last received sequence number of a link, for changeover.
    fn get_sequence(&self, _sls: i32) -> Option<u32> {
        None
    }

    /// Flush the retransmission queue of a link from `seq` onwards.
    fn recover_msu(&self, _sls: i32, _seq: u32) {}

    /// Number of active links, when the network can tell.
    fn links_active(&self) -> Option<u32> {
        None
    }

    /// Out-of-band control (`resume` with `automatic`/`emergency`, ...).
    fn control(&self, _params: &CtlParams) -> bool {
        false
    }

    /// Back-reference wiring: Some on attach, None on detach.
    fn attach_router(&self, _router: Option<&Arc<Router>>) {}
}

/// A user part consuming MSUs by service indicator.
pub trait Layer4: Send + Sync {
    fn name(&self) -> &str;

    /// Service indicator this user part consumes.
    fn sif(&self) -> u8;

    /// Back-reference wiring: Some on attach, None on detach.
    fn attach_router(&self, _router: Option<&Arc<Router>>) {}

    fn received(
        &self,
        msu: &Msu,
        label: &RoutingLabel,
        network: Option<&Arc<dyn Layer3>>,
        sls: i32,
    ) -> HandledMsu;

    /// Network status notification; `network` is None when the router
    /// itself changed state, `sls` is -1 when no single link is meant.
    fn notify(&self, _network: Option<&Arc<dyn Layer3>>, _sls: i32) {}

    /// User part unavailable indication relayed by the router.
    fn received_upu(
        &self,
        _pc_type: PcType,
        _node: PointCode,
        _part: u8,
        _cause: u8,
        _label: &RoutingLabel,
        _sls: i32,
    ) {
    }
}

/// Compare two trait objects for identity by their data pointer.
pub(crate) fn same_object<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
