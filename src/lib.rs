//! SS7 MTP3 signalling core.
//!
//! Implements the Message Transfer Part level-3 router together with the
//! signalling network management (SNM) and link maintenance (MTN) user
//! parts:
//! - MSU routing between attached networks (layer 3) and user parts
//!   (layer 4), with per-destination route state and SLS load sharing
//! - Q.704 management procedures: changeover/changeback, link
//!   inhibition, transfer-prohibited/restricted/allowed, MTP restart,
//!   route testing and user-part-unavailable indications
//! - Q.707 signalling link test message handling
//!
//! Layer 2 links, transports and the user-part protocols themselves are
//! external: they plug in through the [`layers::Layer3`] and
//! [`layers::Layer4`] traits.

pub mod common;
pub mod layers;
pub mod routing;
pub mod snm;

pub use common::label::RoutingLabel;
pub use common::msu::Msu;
pub use common::params::CtlParams;
pub use common::pointcode::{PcType, PointCode};
pub use layers::{HandledMsu, Layer3, Layer4};
pub use routing::route::RouteState;
pub use routing::router::Router;
pub use snm::maintenance::Maintenance;
pub use snm::management::Snm;
pub use ss7_config::{RouterConfig, StackConfig};
