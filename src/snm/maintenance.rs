//! Signalling link test maintenance (Q.707).
//!
//! Answers SLTM with an SLTA echoing the test pattern. Pattern length
//! is bounds-checked against the MSU; its content is not interpreted.

use std::sync::{Arc, Mutex, Weak};

use crate::common::label::RoutingLabel;
use crate::common::msu::{Msu, SIF_MTN, SIF_MTNS};
use crate::layers::{HandledMsu, Layer3, Layer4};
use crate::routing::router::Router;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MtnType {
    Sltm = 0x11,
    Slta = 0x21,
}

pub struct Maintenance {
    name: String,
    router: Mutex<Weak<Router>>,
}

impl Maintenance {
    pub fn new() -> Arc<Maintenance> {
        Arc::new(Maintenance {
            name: "ss7mtn".to_string(),
            router: Mutex::new(Weak::new()),
        })
    }

    fn router(&self) -> Option<Arc<Router>> {
        self.router.lock().unwrap().upgrade()
    }
}

impl Layer4 for Maintenance {
    fn name(&self) -> &str {
        &self.name
    }

    fn sif(&self) -> u8 {
        SIF_MTN
    }

    fn attach_router(&self, router: Option<&Arc<Router>>) {
        *self.router.lock().unwrap() = router.map_or_else(Weak::new, Arc::downgrade);
    }

    fn received(
        &self,
        msu: &Msu,
        label: &RoutingLabel,
        network: Option<&Arc<dyn Layer3>>,
        sls: i32,
    ) -> HandledMsu {
        if msu.sif() != SIF_MTN && msu.sif() != SIF_MTNS {
            return HandledMsu::Rejected;
        }
        let t = label.pc_type;
        if let Some(net) = network {
            let local = net.get_local(t);
            if local != 0 && label.dpc.pack(t) != local {
                return HandledMsu::Rejected;
            }
        }
        // heading byte plus the length indicator
        let Some(head) = msu.tail(label.length() + 1).filter(|b| b.len() >= 2) else {
            return HandledMsu::Rejected;
        };
        if label.sls() as i32 != sls {
            tracing::warn!(
                "{}: test message for {},{} received on sls {}",
                self.name,
                t.token(),
                label,
                sls
            );
        }
        let len = (head[1] >> 4) as usize;
        let Some(pattern) = head.get(2..2 + len) else {
            tracing::warn!(
                "{}: MTN {:02x} [{},{}] with invalid pattern length {}",
                self.name,
                head[0],
                t.token(),
                label,
                len
            );
            return HandledMsu::Rejected;
        };
        match head[0] {
            b if b == MtnType::Sltm as u8 => {
                tracing::debug!(
                    "{}: received SLTM [{},{}] with {} bytes",
                    self.name,
                    t.token(),
                    label,
                    len
                );
                let lbl = label.reply(0);
                let mut data = Vec::with_capacity(2 + len);
                data.push(MtnType::Slta as u8);
                data.push((len << 4) as u8);
                data.extend_from_slice(pattern);
                let answer = Msu::build(msu.sio(), &lbl, &data);
                tracing::debug!(
                    "{}: sending SLTA [{},{}] with {} bytes",
                    self.name,
                    t.token(),
                    lbl,
                    len
                );
                let sent = self
                    .router()
                    .and_then(|r| r.transmit(&answer, &lbl, lbl.sls() as i32))
                    .is_some();
                if sent {
                    HandledMsu::Accepted
                } else {
                    HandledMsu::Rejected
                }
            }
            b if b == MtnType::Slta as u8 => {
                tracing::debug!(
                    "{}: received SLTA [{},{}] with {} bytes",
                    self.name,
                    t.token(),
                    label,
                    len
                );
                HandledMsu::Accepted
            }
            other => {
                tracing::info!(
                    "{}: unhandled MTN type {:02x} [{},{}]",
                    self.name,
                    other,
                    t.token(),
                    label
                );
                HandledMsu::Rejected
            }
        }
    }
}
