//! The signalling network management user part.
//!
//! Consumes SIF 0 traffic, runs the Q.704 procedures that answer
//! incoming management messages, emits management messages on behalf of
//! the router's control interface and keeps the pending queue of
//! commands awaiting acknowledgement with their retransmit/expiry
//! deadlines.

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::common::label::RoutingLabel;
use crate::common::msu::{Msu, SIF_MTNS, SIF_SNM};
use crate::common::params::CtlParams;
use crate::common::pointcode::{PcType, PointCode};
use crate::layers::{link, HandledMsu, Layer3, Layer4};
use crate::routing::router::Router;
use crate::snm::msg::{encode_dest, encode_seq, SnmMsg, SnmType};

/// Changeover order retransmit period; with no global timeout the
/// first expiry runs the final action.
const COO_RETRY: Duration = Duration::from_millis(1800);
/// Changeback declaration retransmit period and hard timeout.
const CBD_RETRY: Duration = Duration::from_millis(1000);
const CBD_TIMEOUT: Duration = Duration::from_millis(2000);
/// Grace period for answering a changeover when no sequence is known
/// yet; expiry emits the emergency acknowledgement.
const ECA_GRACE: Duration = Duration::from_millis(200);

static SNM_CTL: &[(&str, SnmType)] = &[
    ("prohibit", SnmType::Tfp),
    ("restrict", SnmType::Tfr),
    ("congest", SnmType::Tfc),
    ("allow", SnmType::Tfa),
    ("restart", SnmType::Tra),
    ("changeover", SnmType::Coo),
    ("changeback", SnmType::Cbd),
    ("link-inhibit", SnmType::Lin),
    ("link-uninhibit", SnmType::Lun),
    ("link-force-uninhibit", SnmType::Lfu),
    ("test-congestion", SnmType::Rct),
    ("test-prohibited", SnmType::Rst),
    ("test-restricted", SnmType::Rsr),
];

/// A management message sent and not yet acknowledged.
struct SnmPending {
    msu: Msu,
    label: RoutingLabel,
    tx_sls: i32,
    interval: Duration,
    fire: Instant,
    global: Option<Instant>,
}

impl SnmPending {
    /// Heading byte of the stored MSU.
    fn snm_type(&self) -> Option<SnmType> {
        self.msu.at(self.label.length() + 1).and_then(SnmType::from_byte)
    }

    /// True when `lbl` is the reversed counterpart of this entry.
    fn matches(&self, lbl: &RoutingLabel) -> bool {
        self.label.opc == lbl.dpc && self.label.dpc == lbl.opc && self.label.sls() == lbl.sls()
    }
}

pub struct Snm {
    name: String,
    router: Mutex<Weak<Router>>,
    pending: Mutex<Vec<SnmPending>>,
}

impl Snm {
    pub fn new() -> Arc<Snm> {
        Arc::new(Snm {
            name: "ss7snm".to_string(),
            router: Mutex::new(Weak::new()),
            pending: Mutex::new(Vec::new()),
        })
    }

    fn router(&self) -> Option<Arc<Router>> {
        self.router.lock().unwrap().upgrade()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    fn transmit_msu(&self, msu: &Msu, label: &RoutingLabel, sls: i32) -> Option<u8> {
        self.router()?.transmit(msu, label, sls)
    }

    fn inhibit_link(&self, lbl: &RoutingLabel, set: u8, clr: u8) -> bool {
        self.router().map_or(false, |r| r.inhibit(lbl, set, clr, false))
    }

    fn recover(&self, lbl: &RoutingLabel, seq: u32) {
        if let Some(r) = self.router() {
            r.recover_msu(lbl, seq);
        }
    }

    fn insert_pending(&self, entry: SnmPending) {
        let mut pending = self.pending.lock().unwrap();
        let pos = pending.iter().position(|p| p.fire > entry.fire).unwrap_or(pending.len());
        pending.insert(pos, entry);
    }

    fn take_pending<F: Fn(&SnmPending) -> bool>(&self, pred: F) -> Option<SnmPending> {
        let mut pending = self.pending.lock().unwrap();
        let pos = pending.iter().position(pred)?;
        Some(pending.remove(pos))
    }

    /// Queue a message for retransmission/expiry. With a zero interval
    /// nothing is sent now; otherwise the queue entry is only created
    /// when the initial transmit went out.
    fn postpone(
        &self,
        msu: Msu,
        label: &RoutingLabel,
        tx_sls: i32,
        interval: Duration,
        global: Duration,
        now: Instant,
    ) -> bool {
        if interval.is_zero() || self.transmit_msu(&msu, label, tx_sls).is_some() {
            self.insert_pending(SnmPending {
                fire: now + interval,
                global: (!global.is_zero()).then(|| now + global),
                msu,
                label: *label,
                tx_sls,
                interval,
            });
            return true;
        }
        tracing::debug!("{}: could not postpone message to {}", self.name, label);
        false
    }

    /// Evaluate the pending queue: expired entries run their final
    /// action, due entries are retransmitted and re-queued. Entries
    /// re-queued by this tick only fire again on the next one.
    pub fn timer_tick(&self, now: Instant) {
        let due = {
            let mut pending = self.pending.lock().unwrap();
            let mut due = Vec::new();
            while pending.first().map_or(false, |p| p.fire <= now) {
                due.push(pending.remove(0));
            }
            due
        };
        for mut msg in due {
            let expired = msg.global.map_or(true, |g| now >= g);
            if expired {
                tracing::info!(
                    "{}: expired {} control sequence to {},{}",
                    self.name,
                    msg.snm_type().map_or("?", |t| t.name()),
                    msg.label.pc_type.token(),
                    msg.label
                );
                self.final_timeout(&msg);
            } else {
                self.transmit_msu(&msg.msu, &msg.label, msg.tx_sls);
                msg.fire = now + msg.interval;
                self.insert_pending(msg);
            }
        }
    }

    /// Final action by original message type.
    fn final_timeout(&self, msg: &SnmPending) {
        let link_name = format!("{},{}", msg.label.pc_type.token(), msg.label);
        match msg.snm_type() {
            Some(SnmType::Coo) | Some(SnmType::Xco) | Some(SnmType::Eco) => {
                tracing::info!("{}: changeover timed out on {}", self.name, link_name);
                self.inhibit_link(&msg.label, link::INACTIVE, 0);
            }
            Some(SnmType::Eca) => {
                tracing::info!(
                    "{}: emergency changeover acknowledge on {}",
                    self.name,
                    link_name
                );
                self.transmit_msu(&msg.msu, &msg.label, msg.tx_sls);
            }
            Some(SnmType::Cbd) => {
                tracing::info!("{}: changeback timed out on {}", self.name, link_name);
                self.inhibit_link(&msg.label, 0, link::INACTIVE);
            }
            _ => {}
        }
    }

    fn rx(
        &self,
        msu: &Msu,
        label: &RoutingLabel,
        network: Option<&Arc<dyn Layer3>>,
        sls: i32,
    ) -> HandledMsu {
        if msu.sif() != SIF_SNM {
            return HandledMsu::Rejected;
        }
        let t = label.pc_type;
        if let Some(net) = network {
            let local = net.get_local(t);
            if local != 0 && label.dpc.pack(t) != local {
                return HandledMsu::Rejected;
            }
        }
        let router = self.router();
        if let Some(r) = &router {
            let local = r.get_local(t);
            if local != 0 && label.dpc.pack(t) != local {
                return HandledMsu::Rejected;
            }
        }
        let Some(buf) = msu.tail(label.length() + 1) else {
            return HandledMsu::Rejected;
        };
        if buf.is_empty() {
            return HandledMsu::Rejected;
        }
        let Some(msg_type) = SnmType::from_byte(buf[0]) else {
            tracing::info!(
                "{}: unhandled SNM heading {:02x} label {},{}",
                self.name,
                buf[0],
                t.token(),
                label
            );
            return HandledMsu::Accepted;
        };
        let msg = SnmMsg::parse(msg_type, t, &buf[1..]);
        tracing::debug!(
            "{}: received {} [{},{}] {} bytes on {}",
            self.name,
            msg_type.name(),
            t.token(),
            label,
            buf.len(),
            sls
        );
        match msg_type {
            SnmType::Tfp | SnmType::Tfr | SnmType::Tfa | SnmType::Tfc => {
                self.rx_transfer(&msg, label, router.as_ref())
            }
            SnmType::Tra => {
                let dest = label.opc.format(t);
                tracing::info!(
                    "{}: TRA [{},{}]: traffic can restart to {}",
                    self.name,
                    t.token(),
                    label,
                    dest
                );
                if let Some(r) = &router {
                    let mut ctl = CtlParams::new("allowed");
                    ctl.copy_from(&msg.params);
                    ctl.set("destination", dest);
                    ctl.set("automatic", "true");
                    r.control(&ctl);
                }
                HandledMsu::Accepted
            }
            SnmType::Coo | SnmType::Xco | SnmType::Eco => {
                self.rx_changeover(&msg, msu, label, sls)
            }
            SnmType::Coa | SnmType::Xca | SnmType::Eca => self.rx_changeover_ack(&msg, label),
            SnmType::Cbd => self.rx_changeback(msu, label, &buf[1..], sls),
            SnmType::Cba => self.rx_changeback_ack(msu, label, &buf[1..]),
            SnmType::Lin => {
                let lbl = label.reply(0);
                let Some(r) = &router else {
                    return HandledMsu::Accepted;
                };
                let reply = if r.inhibit(&lbl, link::REMOTE, 0, true) {
                    SnmType::Lia
                } else {
                    SnmType::Lid
                };
                let answer = Msu::build(msu.sio(), &lbl, &[reply as u8]);
                self.accepted_if_sent(&answer, &lbl, sls)
            }
            SnmType::Lun | SnmType::Lfu => {
                let lbl = label.reply(0);
                if let Some(r) = &router {
                    if r.inhibit(&lbl, 0, link::REMOTE, false) {
                        let answer = Msu::build(msu.sio(), &lbl, &[SnmType::Lua as u8]);
                        return self.accepted_if_sent(&answer, &lbl, sls);
                    }
                }
                HandledMsu::Accepted
            }
            SnmType::Upu => {
                tracing::info!(
                    "{}: unavailable part {} at {}, cause {}",
                    self.name,
                    msg.params.get_or("part", "?"),
                    msg.params.get_or("destination", "?"),
                    msg.params.get_or("cause", "?")
                );
                if let Some(r) = &router {
                    let part = msg.params.get_int("part", -1);
                    let cause = msg.params.get_int("cause", -1);
                    let pc = msg
                        .params
                        .get("destination")
                        .and_then(|d| PointCode::parse(t, d));
                    if let Some(pc) = pc {
                        if part > SIF_MTNS as i64 && part <= 0x0f && (0..=0x0f).contains(&cause)
                        {
                            r.received_upu(t, pc, part as u8, cause as u8, label, sls);
                        }
                    }
                }
                HandledMsu::Accepted
            }
            SnmType::Rst | SnmType::Rsr => {
                // a neighbour probes one of our route states; have the
                // router answer with the current state when it moved on
                let Some(dest) = msg.params.get("destination") else {
                    tracing::info!("{}: {} without destination", self.name, msg_type.name());
                    return HandledMsu::Accepted;
                };
                if let Some(r) = &router {
                    let oper = if msg_type == SnmType::Rst {
                        "test-prohibited"
                    } else {
                        "test-restricted"
                    };
                    let mut ctl = CtlParams::new(oper);
                    ctl.set("pointcodetype", t.token());
                    ctl.set("destination", dest);
                    ctl.set(
                        "back-address",
                        format!(
                            "{},{},{},{}",
                            t.token(),
                            label.dpc.format(t),
                            label.opc.format(t),
                            label.sls()
                        ),
                    );
                    ctl.set("automatic", "true");
                    r.control(&ctl);
                }
                HandledMsu::Accepted
            }
            other => {
                tracing::info!(
                    "{}: unhandled SNM {} group {:?} label {},{}",
                    self.name,
                    other.name(),
                    other.group(),
                    t.token(),
                    label
                );
                HandledMsu::Accepted
            }
        }
    }

    fn accepted_if_sent(&self, msu: &Msu, label: &RoutingLabel, sls: i32) -> HandledMsu {
        if self.transmit_msu(msu, label, sls).is_some() {
            HandledMsu::Accepted
        } else {
            HandledMsu::Rejected
        }
    }

    fn rx_transfer(
        &self,
        msg: &SnmMsg,
        label: &RoutingLabel,
        router: Option<&Arc<Router>>,
    ) -> HandledMsu {
        let t = label.pc_type;
        let Some(dest) = msg.params.get("destination") else {
            tracing::info!(
                "{}: received {} [{},{}] without destination",
                self.name,
                msg.msg_type.name(),
                t.token(),
                label
            );
            return HandledMsu::Accepted;
        };
        let oper = match msg.msg_type {
            SnmType::Tfp => "prohibit",
            SnmType::Tfr => "restrict",
            SnmType::Tfc => "congest",
            _ => "allow",
        };
        tracing::info!(
            "{}: {} [{},{}]: traffic {} to {}",
            self.name,
            msg.msg_type.name(),
            t.token(),
            label,
            oper,
            dest
        );
        if let Some(r) = router {
            let mut ctl = CtlParams::new(oper);
            ctl.copy_from(&msg.params);
            ctl.set("source", label.opc.format(t));
            ctl.set("automatic", "true");
            r.control(&ctl);
        }
        HandledMsu::Accepted
    }

    fn rx_changeover(
        &self,
        msg: &SnmMsg,
        msu: &Msu,
        label: &RoutingLabel,
        sls: i32,
    ) -> HandledMsu {
        let t = label.pc_type;
        let lbl = label.reply(0);
        if !self.inhibit_link(&lbl, link::INACTIVE, 0) {
            tracing::warn!(
                "{}: unexpected {} [{},{}]",
                self.name,
                msg.msg_type.name(),
                t.token(),
                label
            );
            return HandledMsu::Accepted;
        }
        tracing::info!("{}: changeover order on {},{}", self.name, t.token(), lbl);
        let rx_seq = msg.params.get_int("sequence", -1);
        if rx_seq >= 0 {
            self.recover(&lbl, rx_seq as u32);
        }
        let seq = self.router().and_then(|r| r.get_sequence(&lbl));
        match seq {
            Some(seq) => {
                let reply = if msg.msg_type == SnmType::Xco {
                    SnmType::Xca
                } else {
                    SnmType::Coa
                };
                let slc = msg.params.get_int("slc", sls as i64).max(0) as u32;
                let Some(data) = encode_seq(reply, t, slc, seq) else {
                    return HandledMsu::Rejected;
                };
                let answer = Msu::build(msu.sio(), &lbl, &data);
                self.accepted_if_sent(&answer, &lbl, sls)
            }
            None => {
                // no sequence to acknowledge with; give the link a
                // short grace period, then fall back to emergency
                let eca = Msu::build(msu.sio(), &lbl, &[SnmType::Eca as u8]);
                if self.postpone(eca, &lbl, sls, Duration::ZERO, ECA_GRACE, Instant::now()) {
                    HandledMsu::Accepted
                } else {
                    HandledMsu::Rejected
                }
            }
        }
    }

    fn rx_changeover_ack(&self, msg: &SnmMsg, label: &RoutingLabel) -> HandledMsu {
        let pend = self.take_pending(|p| {
            p.matches(label)
                && matches!(
                    p.snm_type(),
                    Some(SnmType::Coo) | Some(SnmType::Xco) | Some(SnmType::Eco)
                )
        });
        match pend {
            Some(p) => {
                tracing::info!(
                    "{}: changeover acknowledged on {},{}",
                    self.name,
                    p.label.pc_type.token(),
                    p.label
                );
                self.inhibit_link(&p.label, link::INACTIVE, 0);
                let seq = msg.params.get_int("sequence", -1);
                if seq >= 0 {
                    self.recover(&p.label, seq as u32);
                }
            }
            None => {
                tracing::warn!(
                    "{}: unexpected {} [{},{}]",
                    self.name,
                    msg.msg_type.name(),
                    label.pc_type.token(),
                    label
                );
            }
        }
        HandledMsu::Accepted
    }

    fn rx_changeback(
        &self,
        msu: &Msu,
        label: &RoutingLabel,
        code: &[u8],
        sls: i32,
    ) -> HandledMsu {
        let t = label.pc_type;
        let lbl = label.reply(0);
        if !self.inhibit_link(&lbl, 0, link::INACTIVE) {
            tracing::warn!("{}: unexpected CBD [{},{}]", self.name, t.token(), label);
            return HandledMsu::Accepted;
        }
        tracing::info!("{}: changeback declaration on {},{}", self.name, t.token(), lbl);
        let mut data = Vec::with_capacity(1 + code.len());
        data.push(SnmType::Cba as u8);
        data.extend_from_slice(code);
        let answer = Msu::build(msu.sio(), &lbl, &data);
        self.accepted_if_sent(&answer, &lbl, sls)
    }

    fn rx_changeback_ack(&self, msu: &Msu, label: &RoutingLabel, code: &[u8]) -> HandledMsu {
        let pend = self.take_pending(|p| {
            p.msu.len() == msu.len()
                && p.snm_type() == Some(SnmType::Cbd)
                && p.matches(label)
                && p.msu.tail(p.label.length() + 2).map_or(false, |pc| pc == code)
        });
        match pend {
            Some(p) => {
                tracing::info!(
                    "{}: changeback acknowledged on {},{}",
                    self.name,
                    p.label.pc_type.token(),
                    p.label
                );
                self.inhibit_link(&p.label, 0, link::INACTIVE);
            }
            None => {
                tracing::warn!(
                    "{}: unexpected CBA [{},{}]",
                    self.name,
                    label.pc_type.token(),
                    label
                );
            }
        }
        HandledMsu::Accepted
    }

    /// Link status change: drive changeover when a link went down and
    /// changeback when it came up, towards every adjacent node, over
    /// every still-available link of the network.
    fn link_notify(&self, network: &Arc<dyn Layer3>, sls: i32) {
        let link_up = network.operational(Some(sls as u8));
        if link_up && !network.inhibited(sls, link::INACTIVE) {
            return;
        }
        let router = self.router();
        let mut link_avail = [false; 256];
        for (tx, avail) in link_avail.iter_mut().enumerate() {
            let tx = tx as i32;
            *avail = tx != sls
                && !network.inhibited(tx, link::ANY)
                && network.operational(Some(tx as u8));
        }
        for t in PcType::ALL {
            let mut local = network.get_local(t);
            if local == 0 {
                if let Some(r) = &router {
                    local = r.get_local(t);
                }
            }
            if local == 0 {
                continue;
            }
            tracing::info!(
                "{}: link {},{}:{} is {}",
                self.name,
                t.token(),
                PointCode::new(local).format(t),
                sls,
                if link_up { "up" } else { "down" }
            );
            let oper = if link_up { "changeback" } else { "changeover" };
            for nr in network.get_routes(t) {
                // change orders go to adjacent nodes only
                if nr.priority != 0 {
                    continue;
                }
                let mut seq: Option<u32> = None;
                let mut tx_start = 0usize;
                if !link_up && network.inhibited(sls, link::INACTIVE) {
                    // already inactive: no new orders, only fix sequences
                    seq = network.get_sequence(sls);
                    if seq.is_none() {
                        return;
                    }
                    tx_start = 256;
                }
                let addr = format!(
                    "{},{},{},{}",
                    t.token(),
                    PointCode::new(local).format(t),
                    PointCode::new(nr.packed).format(t),
                    sls
                );
                for (tx, avail) in link_avail.iter().enumerate().skip(tx_start) {
                    if !*avail {
                        continue;
                    }
                    let mut ctl = CtlParams::new(oper);
                    tracing::debug!(
                        "{}: sending link {} {} {} on {}",
                        self.name,
                        sls,
                        oper,
                        addr,
                        tx
                    );
                    ctl.set("address", addr.clone());
                    ctl.set("slc", sls.to_string());
                    ctl.set("linksel", tx.to_string());
                    if link_up {
                        ctl.set("code", tx.to_string());
                    } else {
                        if seq.is_none() {
                            seq = network.get_sequence(sls);
                        }
                        match seq {
                            Some(s) => ctl.set("sequence", s.to_string()),
                            None => ctl.set("emergency", "true"),
                        }
                    }
                    ctl.set("automatic", "true");
                    self.control(&ctl);
                }
                // a recovered sequence turns pending emergency acks
                // into proper changeover acknowledgements
                while let Some(s) = seq {
                    let scan_lbl = RoutingLabel::new(
                        t,
                        PointCode::new(local),
                        PointCode::new(nr.packed),
                        (sls & 0xff) as u8,
                        0,
                    );
                    let Some(pend) = self.take_pending(|p| {
                        p.matches(&scan_lbl) && p.snm_type() == Some(SnmType::Eca)
                    }) else {
                        break;
                    };
                    let (cmd, seq_out) = if s & 0xff00_0000 != 0 {
                        ("XCA", s & 0x00ff_ffff)
                    } else {
                        ("COA", s)
                    };
                    tracing::info!(
                        "{}: turning pending ECA into {} with sequence {}",
                        self.name,
                        cmd,
                        seq_out
                    );
                    let mut ctl = CtlParams::new(cmd);
                    ctl.set("address", addr.clone());
                    ctl.set("slc", sls.to_string());
                    ctl.set("linksel", pend.tx_sls.to_string());
                    ctl.set("sequence", seq_out.to_string());
                    ctl.set("automatic", "true");
                    self.control(&ctl);
                }
            }
        }
    }

    /// Build and send a management message. The address is
    /// `TYPE,opc,dpc[,sls[,spare]]`; commands awaiting acknowledgement
    /// go through the pending queue.
    pub fn control(&self, params: &CtlParams) -> bool {
        let Some(op) = params.operation() else {
            return false;
        };
        let cmd = SNM_CTL
            .iter()
            .find(|(tok, _)| *tok == op)
            .map(|(_, c)| *c)
            .or_else(|| SnmType::from_name(op));
        let Some(cmd) = cmd else {
            tracing::debug!("{}: unimplemented control '{}'", self.name, op);
            return false;
        };
        let Some(addr) = params.get("address") else {
            tracing::warn!("{}: control {} without address", self.name, op);
            return false;
        };
        let Some((t, opc, dpc, sls, spare)) = parse_address(addr) else {
            tracing::warn!("{}: invalid address '{}'", self.name, addr);
            return false;
        };
        let Some(router) = self.router() else {
            return false;
        };
        let sio = Msu::make_sio(router.get_ni(t, 0), params.get_int("priority", 0) as u8, SIF_SNM);
        let label = RoutingLabel::new(t, dpc, opc, (sls.max(0) & 0xff) as u8, spare);
        let mut tx_sls = sls;
        if matches!(
            cmd,
            SnmType::Coo | SnmType::Coa | SnmType::Xco | SnmType::Xca | SnmType::Cbd | SnmType::Cba
        ) {
            tx_sls = (tx_sls + 1) & 0xff;
        }
        let tx_sls = params.get_int("linksel", tx_sls as i64) as i32;
        match cmd {
            // messages carrying a destination point code
            SnmType::Tfp
            | SnmType::Tfa
            | SnmType::Tfr
            | SnmType::Tfc
            | SnmType::Rst
            | SnmType::Rsr => {
                let dest = match params.get("destination") {
                    Some(d) => match PointCode::parse(t, d) {
                        Some(pc) => pc,
                        None => {
                            tracing::warn!("{}: invalid destination '{}'", self.name, d);
                            return false;
                        }
                    },
                    None => opc,
                };
                let Some(data) = encode_dest(cmd, t, dest, spare) else {
                    return false;
                };
                self.transmit_msu(&Msu::build(sio, &label, &data), &label, tx_sls).is_some()
            }
            // messages with just the heading code
            SnmType::Eco
            | SnmType::Tra
            | SnmType::Lin
            | SnmType::Lun
            | SnmType::Lia
            | SnmType::Lua
            | SnmType::Lid
            | SnmType::Lfu
            | SnmType::Llt
            | SnmType::Lrt
            | SnmType::Rct
            | SnmType::Css
            | SnmType::Cns
            | SnmType::Cnp => self
                .transmit_msu(&Msu::build(sio, &label, &[cmd as u8]), &label, tx_sls)
                .is_some(),
            // changeover
            SnmType::Coo | SnmType::Coa | SnmType::Xco | SnmType::Xca => {
                if params.get_bool("emergency", false)
                    && matches!(cmd, SnmType::Coo | SnmType::Coa)
                {
                    let data = if cmd == SnmType::Coo { SnmType::Eco } else { SnmType::Eca };
                    return self
                        .transmit_msu(&Msu::build(sio, &label, &[data as u8]), &label, tx_sls)
                        .is_some();
                }
                let mask =
                    if matches!(cmd, SnmType::Xco | SnmType::Xca) { 0xff_ffff } else { 0x7f };
                let seq = (params.get_int("sequence", 0) as u32) & mask;
                let slc = params.get_int("slc", sls as i64).max(0) as u32;
                let Some(data) = encode_seq(cmd, t, slc, seq) else {
                    return false;
                };
                let msu = Msu::build(sio, &label, &data);
                if matches!(cmd, SnmType::Coa | SnmType::Xca) {
                    self.transmit_msu(&msu, &label, tx_sls).is_some()
                } else {
                    self.postpone(msu, &label, tx_sls, COO_RETRY, Duration::ZERO, Instant::now())
                }
            }
            // changeback
            SnmType::Cbd | SnmType::Cba => {
                let code = params.get_int("code", 0) as u32;
                let slc = params.get_int("slc", sls as i64).max(0) as u32;
                let Some(data) = encode_seq(cmd, t, slc, code) else {
                    return false;
                };
                let msu = Msu::build(sio, &label, &data);
                if cmd == SnmType::Cba {
                    self.transmit_msu(&msu, &label, tx_sls).is_some()
                } else {
                    self.postpone(msu, &label, tx_sls, CBD_RETRY, CBD_TIMEOUT, Instant::now())
                }
            }
            other => {
                tracing::debug!(
                    "{}: unimplemented control {} ({:#04x})",
                    self.name,
                    other.name(),
                    other as u8
                );
                false
            }
        }
    }
}

/// Parse `TYPE,opc,dpc[,sls[,spare]]`.
fn parse_address(addr: &str) -> Option<(PcType, PointCode, PointCode, i32, u8)> {
    let mut it = addr.split(',');
    let t = PcType::from_token(it.next()?.trim())?;
    let opc = PointCode::parse(t, it.next()?)?;
    let dpc = PointCode::parse(t, it.next()?)?;
    let sls = match it.next() {
        Some(s) => s.trim().parse().ok()?,
        None => -1,
    };
    let spare = match it.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0,
    };
    Some((t, opc, dpc, sls, spare))
}

impl Layer4 for Snm {
    fn name(&self) -> &str {
        &self.name
    }

    fn sif(&self) -> u8 {
        SIF_SNM
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
        self.rx(msu, label, network, sls)
    }

    fn notify(&self, network: Option<&Arc<dyn Layer3>>, sls: i32) {
        tracing::debug!("{}: notify sls {}", self.name, sls);
        if let Some(network) = network {
            if sls >= 0 {
                self.link_notify(network, sls);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_full() {
        let (t, opc, dpc, sls, spare) = parse_address("ITU,2-100-4,1-10-2,3,1").unwrap();
        assert_eq!(t, PcType::Itu);
        assert_eq!(opc, PointCode::parse(PcType::Itu, "2-100-4").unwrap());
        assert_eq!(dpc, PointCode::parse(PcType::Itu, "1-10-2").unwrap());
        assert_eq!(sls, 3);
        assert_eq!(spare, 1);
    }

    #[test]
    fn address_parse_short() {
        let (t, _, _, sls, spare) = parse_address("ANSI,1-2-3,4-5-6").unwrap();
        assert_eq!(t, PcType::Ansi);
        assert_eq!(sls, -1);
        assert_eq!(spare, 0);
        assert!(parse_address("NOPE,1-2-3,4-5-6").is_none());
        assert!(parse_address("ITU,1-2-3").is_none());
    }

    #[test]
    fn pending_matches_reversed_label() {
        let label = RoutingLabel::new(
            PcType::Itu,
            PointCode::new(5),
            PointCode::new(10),
            3,
            0,
        );
        let pend = SnmPending {
            msu: Msu::build(0, &label.reply(0), &[SnmType::Coo as u8, 0x42]),
            label: label.reply(0),
            tx_sls: 4,
            interval: Duration::from_secs(1),
            fire: Instant::now(),
            global: None,
        };
        assert!(pend.matches(&label));
        assert_eq!(pend.snm_type(), Some(SnmType::Coo));
        let other = RoutingLabel::new(
            PcType::Itu,
            PointCode::new(5),
            PointCode::new(11),
            3,
            0,
        );
        assert!(!pend.matches(&other));
    }
}
