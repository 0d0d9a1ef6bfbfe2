//! End-to-end management flows: wire messages in, wire messages out,
//! with a scripted layer 3 underneath the router.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ss7_stack::common::msu::{SIF_ISUP, SIF_MTN, SIF_SNM};
use ss7_stack::layers::{link, HandledMsu, Layer3, Layer4, NetRoute};
use ss7_stack::snm::msg::{encode_dest, SnmType};
use ss7_stack::{
    CtlParams, Msu, PcType, PointCode, RouteState, Router, RouterConfig, RoutingLabel,
};

struct TestNet {
    name: String,
    local: u32,
    routes: Vec<(u32, u32)>,
    up: Mutex<bool>,
    inhibits: Mutex<HashMap<i32, u8>>,
    sent: Mutex<Vec<(Msu, RoutingLabel, i32)>>,
    sequence: Mutex<Option<u32>>,
    recovered: Mutex<Vec<(i32, u32)>>,
}

impl TestNet {
    fn new(local: u32, routes: &[(u32, u32)]) -> Arc<TestNet> {
        Arc::new(TestNet {
            name: "l3test".into(),
            local,
            routes: routes.to_vec(),
            up: Mutex::new(true),
            inhibits: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            sequence: Mutex::new(None),
            recovered: Mutex::new(Vec::new()),
        })
    }

    fn set_sequence(&self, seq: Option<u32>) {
        *self.sequence.lock().unwrap() = seq;
    }

    /// (heading, payload after heading, label, sls) of every sent MSU.
    fn sent_messages(&self) -> Vec<(u8, Vec<u8>, RoutingLabel, i32)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(msu, label, sls)| {
                let body = msu.tail(label.length() + 1).unwrap_or(&[]);
                (body[0], body[1..].to_vec(), *label, *sls)
            })
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
        self.routes.iter().find(|(p, _)| *p == packed).map(|(_, pr)| *pr)
    }
    fn get_routes(&self, pc_type: PcType) -> Vec<NetRoute> {
        if pc_type != PcType::Itu {
            return Vec::new();
        }
        self.routes.iter().map(|(p, pr)| NetRoute::new(*p, *pr)).collect()
    }
    fn transmit(&self, msu: &Msu, label: &RoutingLabel, sls: i32) -> Option<u8> {
        if !*self.up.lock().unwrap() {
            return None;
        }
        self.sent.lock().unwrap().push((msu.clone(), *label, sls));
        Some(sls.max(0) as u8)
    }
    fn get_sequence(&self, _sls: i32) -> Option<u32> {
        *self.sequence.lock().unwrap()
    }
    fn recover_msu(&self, sls: i32, seq: u32) {
        self.recovered.lock().unwrap().push((sls, seq));
    }
}

#[derive(Default)]
struct UpuLog {
    upus: Mutex<Vec<(u32, u8, u8)>>,
}

struct TestPart {
    log: Arc<UpuLog>,
}

impl Layer4 for TestPart {
    fn name(&self) -> &str {
        "isuptest"
    }
    fn sif(&self) -> u8 {
        SIF_ISUP
    }
    fn received(
        &self,
        _msu: &Msu,
        _label: &RoutingLabel,
        _network: Option<&Arc<dyn Layer3>>,
        _sls: i32,
    ) -> HandledMsu {
        HandledMsu::Rejected
    }
    fn received_upu(
        &self,
        _pc_type: PcType,
        node: PointCode,
        part: u8,
        cause: u8,
        _label: &RoutingLabel,
        _sls: i32,
    ) {
        self.log.upus.lock().unwrap().push((node.value(), part, cause));
    }
}

/// Endpoint with local ITU point code 5, adjacent to node 10.
fn endpoint() -> (Arc<Router>, Arc<TestNet>) {
    let cfg = RouterConfig {
        autostart: false,
        local: vec!["ITU,5".to_string()],
        ..RouterConfig::default()
    };
    let router = Router::new(&cfg);
    let net = TestNet::new(5, &[(10, 0), (99, 1)]);
    let arc: Arc<dyn Layer3> = net.clone();
    router.attach_network(&arc);
    (router, net)
}

fn coo_label() -> RoutingLabel {
    // OPC 10 -> DPC 5 on SLS 3
    RoutingLabel::new(PcType::Itu, PointCode::new(5), PointCode::new(10), 3, 0)
}

fn snm_msu(label: &RoutingLabel, payload: &[u8]) -> Msu {
    Msu::build(Msu::make_sio(0, 0, SIF_SNM), label, payload)
}

#[test]
fn changeover_happy_path() {
    let (router, net) = endpoint();
    net.set_sequence(Some(0x42));
    let label = coo_label();
    let msu = snm_msu(&label, &[SnmType::Coo as u8, 0x42]);
    let from: Arc<dyn Layer3> = net.clone();
    assert_eq!(router.received(&msu, &label, Some(&from), 3), HandledMsu::Accepted);
    // the link was taken out of service
    assert!(net.inhibited(3, link::INACTIVE));
    // retransmission queue flushed from the peer's sequence
    assert_eq!(net.recovered.lock().unwrap().as_slice(), &[(3, 0x42)]);
    // a COA went back with our sequence, label reversed, same SLS
    let sent = net.sent_messages();
    let (heading, payload, out_label, sls) = sent.last().unwrap().clone();
    assert_eq!(heading, SnmType::Coa as u8);
    assert_eq!(payload, vec![0x42]);
    assert_eq!(out_label.opc, PointCode::new(5));
    assert_eq!(out_label.dpc, PointCode::new(10));
    assert_eq!(out_label.sls(), 3);
    assert_eq!(sls, 3);
}

#[test]
fn changeover_postponement() {
    let (router, net) = endpoint();
    net.set_sequence(None);
    let label = coo_label();
    let msu = snm_msu(&label, &[SnmType::Coo as u8, 0x42]);
    let from: Arc<dyn Layer3> = net.clone();
    assert_eq!(router.received(&msu, &label, Some(&from), 3), HandledMsu::Accepted);
    // the link is inactive but nothing was answered yet
    assert!(net.inhibited(3, link::INACTIVE));
    let snm = router.management().unwrap();
    assert_eq!(snm.pending_count(), 1);
    assert!(net.sent_messages().is_empty());
    // within the grace period the ECA is retransmitted
    snm.timer_tick(Instant::now());
    assert_eq!(snm.pending_count(), 1);
    // past the 200 ms hard timeout: final retransmit, entry gone
    snm.timer_tick(Instant::now() + Duration::from_millis(300));
    assert_eq!(snm.pending_count(), 0);
    let ecas: Vec<u8> = net
        .sent_messages()
        .iter()
        .map(|(h, _, _, _)| *h)
        .filter(|h| *h == SnmType::Eca as u8)
        .collect();
    assert!(ecas.len() >= 2);
    assert!(net.inhibited(3, link::INACTIVE));
}

#[test]
fn changeover_ack_matches_pending_order() {
    let (router, net) = endpoint();
    let snm = router.management().unwrap();
    // operator-initiated changeover towards node 10
    let mut ctl = CtlParams::new("changeover");
    ctl.set("address", "ITU,0-0-5,0-1-2,3");
    ctl.set("sequence", "7");
    assert!(snm.control(&ctl));
    assert_eq!(snm.pending_count(), 1);
    let sent = net.sent_messages();
    let (heading, payload, _, tx_sls) = sent.last().unwrap().clone();
    assert_eq!(heading, SnmType::Coo as u8);
    assert_eq!(payload, vec![7]);
    // changeover class messages leave on the next link
    assert_eq!(tx_sls, 4);
    // the acknowledgement arrives with the peer's sequence
    let label = coo_label();
    let msu = snm_msu(&label, &[SnmType::Coa as u8, 0x09]);
    let from: Arc<dyn Layer3> = net.clone();
    router.received(&msu, &label, Some(&from), 3);
    assert_eq!(snm.pending_count(), 0);
    assert!(net.inhibited(3, link::INACTIVE));
    assert_eq!(net.recovered.lock().unwrap().as_slice(), &[(3, 9)]);
}

#[test]
fn changeback_declaration_is_echoed() {
    let (router, net) = endpoint();
    net.inhibit(3, link::INACTIVE, 0);
    let label = coo_label();
    let msu = snm_msu(&label, &[SnmType::Cbd as u8, 0x07]);
    let from: Arc<dyn Layer3> = net.clone();
    assert_eq!(router.received(&msu, &label, Some(&from), 3), HandledMsu::Accepted);
    // changeback clears the inactive flag and echoes the code
    assert!(!net.inhibited(3, link::INACTIVE));
    let (heading, payload, out_label, _) = net.sent_messages().last().unwrap().clone();
    assert_eq!(heading, SnmType::Cba as u8);
    assert_eq!(payload, vec![0x07]);
    assert_eq!(out_label.dpc, PointCode::new(10));
}

#[test]
fn changeback_timeout_clears_inactive() {
    let (router, net) = endpoint();
    net.inhibit(3, link::INACTIVE, 0);
    let snm = router.management().unwrap();
    let mut ctl = CtlParams::new("changeback");
    ctl.set("address", "ITU,0-0-5,0-1-2,3");
    ctl.set("code", "9");
    assert!(snm.control(&ctl));
    assert_eq!(snm.pending_count(), 1);
    // no CBA ever comes back
    snm.timer_tick(Instant::now() + Duration::from_secs(3));
    assert_eq!(snm.pending_count(), 0);
    assert!(!net.inhibited(3, link::INACTIVE));
}

#[test]
fn link_inhibit_answered_with_lia() {
    let (router, net) = endpoint();
    let label = coo_label();
    let msu = snm_msu(&label, &[SnmType::Lin as u8]);
    let from: Arc<dyn Layer3> = net.clone();
    assert_eq!(router.received(&msu, &label, Some(&from), 3), HandledMsu::Accepted);
    assert!(net.inhibited(3, link::REMOTE));
    let (heading, _, out_label, _) = net.sent_messages().last().unwrap().clone();
    assert_eq!(heading, SnmType::Lia as u8);
    assert_eq!(out_label.dpc, PointCode::new(10));
    // uninhibit clears the flag and is acknowledged
    let msu = snm_msu(&label, &[SnmType::Lun as u8]);
    router.received(&msu, &label, Some(&from), 3);
    assert!(!net.inhibited(3, link::REMOTE));
    let (heading, _, _, _) = net.sent_messages().last().unwrap().clone();
    assert_eq!(heading, SnmType::Lua as u8);
}

#[test]
fn tfp_from_wire_prohibits_route() {
    let (router, net) = endpoint();
    let label = coo_label();
    let payload =
        encode_dest(SnmType::Tfp, PcType::Itu, PointCode::new(99), 0).unwrap();
    let msu = snm_msu(&label, &payload);
    let from: Arc<dyn Layer3> = net.clone();
    assert_eq!(router.received(&msu, &label, Some(&from), 3), HandledMsu::Accepted);
    assert_eq!(router.get_route_state(PcType::Itu, 99), RouteState::Prohibited);
    // and a TFA restores it
    let payload =
        encode_dest(SnmType::Tfa, PcType::Itu, PointCode::new(99), 0).unwrap();
    let msu = snm_msu(&label, &payload);
    router.received(&msu, &label, Some(&from), 3);
    assert_eq!(router.get_route_state(PcType::Itu, 99), RouteState::Allowed);
}

#[test]
fn upu_reaches_user_parts() {
    let (router, net) = endpoint();
    let log = Arc::new(UpuLog::default());
    let part: Arc<dyn Layer4> = Arc::new(TestPart { log: log.clone() });
    router.attach_service(&part);
    let label = coo_label();
    let mut payload =
        encode_dest(SnmType::Upu, PcType::Itu, PointCode::new(99), 0).unwrap();
    // part = ISUP (5), cause = 1
    payload.push(0x15);
    let msu = snm_msu(&label, &payload);
    let from: Arc<dyn Layer3> = net.clone();
    router.received(&msu, &label, Some(&from), 3);
    assert_eq!(log.upus.lock().unwrap().as_slice(), &[(99, 5, 1)]);
}

#[test]
fn sltm_is_answered_with_slta() {
    let (router, net) = endpoint();
    let label = coo_label();
    let pattern = [0xde, 0xad, 0xbe, 0xef];
    let mut payload = vec![0x11, (pattern.len() as u8) << 4];
    payload.extend_from_slice(&pattern);
    let msu = Msu::build(Msu::make_sio(0, 0, SIF_MTN), &label, &payload);
    let from: Arc<dyn Layer3> = net.clone();
    assert_eq!(router.received(&msu, &label, Some(&from), 3), HandledMsu::Accepted);
    let (heading, body, out_label, _) = net.sent_messages().last().unwrap().clone();
    assert_eq!(heading, 0x21);
    assert_eq!(body[0], (pattern.len() as u8) << 4);
    assert_eq!(&body[1..], &pattern);
    assert_eq!(out_label.opc, PointCode::new(5));
    assert_eq!(out_label.dpc, PointCode::new(10));
}

#[test]
fn link_down_emits_changeover_orders() {
    let (router, net) = endpoint();
    let snm = router.management().unwrap();
    net.set_sequence(Some(0x21));
    // link 3 failed but others are still up
    struct DownLink(Arc<TestNet>);
    impl Layer3 for DownLink {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn operational(&self, sls: Option<u8>) -> bool {
            match sls {
                Some(3) => false,
                _ => self.0.operational(sls),
            }
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
        fn get_sequence(&self, sls: i32) -> Option<u32> {
            self.0.get_sequence(sls)
        }
        fn recover_msu(&self, sls: i32, seq: u32) {
            self.0.recover_msu(sls, seq)
        }
    }
    let down: Arc<dyn Layer3> = Arc::new(DownLink(net.clone()));
    snm.notify(Some(&down), 3);
    // a changeover order with our sequence left on every other link
    let coos: Vec<(u8, Vec<u8>, RoutingLabel, i32)> = net
        .sent_messages()
        .into_iter()
        .filter(|(h, _, _, _)| *h == SnmType::Coo as u8)
        .collect();
    assert_eq!(coos.len(), 255);
    let (_, payload, label, _) = coos.first().unwrap().clone();
    assert_eq!(payload, vec![0x21]);
    assert_eq!(label.dpc, PointCode::new(10));
    assert_eq!(label.sls(), 3);
}
