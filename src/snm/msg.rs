//! Q.704 signalling network management messages.
//!
//! The heading byte carries the message group in its low nibble and
//! the message code within the group in the high nibble. What follows
//! depends on the message and the point code variant; everything is
//! decoded into a flat parameter bag for the management entity.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::common::params::CtlParams;
use crate::common::pointcode::{PcType, PointCode};

/// SNM message types; the discriminant is the wire heading byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SnmType {
    Coo = 0x11,
    Eco = 0x12,
    Rct = 0x13,
    Tfp = 0x14,
    Rst = 0x15,
    Lin = 0x16,
    Tra = 0x17,
    Dlc = 0x18,
    Upu = 0x1a,
    Coa = 0x21,
    Eca = 0x22,
    Tfc = 0x23,
    Tcp = 0x24,
    Rsr = 0x25,
    Lun = 0x26,
    Trw = 0x27,
    Css = 0x28,
    Xco = 0x31,
    Tfr = 0x34,
    Rcp = 0x35,
    Lia = 0x36,
    Cns = 0x38,
    Xca = 0x41,
    Tcr = 0x44,
    Rcr = 0x45,
    Lua = 0x46,
    Cnp = 0x48,
    Cbd = 0x51,
    Tfa = 0x54,
    Lid = 0x56,
    Cba = 0x61,
    Tca = 0x64,
    Lfu = 0x66,
    Llt = 0x76,
    Lrt = 0x86,
}

/// Message groups (low nibble of the heading).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnmGroup {
    Chm,
    Ecm,
    Fcm,
    Tfm,
    Rsm,
    Mim,
    Trm,
    Dlm,
    Ufc,
    Spare,
}

static SNM_NAMES: &[(&str, SnmType)] = &[
    ("COO", SnmType::Coo),
    ("ECO", SnmType::Eco),
    ("RCT", SnmType::Rct),
    ("TFP", SnmType::Tfp),
    ("RST", SnmType::Rst),
    ("LIN", SnmType::Lin),
    ("TRA", SnmType::Tra),
    ("DLC", SnmType::Dlc),
    ("UPU", SnmType::Upu),
    ("COA", SnmType::Coa),
    ("ECA", SnmType::Eca),
    ("TFC", SnmType::Tfc),
    ("TCP", SnmType::Tcp),
    ("RSR", SnmType::Rsr),
    ("LUN", SnmType::Lun),
    ("TRW", SnmType::Trw),
    ("CSS", SnmType::Css),
    ("XCO", SnmType::Xco),
    ("TFR", SnmType::Tfr),
    ("RCP", SnmType::Rcp),
    ("LIA", SnmType::Lia),
    ("CNS", SnmType::Cns),
    ("XCA", SnmType::Xca),
    ("TCR", SnmType::Tcr),
    ("RCR", SnmType::Rcr),
    ("LUA", SnmType::Lua),
    ("CNP", SnmType::Cnp),
    ("CBD", SnmType::Cbd),
    ("TFA", SnmType::Tfa),
    ("LID", SnmType::Lid),
    ("CBA", SnmType::Cba),
    ("TCA", SnmType::Tca),
    ("LFU", SnmType::Lfu),
    ("LLT", SnmType::Llt),
    ("LRT", SnmType::Lrt),
];

static NAME_LOOKUP: Lazy<HashMap<&'static str, SnmType>> =
    Lazy::new(|| SNM_NAMES.iter().copied().collect());

impl SnmType {
    pub fn from_byte(b: u8) -> Option<SnmType> {
        SNM_NAMES.iter().find(|(_, t)| *t as u8 == b).map(|(_, t)| *t)
    }

    pub fn from_name(name: &str) -> Option<SnmType> {
        NAME_LOOKUP.get(name).copied()
    }

    pub fn name(self) -> &'static str {
        SNM_NAMES.iter().find(|(_, t)| *t == self).map(|(n, _)| *n).unwrap_or("?")
    }

    pub fn group(self) -> SnmGroup {
        match (self as u8) & 0x0f {
            0x01 => SnmGroup::Chm,
            0x02 => SnmGroup::Ecm,
            0x03 => SnmGroup::Fcm,
            0x04 => SnmGroup::Tfm,
            0x05 => SnmGroup::Rsm,
            0x06 => SnmGroup::Mim,
            0x07 => SnmGroup::Trm,
            0x08 => SnmGroup::Dlm,
            0x0a => SnmGroup::Ufc,
            _ => SnmGroup::Spare,
        }
    }
}

/// A parsed management message: type plus flat parameter bag with the
/// keys `pointcodetype`, `destination`, `spare`, `sequence`, `slc`,
/// `code`, `part`, `cause` as applicable.
pub struct SnmMsg {
    pub msg_type: SnmType,
    pub params: CtlParams,
}

impl SnmMsg {
    /// Decode the bytes following the heading.
    pub fn parse(msg_type: SnmType, pc_type: PcType, buf: &[u8]) -> SnmMsg {
        let mut params = CtlParams::empty();
        params.set("pointcodetype", pc_type.token());
        match msg_type {
            // destination point code plus spare bits
            SnmType::Tfp
            | SnmType::Tfr
            | SnmType::Tfa
            | SnmType::Tfc
            | SnmType::Rst
            | SnmType::Rsr => {
                if let Some((pc, spare)) = PointCode::from_wire(pc_type, buf) {
                    params.set("destination", pc.format(pc_type));
                    if spare != 0 {
                        params.set("spare", format!("{:02x}", spare));
                    }
                } else {
                    tracing::warn!(
                        "failed to decode destination for {} len {}",
                        msg_type.name(),
                        buf.len()
                    );
                }
            }
            // changeover sequence, slc
            SnmType::Coo | SnmType::Coa => {
                decode_seq_value(&mut params, pc_type, buf, "sequence", false);
            }
            // extended changeover: 24 bit sequence
            SnmType::Xco | SnmType::Xca => {
                decode_seq_value(&mut params, pc_type, buf, "sequence", true);
            }
            // changeback code, slc
            SnmType::Cbd | SnmType::Cba => {
                decode_seq_value(&mut params, pc_type, buf, "code", false);
            }
            // user part id and unavailability cause after the destination
            SnmType::Upu => {
                if let Some((pc, spare)) = PointCode::from_wire(pc_type, buf) {
                    params.set("destination", pc.format(pc_type));
                    if spare != 0 {
                        params.set("spare", format!("{:02x}", spare));
                    }
                    let dlen = pc_type.length();
                    if let Some(b) = buf.get(dlen) {
                        params.set("part", (b & 0x0f).to_string());
                        params.set("cause", (b >> 4).to_string());
                    }
                } else {
                    tracing::warn!(
                        "failed to decode destination for {} len {}",
                        msg_type.name(),
                        buf.len()
                    );
                }
            }
            // heading byte only
            _ => {}
        }
        SnmMsg { msg_type, params }
    }
}

fn decode_seq_value(params: &mut CtlParams, pc_type: PcType, buf: &[u8], key: &str, ext: bool) {
    match pc_type {
        PcType::Itu | PcType::China | PcType::Japan | PcType::Japan5 if !ext => {
            if let Some(b) = buf.first() {
                params.set(key, b.to_string());
            }
        }
        PcType::Ansi | PcType::Ansi8 if !ext => {
            if buf.len() >= 2 {
                params.set("slc", (buf[0] & 0x0f).to_string());
                let v = ((buf[0] >> 4) as u32) | ((buf[1] as u32) << 4);
                params.set(key, v.to_string());
            }
        }
        PcType::Itu | PcType::China | PcType::Japan | PcType::Japan5 => {
            if buf.len() >= 3 {
                let v = (buf[0] as u32) | ((buf[1] as u32) << 8) | ((buf[2] as u32) << 16);
                params.set(key, v.to_string());
            }
        }
        PcType::Ansi | PcType::Ansi8 => {
            if buf.len() >= 3 {
                params.set("slc", (buf[0] & 0x0f).to_string());
                let v = ((buf[0] >> 4) as u32)
                    | ((buf[1] as u32) << 4)
                    | ((buf[2] as u32) << 12);
                params.set(key, v.to_string());
            }
        }
    }
}

/// Encode heading plus a destination point code (TFx/RSx family).
pub fn encode_dest(cmd: SnmType, pc_type: PcType, pc: PointCode, spare: u8) -> Option<Vec<u8>> {
    let mut data = vec![cmd as u8];
    let mut pcbuf = [0u8; 4];
    if !pc.store(pc_type, &mut pcbuf[..pc_type.length()], spare) {
        return None;
    }
    data.extend_from_slice(&pcbuf[..pc_type.length()]);
    Some(data)
}

/// Encode heading plus a changeover sequence / changeback code, in the
/// variant-correct layout. Extended (XCO/XCA) carries 24 bits.
pub fn encode_seq(cmd: SnmType, pc_type: PcType, slc: u32, value: u32) -> Option<Vec<u8>> {
    let ext = matches!(cmd, SnmType::Xco | SnmType::Xca);
    let mut data = vec![cmd as u8];
    match pc_type {
        PcType::Itu | PcType::China | PcType::Japan | PcType::Japan5 => {
            if ext {
                data.push(value as u8);
                data.push((value >> 8) as u8);
                data.push((value >> 16) as u8);
            } else {
                data.push(value as u8);
            }
        }
        PcType::Ansi | PcType::Ansi8 => {
            data.push(((slc & 0x0f) as u8) | ((value << 4) as u8));
            data.push((value >> 4) as u8);
            if ext {
                data.push((value >> 12) as u8);
            }
        }
    }
    Some(data)
}
