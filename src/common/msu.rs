//! Message Signal Units.
//!
//! An MSU is the SIO byte, the routing label and the payload, held as a
//! single owned byte buffer. The accessors decompose the service
//! information octet: NI (2 bits), priority (2 bits), SIF (4 bits).

use crate::common::label::RoutingLabel;

/// Service indicator values (low nibble of the SIO).
pub const SIF_SNM: u8 = 0x00;
pub const SIF_MTN: u8 = 0x01;
pub const SIF_MTNS: u8 = 0x02;
pub const SIF_SCCP: u8 = 0x03;
pub const SIF_TUP: u8 = 0x04;
pub const SIF_ISUP: u8 = 0x05;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Msu {
    data: Vec<u8>,
}

impl Msu {
    /// Build an MSU from SIO, label and payload.
    pub fn build(sio: u8, label: &RoutingLabel, payload: &[u8]) -> Msu {
        let mut data = Vec::with_capacity(1 + label.length() + payload.len());
        data.push(sio);
        label.write(&mut data);
        data.extend_from_slice(payload);
        Msu { data }
    }

    /// Wrap a raw wire buffer (first byte is the SIO).
    pub fn from_bytes(data: Vec<u8>) -> Msu {
        Msu { data }
    }

    /// Compose a service information octet.
    pub fn make_sio(ni: u8, prio: u8, sif: u8) -> u8 {
        ((ni & 0x03) << 6) | ((prio & 0x03) << 4) | (sif & 0x0f)
    }

    pub fn sio(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    /// Service indicator.
    pub fn sif(&self) -> u8 {
        self.sio() & 0x0f
    }

    /// Network indicator, as the raw 0..3 value.
    pub fn ni(&self) -> u8 {
        self.sio() >> 6
    }

    pub fn prio(&self) -> u8 {
        (self.sio() >> 4) & 0x03
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn at(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    /// Bytes from `offset` onwards, or None when the MSU is shorter.
    pub fn tail(&self, offset: usize) -> Option<&[u8]> {
        self.data.get(offset..)
    }
}
