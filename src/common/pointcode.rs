//! SS7 point codes and their packed wire representations.
//!
//! A point code is an unsigned integer whose width and rendering depend
//! on the network variant: ITU (14 bit), ANSI/China (24 bit) and Japan
//! (16 bit), with the ANSI8 and Japan5 sub-variants differing only in
//! the SLS width of the routing label. The packed form is a single
//! `u32`; packed zero is reserved as "invalid / unset".

use std::fmt;

/// Point code variant. Determines packed width, wire layout and the
/// textual rendering of a point code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PcType {
    Itu,
    Ansi,
    Ansi8,
    China,
    Japan,
    Japan5,
}

pub const PC_TYPE_COUNT: usize = 6;

static PC_TYPE_TOKENS: &[(&str, PcType)] = &[
    ("ITU", PcType::Itu),
    ("ANSI", PcType::Ansi),
    ("ANSI8", PcType::Ansi8),
    ("China", PcType::China),
    ("Japan", PcType::Japan),
    ("Japan5", PcType::Japan5),
];

impl PcType {
    pub const ALL: [PcType; PC_TYPE_COUNT] = [
        PcType::Itu,
        PcType::Ansi,
        PcType::Ansi8,
        PcType::China,
        PcType::Japan,
        PcType::Japan5,
    ];

    /// Index into per-variant tables.
    pub fn index(self) -> usize {
        match self {
            PcType::Itu => 0,
            PcType::Ansi => 1,
            PcType::Ansi8 => 2,
            PcType::China => 3,
            PcType::Japan => 4,
            PcType::Japan5 => 5,
        }
    }

    /// Significant bits of a packed point code.
    pub fn bits(self) -> u32 {
        match self {
            PcType::Itu => 14,
            PcType::Ansi | PcType::Ansi8 | PcType::China => 24,
            PcType::Japan | PcType::Japan5 => 16,
        }
    }

    /// Bytes a point code occupies when stored standalone in a
    /// management message (Q.704 15.7).
    pub fn length(self) -> usize {
        match self {
            PcType::Itu => 2,
            PcType::Ansi | PcType::Ansi8 | PcType::China => 3,
            PcType::Japan | PcType::Japan5 => 2,
        }
    }

    /// Bytes of a full routing label (DPC + OPC + SLS + spare bits).
    pub fn label_length(self) -> usize {
        match self {
            PcType::Itu => 4,
            PcType::Ansi | PcType::Ansi8 | PcType::China => 7,
            PcType::Japan | PcType::Japan5 => 5,
        }
    }

    /// SLS field width inside the routing label.
    pub fn sls_bits(self) -> u32 {
        match self {
            PcType::Itu | PcType::China | PcType::Japan => 4,
            PcType::Ansi | PcType::Japan5 => 5,
            PcType::Ansi8 => 8,
        }
    }

    pub fn max(self) -> u32 {
        (1u32 << self.bits()) - 1
    }

    pub fn token(self) -> &'static str {
        PC_TYPE_TOKENS[self.index()].0
    }

    pub fn from_token(s: &str) -> Option<PcType> {
        PC_TYPE_TOKENS.iter().find(|(t, _)| *t == s).map(|(_, v)| *v)
    }
}

impl fmt::Display for PcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A point code value, variant-agnostic until packed or rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PointCode {
    value: u32,
}

impl PointCode {
    pub fn new(value: u32) -> Self {
        Self { value }
    }

    pub fn value(self) -> u32 {
        self.value
    }

    /// Packed form for the given variant, 0 if unset or out of range.
    pub fn pack(self, t: PcType) -> u32 {
        if self.value == 0 || self.value > t.max() {
            0
        } else {
            self.value
        }
    }

    pub fn valid(self, t: PcType) -> bool {
        self.pack(t) != 0
    }

    /// Store the point code LSB-first into `buf` (must be at least
    /// `t.length()` bytes). `spare` goes into the unused high bits of
    /// the last byte for variants with slack (ITU).
    pub fn store(self, t: PcType, buf: &mut [u8], spare: u8) -> bool {
        let len = t.length();
        if buf.len() < len || !self.valid(t) {
            return false;
        }
        let mut v = self.value as u64;
        let bits = t.bits();
        let slack = len as u32 * 8 - bits;
        if slack > 0 {
            v |= ((spare as u64) & ((1u64 << slack) - 1)) << bits;
        }
        for b in buf.iter_mut().take(len) {
            *b = v as u8;
            v >>= 8;
        }
        true
    }

    /// Read a point code stored LSB-first, returning the code and the
    /// spare bits found above it.
    pub fn from_wire(t: PcType, buf: &[u8]) -> Option<(PointCode, u8)> {
        let len = t.length();
        if buf.len() < len {
            return None;
        }
        let mut v: u64 = 0;
        for (i, b) in buf.iter().take(len).enumerate() {
            v |= (*b as u64) << (8 * i);
        }
        let pc = (v & t.max() as u64) as u32;
        let spare = (v >> t.bits()) as u8;
        Some((PointCode::new(pc), spare))
    }

    /// Render per variant: ITU as 3-8-3, ANSI family and China as
    /// network-cluster-member 8-8-8, Japan as 7-4-5.
    pub fn format(self, t: PcType) -> String {
        let v = self.value;
        match t {
            PcType::Itu => format!("{}-{}-{}", (v >> 11) & 0x07, (v >> 3) & 0xff, v & 0x07),
            PcType::Ansi | PcType::Ansi8 | PcType::China => {
                format!("{}-{}-{}", (v >> 16) & 0xff, (v >> 8) & 0xff, v & 0xff)
            }
            PcType::Japan | PcType::Japan5 => {
                format!("{}-{}-{}", (v >> 9) & 0x7f, (v >> 5) & 0x0f, v & 0x1f)
            }
        }
    }

    /// Parse either the dashed per-variant form or a plain decimal
    /// packed value.
    pub fn parse(t: PcType, s: &str) -> Option<PointCode> {
        let s = s.trim();
        if !s.contains('-') {
            let v: u32 = s.parse().ok()?;
            let pc = PointCode::new(v);
            return pc.valid(t).then_some(pc);
        }
        let mut it = s.split('-');
        let a: u32 = it.next()?.trim().parse().ok()?;
        let b: u32 = it.next()?.trim().parse().ok()?;
        let c: u32 = it.next()?.trim().parse().ok()?;
        if it.next().is_some() {
            return None;
        }
        let v = match t {
            PcType::Itu => {
                if a > 0x07 || b > 0xff || c > 0x07 {
                    return None;
                }
                (a << 11) | (b << 3) | c
            }
            PcType::Ansi | PcType::Ansi8 | PcType::China => {
                if a > 0xff || b > 0xff || c > 0xff {
                    return None;
                }
                (a << 16) | (b << 8) | c
            }
            PcType::Japan | PcType::Japan5 => {
                if a > 0x7f || b > 0x0f || c > 0x1f {
                    return None;
                }
                (a << 9) | (b << 5) | c
            }
        };
        let pc = PointCode::new(v);
        pc.valid(t).then_some(pc)
    }
}
