//! ASN.1 BER encoding and decoding of primitive types.
//!
//! A self-contained codec for the primitives used by the SNMP-side
//! subsystems: BOOLEAN, INTEGER, BIT STRING, OCTET STRING, NULL,
//! OBJECT IDENTIFIER, the string families, GeneralizedTime, UTCTime,
//! SEQUENCE/SET headers and raw ANY.
//!
//! Decoders consume from the front of a `&mut &[u8]`; encoders return
//! the tagged byte form. The `tag_check` parameter skips the tag byte
//! verification for implicitly tagged contexts.

use std::fmt;

/// Universal tags and length markers.
pub mod tag {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL_ID: u8 = 0x05;
    pub const OBJECT_ID: u8 = 0x06;
    pub const REAL: u8 = 0x09;
    pub const UTF8_STR: u8 = 0x0c;
    pub const NUMERIC_STR: u8 = 0x12;
    pub const PRINTABLE_STR: u8 = 0x13;
    pub const IA5_STR: u8 = 0x16;
    pub const UTC_TIME: u8 = 0x17;
    pub const GENERALIZED_TIME: u8 = 0x18;
    pub const VISIBLE_STR: u8 = 0x1a;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
    /// MSB marking the long length form.
    pub const LONG_LENGTH: u8 = 0x80;
    /// Continuation bit of OID sub-identifiers.
    pub const BIT8: u8 = 0x80;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsnError {
    /// Tag mismatch or malformed/oversized length field.
    InvalidLengthOrTag,
    /// Well-formed envelope with unusable contents.
    InvalidContents,
    /// Content bytes do not parse (bad UTF-8, bad date).
    Parse,
    /// Type recognised but not implemented (REAL).
    Unsupported,
}

impl fmt::Display for AsnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsnError::InvalidLengthOrTag => write!(f, "invalid length or tag"),
            AsnError::InvalidContents => write!(f, "invalid contents"),
            AsnError::Parse => write!(f, "parse error"),
            AsnError::Unsupported => write!(f, "type not supported"),
        }
    }
}

impl std::error::Error for AsnError {}

pub type Result<T> = std::result::Result<T, AsnError>;

fn take<'a>(data: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if data.len() < len {
        return Err(AsnError::InvalidLengthOrTag);
    }
    let (head, rest) = data.split_at(len);
    *data = rest;
    Ok(head)
}

fn check_tag(data: &mut &[u8], expected: u8, tag_check: bool) -> Result<()> {
    if !tag_check {
        return Ok(());
    }
    let t = *data.first().ok_or(AsnError::InvalidLengthOrTag)?;
    if t != expected {
        return Err(AsnError::InvalidLengthOrTag);
    }
    *data = &data[1..];
    Ok(())
}

/// Decode a BER length. Short form is a single byte below 128; long
/// form sets the MSB with the low bits counting the following
/// big-endian length bytes. A count of zero or more than four is
/// invalid.
pub fn decode_length(data: &mut &[u8]) -> Result<usize> {
    let first = *data.first().ok_or(AsnError::InvalidLengthOrTag)?;
    if first & tag::LONG_LENGTH != 0 {
        let count = (first & !tag::LONG_LENGTH) as usize;
        if count == 0 || count > 4 {
            return Err(AsnError::InvalidLengthOrTag);
        }
        if data.len() < 1 + count {
            return Err(AsnError::InvalidLengthOrTag);
        }
        let mut len: usize = 0;
        for i in 0..count {
            len = (len << 8) | data[1 + i] as usize;
        }
        *data = &data[1 + count..];
        Ok(len)
    } else {
        *data = &data[1..];
        Ok(first as usize)
    }
}

/// Encode a BER length in its canonical form.
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < tag::LONG_LENGTH as usize {
        return vec![len as u8];
    }
    let mut bytes = Vec::new();
    let mut v = len;
    while v > 0 {
        bytes.insert(0, v as u8);
        v >>= 8;
    }
    let mut out = vec![tag::LONG_LENGTH | bytes.len() as u8];
    out.extend_from_slice(&bytes);
    out
}

fn decode_contents<'a>(data: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = decode_length(data)?;
    if len > data.len() {
        return Err(AsnError::InvalidLengthOrTag);
    }
    take(data, len)
}

fn wrap(t: u8, contents: &[u8]) -> Vec<u8> {
    let mut out = vec![t];
    out.extend_from_slice(&encode_length(contents.len()));
    out.extend_from_slice(contents);
    out
}

pub fn decode_boolean(data: &mut &[u8], tag_check: bool) -> Result<bool> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::BOOLEAN, tag_check)?;
    let contents = decode_contents(data)?;
    if contents.len() != 1 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    Ok(contents[0] != 0)
}

pub fn encode_boolean(val: bool) -> Vec<u8> {
    wrap(tag::BOOLEAN, &[if val { 1 } else { 0 }])
}

/// Decode an INTEGER of up to 64 bits, sign-extending from the first
/// content byte.
pub fn decode_integer(data: &mut &[u8], tag_check: bool) -> Result<i64> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::INTEGER, tag_check)?;
    let contents = decode_contents(data)?;
    if contents.is_empty() {
        return Err(AsnError::InvalidContents);
    }
    if contents.len() > 8 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    let mut value: u64 = if contents[0] & 0x80 != 0 { u64::MAX } else { 0 };
    for b in contents {
        value = (value << 8) | *b as u64;
    }
    Ok(value as i64)
}

/// Encode an INTEGER, stripping leading bytes whose nine top bits are
/// all equal (the minimal two's complement form).
pub fn encode_integer(val: i64) -> Vec<u8> {
    let v = val as u64;
    let mut size = 8usize;
    while size > 1 {
        let msb = (v >> ((size - 1) * 8 - 1)) & 0x1ff;
        if msb == 0 || msb == 0x1ff {
            size -= 1;
        } else {
            break;
        }
    }
    let mut contents = Vec::with_capacity(size);
    for i in (0..size).rev() {
        contents.push((v >> (i * 8)) as u8);
    }
    wrap(tag::INTEGER, &contents)
}

/// Decode a BIT STRING into its textual '0'/'1' form, trailing unused
/// bits dropped.
pub fn decode_bit_string(data: &mut &[u8], tag_check: bool) -> Result<String> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::BIT_STRING, tag_check)?;
    let contents = decode_contents(data)?;
    let (&unused, bytes) = contents.split_first().ok_or(AsnError::InvalidLengthOrTag)?;
    if unused > 7 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    let mut out = String::with_capacity(bytes.len() * 8);
    for byte in bytes {
        for i in (0..8).rev() {
            out.push(if byte & (1 << i) != 0 { '1' } else { '0' });
        }
    }
    out.truncate(bytes.len() * 8 - unused as usize);
    Ok(out)
}

/// Encode a '0'/'1' string as a BIT STRING.
pub fn encode_bit_string(bits: &str) -> Result<Vec<u8>> {
    if bits.bytes().any(|b| b != b'0' && b != b'1') {
        return Err(AsnError::InvalidContents);
    }
    let unused = (8 - bits.len() % 8) % 8;
    let mut contents = vec![unused as u8];
    let mut chunk = 0u8;
    for (i, b) in bits.bytes().enumerate() {
        chunk = (chunk << 1) | (b - b'0');
        if i % 8 == 7 {
            contents.push(chunk);
            chunk = 0;
        }
    }
    if bits.len() % 8 != 0 {
        contents.push(chunk << unused);
    }
    Ok(wrap(tag::BIT_STRING, &contents))
}

pub fn decode_octet_string(data: &mut &[u8], tag_check: bool) -> Result<Vec<u8>> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::OCTET_STRING, tag_check)?;
    Ok(decode_contents(data)?.to_vec())
}

pub fn encode_octet_string(bytes: &[u8]) -> Vec<u8> {
    wrap(tag::OCTET_STRING, bytes)
}

pub fn decode_null(data: &mut &[u8], tag_check: bool) -> Result<()> {
    if tag_check && data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::NULL_ID, tag_check)?;
    if decode_length(data)? != 0 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    Ok(())
}

pub fn encode_null() -> Vec<u8> {
    vec![tag::NULL_ID, 0]
}

/// An object identifier in dotted form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AsnOid {
    value: String,
}

impl AsnOid {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    pub fn ids(&self) -> Option<Vec<u64>> {
        if self.value.is_empty() {
            return Some(Vec::new());
        }
        self.value.split('.').map(|s| s.parse().ok()).collect()
    }
}

impl fmt::Display for AsnOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for AsnOid {
    fn from(s: &str) -> Self {
        AsnOid::new(s)
    }
}

fn push_base128(out: &mut Vec<u8>, mut v: u64) {
    let mut bytes = vec![(v & 0x7f) as u8];
    v >>= 7;
    while v != 0 {
        bytes.insert(0, ((v & 0x7f) as u8) | tag::BIT8);
        v >>= 7;
    }
    out.extend_from_slice(&bytes);
}

/// Encode an OBJECT IDENTIFIER; the first two sub-identifiers combine
/// into `40*a + b` (so `1.3` becomes the canonical 0x2b).
pub fn encode_oid(oid: &AsnOid) -> Result<Vec<u8>> {
    let ids = oid.ids().ok_or(AsnError::InvalidContents)?;
    if ids.is_empty() {
        return Err(AsnError::InvalidContents);
    }
    let mut contents = Vec::new();
    if ids.len() >= 2 {
        push_base128(&mut contents, ids[0] * 40 + ids[1]);
        for id in &ids[2..] {
            push_base128(&mut contents, *id);
        }
    } else {
        push_base128(&mut contents, ids[0] * 40);
    }
    Ok(wrap(tag::OBJECT_ID, &contents))
}

pub fn decode_oid(data: &mut &[u8], tag_check: bool) -> Result<AsnOid> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::OBJECT_ID, tag_check)?;
    let contents = decode_contents(data)?;
    if contents.is_empty() {
        return Ok(AsnOid::default());
    }
    let mut ids: Vec<u64> = Vec::new();
    let mut acc: u64 = 0;
    for b in contents {
        acc = (acc << 7) | (b & !tag::BIT8) as u64;
        if b & tag::BIT8 == 0 {
            ids.push(acc);
            acc = 0;
        }
    }
    if acc != 0 || contents.last().map_or(false, |b| b & tag::BIT8 != 0) {
        return Err(AsnError::InvalidContents);
    }
    let first = ids[0];
    let a = (first / 40).min(2);
    let b = first - a * 40;
    let mut out = vec![a, b];
    out.extend_from_slice(&ids[1..]);
    let dotted: Vec<String> = out.iter().map(u64::to_string).collect();
    Ok(AsnOid::new(dotted.join(".")))
}

/// REAL decoding is not implemented; the encoding is skipped over.
pub fn decode_real(data: &mut &[u8], tag_check: bool) -> Result<f32> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::REAL, tag_check)?;
    let _ = decode_contents(data)?;
    Err(AsnError::Unsupported)
}

pub fn encode_real(_val: f32) -> Result<Vec<u8>> {
    Err(AsnError::Unsupported)
}

fn string_tag(t: u8) -> bool {
    matches!(
        t,
        tag::NUMERIC_STR | tag::PRINTABLE_STR | tag::IA5_STR | tag::VISIBLE_STR
    )
}

/// Decode one of the restricted 7-bit string types; returns the text
/// and the tag actually found.
pub fn decode_string(data: &mut &[u8], tag_check: bool) -> Result<(String, u8)> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    let mut found = 0u8;
    if tag_check {
        let t = data[0];
        if !string_tag(t) {
            return Err(AsnError::InvalidLengthOrTag);
        }
        found = t;
        *data = &data[1..];
    }
    let contents = decode_contents(data)?;
    let text = contents.iter().map(|b| (b & 0x7f) as char).collect();
    Ok((text, found))
}

pub fn encode_string(text: &str, string_type: u8) -> Result<Vec<u8>> {
    if !string_tag(string_type) {
        return Err(AsnError::InvalidLengthOrTag);
    }
    Ok(wrap(string_type, text.as_bytes()))
}

pub fn decode_utf8(data: &mut &[u8], tag_check: bool) -> Result<String> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::UTF8_STR, tag_check)?;
    let contents = decode_contents(data)?;
    String::from_utf8(contents.to_vec()).map_err(|_| AsnError::Parse)
}

pub fn encode_utf8(text: &str) -> Vec<u8> {
    wrap(tag::UTF8_STR, text.as_bytes())
}

fn to_epoch(year: i32, month: u32, day: u32, hours: u32, minutes: u32, seconds: u32) -> Result<i64> {
    if year < 1970 || month > 12 || day > 31 || hours > 23 || minutes > 59 || seconds > 59 {
        return Err(AsnError::InvalidContents);
    }
    let month = time::Month::try_from(month as u8).map_err(|_| AsnError::InvalidContents)?;
    let date = time::Date::from_calendar_date(year, month, day as u8)
        .map_err(|_| AsnError::InvalidContents)?;
    let dt = date
        .with_hms(hours as u8, minutes as u8, seconds as u8)
        .map_err(|_| AsnError::InvalidContents)?;
    Ok(dt.assume_utc().unix_timestamp())
}

fn parse_field(s: &str, from: usize, n: usize) -> Result<u32> {
    s.get(from..from + n)
        .and_then(|f| f.parse().ok())
        .ok_or(AsnError::InvalidContents)
}

/// Split the trailing `Z` or `±HHMM` designator; returns the remaining
/// date text, the seconds to add to the parsed value and whether the
/// time was zoned. `require_zone` rejects zoneless values (UTCTime).
fn split_zone(date: &str, require_zone: bool) -> Result<(String, i64, bool)> {
    if let Some(stripped) = date.strip_suffix('Z') {
        return Ok((stripped.to_string(), 0, true));
    }
    let pos = date.find(|c| c == '-' || c == '+');
    match pos {
        Some(pos) => {
            if pos + 5 != date.len() {
                return Err(AsnError::InvalidContents);
            }
            let sign = date.as_bytes()[pos];
            let hours = parse_field(date, pos + 1, 2)?;
            let minutes = parse_field(date, pos + 3, 2)?;
            if hours > 11 || minutes > 59 {
                return Err(AsnError::InvalidContents);
            }
            let diff = (hours as i64) * 3600 + (minutes as i64) * 60;
            let diff = if sign == b'-' { diff } else { -diff };
            Ok((date[..pos].to_string(), diff, true))
        }
        None if require_zone => Err(AsnError::InvalidContents),
        None => Ok((date.to_string(), 0, false)),
    }
}

/// Decode a GeneralizedTime `YYYYMMDDHHMMSS[.fff][Z|±HHMM]` into epoch
/// seconds, fractions and a zoned flag.
pub fn decode_gen_time(data: &mut &[u8], tag_check: bool) -> Result<(i64, u32, bool)> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::GENERALIZED_TIME, tag_check)?;
    let contents = decode_contents(data)?;
    if contents.len() < 14 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    let text: String = contents.iter().map(|b| *b as char).collect();
    let (date, diff, utc) = split_zone(&text, false)?;
    let mut parts = date.splitn(2, '.');
    let stamp = parts.next().ok_or(AsnError::InvalidContents)?;
    let fractions = match parts.next() {
        Some(f) => f.parse().unwrap_or(0),
        None => 0,
    };
    let year = parse_field(stamp, 0, 4)? as i32;
    let month = parse_field(stamp, 4, 2)?;
    let day = parse_field(stamp, 6, 2)?;
    let hours = parse_field(stamp, 8, 2)?;
    let minutes = parse_field(stamp, 10, 2)?;
    let seconds = parse_field(stamp, 12, 2)?;
    let epoch = to_epoch(year, month, day, hours, minutes, seconds)?;
    Ok((epoch + diff, fractions, utc))
}

pub fn encode_gen_time(epoch: i64, fractions: u32) -> Result<Vec<u8>> {
    let dt = time::OffsetDateTime::from_unix_timestamp(epoch)
        .map_err(|_| AsnError::InvalidContents)?;
    let mut text = format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        dt.year(),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    );
    if fractions != 0 {
        text.push('.');
        text.push_str(&fractions.to_string());
    }
    text.push('Z');
    Ok(wrap(tag::GENERALIZED_TIME, text.as_bytes()))
}

/// Decode a UTCTime `YYMMDDHHMM[SS][Z|±HHMM]`; two-digit years pivot at
/// 50 (50 and above is 19xx, below is 20xx).
pub fn decode_utc_time(data: &mut &[u8], tag_check: bool) -> Result<i64> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::UTC_TIME, tag_check)?;
    let contents = decode_contents(data)?;
    if contents.len() < 11 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    let text: String = contents.iter().map(|b| *b as char).collect();
    let (date, diff, _) = split_zone(&text, true)?;
    let year = parse_field(&date, 0, 2)?;
    let year = if year >= 50 { 1900 + year as i32 } else { 2000 + year as i32 };
    let month = parse_field(&date, 2, 2)?;
    let day = parse_field(&date, 4, 2)?;
    let hours = parse_field(&date, 6, 2)?;
    let minutes = parse_field(&date, 8, 2)?;
    let seconds = if date.len() > 10 { parse_field(&date, 10, 2)? } else { 0 };
    let epoch = to_epoch(year, month, day, hours, minutes, seconds)?;
    Ok(epoch + diff)
}

pub fn encode_utc_time(epoch: i64) -> Result<Vec<u8>> {
    let dt = time::OffsetDateTime::from_unix_timestamp(epoch)
        .map_err(|_| AsnError::InvalidContents)?;
    let text = format!(
        "{:02}{:02}{:02}{:02}{:02}{:02}Z",
        dt.year().rem_euclid(100),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    );
    Ok(wrap(tag::UTC_TIME, text.as_bytes()))
}

/// Raw pass-through of whatever remains.
pub fn decode_any(data: &[u8]) -> Vec<u8> {
    data.to_vec()
}

pub fn encode_any(data: &[u8]) -> Vec<u8> {
    data.to_vec()
}

/// Decode a SEQUENCE header, returning the content length.
pub fn decode_sequence(data: &mut &[u8], tag_check: bool) -> Result<usize> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::SEQUENCE, tag_check)?;
    decode_length(data)
}

/// Wrap already-encoded contents in a SEQUENCE header.
pub fn encode_sequence(contents: &[u8]) -> Vec<u8> {
    wrap(tag::SEQUENCE, contents)
}

/// Decode a SET header, returning the content length.
pub fn decode_set(data: &mut &[u8], tag_check: bool) -> Result<usize> {
    if data.len() < 2 {
        return Err(AsnError::InvalidLengthOrTag);
    }
    check_tag(data, tag::SET, tag_check)?;
    decode_length(data)
}

pub fn encode_set(contents: &[u8]) -> Vec<u8> {
    wrap(tag::SET, contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_short_and_long_form() {
        assert_eq!(encode_length(0x2a), vec![0x2a]);
        assert_eq!(encode_length(300), vec![0x82, 0x01, 0x2c]);
        let mut buf: &[u8] = &[0x2a];
        assert_eq!(decode_length(&mut buf).unwrap(), 0x2a);
        let mut buf: &[u8] = &[0x82, 0x01, 0x2c, 0xff];
        assert_eq!(decode_length(&mut buf).unwrap(), 300);
        assert_eq!(buf, &[0xff]);
    }

    #[test]
    fn length_rejects_bad_long_form() {
        // count of zero
        let mut buf: &[u8] = &[0x80];
        assert_eq!(decode_length(&mut buf), Err(AsnError::InvalidLengthOrTag));
        // count larger than four bytes
        let mut buf: &[u8] = &[0x85, 1, 2, 3, 4, 5];
        assert_eq!(decode_length(&mut buf), Err(AsnError::InvalidLengthOrTag));
        // truncated count bytes
        let mut buf: &[u8] = &[0x82, 0x01];
        assert_eq!(decode_length(&mut buf), Err(AsnError::InvalidLengthOrTag));
    }

    #[test]
    fn integer_minimal_encoding() {
        assert_eq!(encode_integer(-1), vec![0x02, 0x01, 0xff]);
        assert_eq!(encode_integer(127), vec![0x02, 0x01, 0x7f]);
        assert_eq!(encode_integer(128), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(encode_integer(0), vec![0x02, 0x01, 0x00]);
        assert_eq!(encode_integer(-129), vec![0x02, 0x02, 0xff, 0x7f]);
    }

    #[test]
    fn integer_roundtrip() {
        for v in [0i64, 1, -1, 127, 128, -128, -129, 0x1234_5678, i64::MIN, i64::MAX] {
            let enc = encode_integer(v);
            let mut buf: &[u8] = &enc;
            assert_eq!(decode_integer(&mut buf, true).unwrap(), v, "value {}", v);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn integer_decode_checks_buffer() {
        // declared longer than available
        let mut buf: &[u8] = &[0x02, 0x05, 0x01];
        assert_eq!(decode_integer(&mut buf, true), Err(AsnError::InvalidLengthOrTag));
        let mut buf: &[u8] = &[0x04, 0x01, 0x01];
        assert_eq!(decode_integer(&mut buf, true), Err(AsnError::InvalidLengthOrTag));
    }

    #[test]
    fn boolean_roundtrip() {
        let enc = encode_boolean(true);
        let mut buf: &[u8] = &enc;
        assert!(decode_boolean(&mut buf, true).unwrap());
        let enc = encode_boolean(false);
        let mut buf: &[u8] = &enc;
        assert!(!decode_boolean(&mut buf, true).unwrap());
        let mut buf: &[u8] = &[0x01, 0x02, 0x00, 0x00];
        assert_eq!(decode_boolean(&mut buf, true), Err(AsnError::InvalidLengthOrTag));
    }

    #[test]
    fn bit_string_roundtrip() {
        for bits in ["", "1", "10110", "10110011", "1011001110"] {
            let enc = encode_bit_string(bits).unwrap();
            let mut buf: &[u8] = &enc;
            assert_eq!(decode_bit_string(&mut buf, true).unwrap(), bits);
        }
        assert_eq!(encode_bit_string("12"), Err(AsnError::InvalidContents));
    }

    #[test]
    fn octet_string_roundtrip() {
        let payload = vec![0u8, 1, 2, 0xfe, 0xff];
        let enc = encode_octet_string(&payload);
        let mut buf: &[u8] = &enc;
        assert_eq!(decode_octet_string(&mut buf, true).unwrap(), payload);
    }

    #[test]
    fn null_roundtrip() {
        let enc = encode_null();
        let mut buf: &[u8] = &enc;
        decode_null(&mut buf, true).unwrap();
        let mut buf: &[u8] = &[0x05, 0x01, 0x00];
        assert_eq!(decode_null(&mut buf, true), Err(AsnError::InvalidLengthOrTag));
    }

    #[test]
    fn oid_canonical_prefix() {
        let enc = encode_oid(&AsnOid::new("1.3.6.1.4.1")).unwrap();
        assert_eq!(enc[2], 0x2b);
    }

    #[test]
    fn oid_roundtrip() {
        for oid in ["1.3.6.1.4.1.2021", "1.3.6.1.2.1.1.1.0", "1.3.1000000"] {
            let enc = encode_oid(&AsnOid::new(oid)).unwrap();
            let mut buf: &[u8] = &enc;
            assert_eq!(decode_oid(&mut buf, true).unwrap().to_string(), oid);
        }
    }

    #[test]
    fn oid_rejects_dangling_continuation() {
        let mut buf: &[u8] = &[0x06, 0x02, 0x2b, 0x86];
        assert_eq!(decode_oid(&mut buf, true), Err(AsnError::InvalidContents));
    }

    #[test]
    fn real_is_unsupported() {
        assert_eq!(encode_real(1.5), Err(AsnError::Unsupported));
        let mut buf: &[u8] = &[0x09, 0x01, 0x40];
        assert_eq!(decode_real(&mut buf, true), Err(AsnError::Unsupported));
        // the encoding was consumed regardless
        assert!(buf.is_empty());
    }

    #[test]
    fn string_tag_is_verified() {
        let enc = encode_string("123abc", tag::IA5_STR).unwrap();
        let mut buf: &[u8] = &enc;
        let (text, found) = decode_string(&mut buf, true).unwrap();
        assert_eq!(text, "123abc");
        assert_eq!(found, tag::IA5_STR);
        // a non-string tag must not decode
        let mut buf: &[u8] = &[tag::OCTET_STRING, 0x01, b'x'];
        assert_eq!(decode_string(&mut buf, true), Err(AsnError::InvalidLengthOrTag));
        assert_eq!(encode_string("x", tag::BOOLEAN), Err(AsnError::InvalidLengthOrTag));
    }

    #[test]
    fn utf8_validates() {
        let enc = encode_utf8("héllo");
        let mut buf: &[u8] = &enc;
        assert_eq!(decode_utf8(&mut buf, true).unwrap(), "héllo");
        let mut buf: &[u8] = &[tag::UTF8_STR, 0x02, 0xc3, 0x28];
        assert_eq!(decode_utf8(&mut buf, true), Err(AsnError::Parse));
    }

    #[test]
    fn gen_time_roundtrip() {
        let epoch = to_epoch(2026, 8, 2, 12, 34, 56).unwrap();
        let enc = encode_gen_time(epoch, 0).unwrap();
        let mut buf: &[u8] = &enc;
        let (back, fractions, utc) = decode_gen_time(&mut buf, true).unwrap();
        assert_eq!(back, epoch);
        assert_eq!(fractions, 0);
        assert!(utc);
    }

    #[test]
    fn gen_time_offsets_and_fractions() {
        let base = to_epoch(2020, 1, 2, 10, 0, 0).unwrap();
        let text = b"20200102100000.250+0200";
        let mut enc = vec![tag::GENERALIZED_TIME, text.len() as u8];
        enc.extend_from_slice(text);
        let mut buf: &[u8] = &enc;
        let (got, fractions, utc) = decode_gen_time(&mut buf, true).unwrap();
        assert_eq!(got, base - 7200);
        assert_eq!(fractions, 250);
        assert!(utc);
    }

    #[test]
    fn utc_time_year_pivot() {
        let mut enc = vec![tag::UTC_TIME, 13];
        enc.extend_from_slice(b"990802123456Z");
        let mut buf: &[u8] = &enc;
        assert_eq!(
            decode_utc_time(&mut buf, true).unwrap(),
            to_epoch(1999, 8, 2, 12, 34, 56).unwrap()
        );
        let mut enc = vec![tag::UTC_TIME, 13];
        enc.extend_from_slice(b"470802123456Z");
        let mut buf: &[u8] = &enc;
        assert_eq!(
            decode_utc_time(&mut buf, true).unwrap(),
            to_epoch(2047, 8, 2, 12, 34, 56).unwrap()
        );
    }

    #[test]
    fn utc_time_requires_zone() {
        let mut enc = vec![tag::UTC_TIME, 12];
        enc.extend_from_slice(b"990802123456");
        let mut buf: &[u8] = &enc;
        assert_eq!(decode_utc_time(&mut buf, true), Err(AsnError::InvalidContents));
    }

    #[test]
    fn sequence_wrapping() {
        let inner = encode_integer(5);
        let enc = encode_sequence(&inner);
        let mut buf: &[u8] = &enc;
        let len = decode_sequence(&mut buf, true).unwrap();
        assert_eq!(len, inner.len());
        assert_eq!(decode_integer(&mut buf, true).unwrap(), 5);
    }
}
