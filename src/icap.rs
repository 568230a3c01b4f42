//! Direct ICAP encoding: an IBAN with country code `XE` whose BBAN is the
//! address written as 30 base-36 digits.

use crate::constants::ADDRESS_LEN;
use crate::error::KeyError;
use crate::types::Address;

const COUNTRY: &str = "XE";
const DIRECT_LEN: usize = 30;
const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn encode(address: &Address) -> Result<String, KeyError> {
    if !address.is_icap_capable() {
        return Err(KeyError::NotIcapCapable(*address));
    }
    let digits = to_base36(address.as_bytes());
    let bban = format!("{digits:0>width$}", width = DIRECT_LEN);
    Ok(iban(COUNTRY, &bban))
}

pub fn decode(icap: &str) -> Result<Address, KeyError> {
    let icap = icap.trim().to_ascii_uppercase();
    let invalid = |why: &str| KeyError::InvalidIcap(format!("{icap}: {why}"));
    if icap.len() != 4 + DIRECT_LEN || !icap.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(invalid("not a direct ICAP"));
    }
    let (country, rest) = icap.split_at(2);
    let (check, bban) = rest.split_at(2);
    if country != COUNTRY {
        return Err(invalid("country code must be XE"));
    }
    if !check.bytes().all(|b| b.is_ascii_digit()) || mod97(&format!("{bban}{country}{check}")) != 1 {
        return Err(invalid("checksum mismatch"));
    }
    from_base36(bban).map(Address::from_bytes).ok_or_else(|| invalid("out of range"))
}

fn iban(country: &str, bban: &str) -> String {
    let check = 98 - mod97(&format!("{bban}{country}00"));
    format!("{country}{check:02}{bban}")
}

/// ISO 7064 mod 97-10 over the IBAN digit expansion (A=10 .. Z=35).
fn mod97(s: &str) -> u32 {
    s.bytes().fold(0u32, |acc, b| match b {
        b'0'..=b'9' => (acc * 10 + u32::from(b - b'0')) % 97,
        _ => (acc * 100 + u32::from(b.to_ascii_uppercase() - b'A') + 10) % 97,
    })
}

fn to_base36(bytes: &[u8; ADDRESS_LEN]) -> String {
    let mut number = bytes.to_vec();
    let mut digits = Vec::new();
    while number.iter().any(|&b| b != 0) {
        let mut remainder = 0u32;
        for byte in number.iter_mut() {
            let acc = (remainder << 8) | u32::from(*byte);
            *byte = (acc / 36) as u8;
            remainder = acc % 36;
        }
        digits.push(ALPHABET[remainder as usize]);
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn from_base36(digits: &str) -> Option<[u8; ADDRESS_LEN]> {
    let mut out = [0u8; ADDRESS_LEN];
    for c in digits.bytes() {
        let mut carry = ALPHABET.iter().position(|&a| a == c)? as u32;
        for byte in out.iter_mut().rev() {
            let acc = u32::from(*byte) * 36 + carry;
            *byte = acc as u8;
            carry = acc >> 8;
        }
        if carry != 0 {
            return None;
        }
    }
    Some(out)
}
