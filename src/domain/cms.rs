//! Targeted scanning over CMS/PKCS#7 signature blobs.
//!
//! The engine needs exactly three things out of the detached signature: the
//! digest covered by the `messageDigest` signed attribute, the declared
//! `signingTime`, and the embedded certificates. Rather than modelling the
//! entire `SignedData` grammar, this module walks the DER for those specific
//! structures and hands certificates to `x509-cert` for full decoding.

use chrono::{DateTime, TimeZone, Utc};
use der::Decode;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_cert::Certificate;

/// PKCS#7 `SignedData` OID (1.2.840.113549.1.7.2) DER encoding
pub const PKCS7_SIGNED_DATA_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];

/// PKCS#9 messageDigest OID with tag and length (complete DER structure)
pub const OID_MESSAGE_DIGEST_COMPLETE: [u8; 11] = [
    0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04,
];

/// PKCS#9 signingTime OID with tag and length (complete DER structure)
pub const OID_SIGNING_TIME_COMPLETE: [u8; 11] = [
    0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x05,
];

/// ASN.1 SET tag
const ASN1_SET_TAG: u8 = 0x31;
/// ASN.1 SEQUENCE tag
const ASN1_SEQUENCE_TAG: u8 = 0x30;
/// ASN.1 OCTET STRING tag
const ASN1_OCTET_STRING_TAG: u8 = 0x04;
/// ASN.1 UTCTime tag
const ASN1_UTC_TIME_TAG: u8 = 0x17;
/// ASN.1 GeneralizedTime tag
const ASN1_GENERALIZED_TIME_TAG: u8 = 0x18;

/// Digest algorithms accepted for the certification signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    #[must_use]
    pub fn digest_size(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Infer the algorithm from a covered digest's length.
    #[must_use]
    pub fn from_digest_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(DigestAlgorithm::Sha256),
            48 => Some(DigestAlgorithm::Sha384),
            64 => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    #[must_use]
    pub fn compute(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Parsed DER length: (content length, header bytes consumed after the tag).
fn parse_der_length(data: &[u8]) -> Option<(usize, usize)> {
    let first = *data.first()?;
    if first & 0x80 == 0 {
        return Some((first as usize, 1));
    }
    let length_bytes = (first & 0x7f) as usize;
    if length_bytes == 0 || length_bytes > 4 || data.len() < 1 + length_bytes {
        return None;
    }
    let mut length = 0usize;
    for &byte in &data[1..=length_bytes] {
        length = (length << 8) | (byte as usize);
    }
    Some((length, 1 + length_bytes))
}

/// Whether the blob looks like a CMS `SignedData` structure.
#[must_use]
pub fn is_signed_data(der: &[u8]) -> bool {
    if der.len() < 16 || der[0] != ASN1_SEQUENCE_TAG {
        return false;
    }
    // The contentType OID appears within the first few bytes of ContentInfo
    der[..der.len().min(32)]
        .windows(PKCS7_SIGNED_DATA_OID.len())
        .any(|w| w == PKCS7_SIGNED_DATA_OID)
}

/// Extract the digest covered by the `messageDigest` signed attribute.
///
/// Attribute ::= SEQUENCE { attrType OID, attrValues SET OF OCTET STRING }
/// The scan locates the complete OID encoding and reads the SET that
/// follows it.
#[must_use]
pub fn find_message_digest(der: &[u8]) -> Option<Vec<u8>> {
    let oid = OID_MESSAGE_DIGEST_COMPLETE;
    for i in 0..der.len().saturating_sub(oid.len()) {
        if der[i..i + oid.len()] != oid {
            continue;
        }
        let mut pos = i + oid.len();
        if der.get(pos) != Some(&ASN1_SET_TAG) {
            continue;
        }
        pos += 1;
        let (_, consumed) = parse_der_length(&der[pos..])?;
        pos += consumed;
        if der.get(pos) != Some(&ASN1_OCTET_STRING_TAG) {
            continue;
        }
        pos += 1;
        let (digest_len, consumed) = parse_der_length(&der[pos..])?;
        pos += consumed;
        if !(16..=64).contains(&digest_len) || pos + digest_len > der.len() {
            continue;
        }
        return Some(der[pos..pos + digest_len].to_vec());
    }
    None
}

/// Extract the `signingTime` signed attribute, when present.
#[must_use]
pub fn find_signing_time(der: &[u8]) -> Option<DateTime<Utc>> {
    let oid = OID_SIGNING_TIME_COMPLETE;
    for i in 0..der.len().saturating_sub(oid.len()) {
        if der[i..i + oid.len()] != oid {
            continue;
        }
        let mut pos = i + oid.len();
        if der.get(pos) != Some(&ASN1_SET_TAG) {
            continue;
        }
        pos += 1;
        let (_, consumed) = parse_der_length(&der[pos..])?;
        pos += consumed;
        let tag = *der.get(pos)?;
        pos += 1;
        let (time_len, consumed) = parse_der_length(&der[pos..])?;
        pos += consumed;
        if pos + time_len > der.len() {
            continue;
        }
        let text = std::str::from_utf8(&der[pos..pos + time_len]).ok()?;
        return match tag {
            ASN1_UTC_TIME_TAG => parse_utc_time(text),
            ASN1_GENERALIZED_TIME_TAG => parse_generalized_time(text),
            _ => None,
        };
    }
    None
}

/// Collect every embedded certificate in the blob.
///
/// Certificates sit inside the `certificates [0] IMPLICIT` set of
/// `SignedData`. A linear scan that tries full decoding at each SEQUENCE
/// boundary finds them without modelling the surrounding grammar; inner
/// SEQUENCEs simply fail the decode and are skipped.
#[must_use]
pub fn scan_certificates(der: &[u8]) -> Vec<Certificate> {
    let mut found = Vec::new();
    let mut pos = 0usize;
    while pos + 4 < der.len() {
        if der[pos] != ASN1_SEQUENCE_TAG {
            pos += 1;
            continue;
        }
        let Some((content_len, header_len)) = parse_der_length(&der[pos + 1..]) else {
            pos += 1;
            continue;
        };
        let end = pos + 1 + header_len + content_len;
        if end > der.len() {
            pos += 1;
            continue;
        }
        match Certificate::from_der(&der[pos..end]) {
            Ok(cert) => {
                found.push(cert);
                pos = end;
            }
            Err(_) => pos += 1,
        }
    }
    found
}

/// `YYMMDDHHMMSSZ` with the RFC 5280 century pivot at 50.
fn parse_utc_time(text: &str) -> Option<DateTime<Utc>> {
    if text.len() < 13 || !text.ends_with('Z') {
        return None;
    }
    let yy: i32 = text[0..2].parse().ok()?;
    let year = if yy >= 50 { 1900 + yy } else { 2000 + yy };
    fields_to_utc(year, &text[2..12])
}

/// `YYYYMMDDHHMMSSZ`
fn parse_generalized_time(text: &str) -> Option<DateTime<Utc>> {
    if text.len() < 15 || !text.ends_with('Z') {
        return None;
    }
    let year: i32 = text[0..4].parse().ok()?;
    fields_to_utc(year, &text[4..14])
}

fn fields_to_utc(year: i32, mmddhhmmss: &str) -> Option<DateTime<Utc>> {
    let month: u32 = mmddhhmmss[0..2].parse().ok()?;
    let day: u32 = mmddhhmmss[2..4].parse().ok()?;
    let hour: u32 = mmddhhmmss[4..6].parse().ok()?;
    let minute: u32 = mmddhhmmss[6..8].parse().ok()?;
    let second: u32 = mmddhhmmss[8..10].parse().ok()?;
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Attribute bytes: SEQUENCE-less fragment is enough for the scanners,
    /// which key on the OID encoding.
    fn message_digest_attr(digest: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&OID_MESSAGE_DIGEST_COMPLETE);
        out.push(ASN1_SET_TAG);
        out.push((digest.len() + 2) as u8);
        out.push(ASN1_OCTET_STRING_TAG);
        out.push(digest.len() as u8);
        out.extend_from_slice(digest);
        out
    }

    #[test]
    fn finds_message_digest() {
        let digest = [0xabu8; 32];
        let mut blob = vec![0x30, 0x00, 0x01, 0x02];
        blob.extend_from_slice(&message_digest_attr(&digest));
        assert_eq!(find_message_digest(&blob), Some(digest.to_vec()));
    }

    #[test]
    fn rejects_digest_of_unreasonable_size() {
        let digest = [0u8; 4];
        let blob = message_digest_attr(&digest);
        assert_eq!(find_message_digest(&blob), None);
    }

    #[test]
    fn finds_signing_time_utc() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&OID_SIGNING_TIME_COMPLETE);
        blob.push(ASN1_SET_TAG);
        blob.push(15);
        blob.push(ASN1_UTC_TIME_TAG);
        blob.push(13);
        blob.extend_from_slice(b"230615103045Z");
        let t = find_signing_time(&blob).unwrap();
        assert_eq!(
            t,
            Utc.with_ymd_and_hms(2023, 6, 15, 10, 30, 45).unwrap()
        );
    }

    #[test]
    fn utc_century_pivot() {
        assert_eq!(
            parse_utc_time("991231235959Z").unwrap(),
            Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap()
        );
        assert_eq!(
            parse_utc_time("000101000000Z").unwrap(),
            Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn digest_algorithm_from_len() {
        assert_eq!(
            DigestAlgorithm::from_digest_len(32),
            Some(DigestAlgorithm::Sha256)
        );
        assert_eq!(
            DigestAlgorithm::from_digest_len(48),
            Some(DigestAlgorithm::Sha384)
        );
        assert_eq!(DigestAlgorithm::from_digest_len(20), None);
    }

    #[test]
    fn sha256_compute_matches_known_vector() {
        let digest = DigestAlgorithm::Sha256.compute(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn signed_data_detection() {
        let mut blob = vec![ASN1_SEQUENCE_TAG, 0x10, 0x06, 0x09];
        blob.extend_from_slice(PKCS7_SIGNED_DATA_OID);
        assert!(is_signed_data(&blob));
        assert!(!is_signed_data(b"plain text"));
    }

    #[test]
    fn certificate_scan_tolerates_junk() {
        assert!(scan_certificates(&[0x30, 0x03, 0x01, 0x02, 0x03]).is_empty());
        assert!(scan_certificates(b"not der at all").is_empty());
    }
}
