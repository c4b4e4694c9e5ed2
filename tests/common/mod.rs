//! Shared fixtures: synthetic transport envelopes with a hand-assembled
//! certification signature and a structurally valid test certificate.
#![allow(dead_code)]

use base64::Engine;
use chrono::{TimeZone, Utc};
use pec_verifier::domain::cms::{OID_MESSAGE_DIGEST_COMPLETE, OID_SIGNING_TIME_COMPLETE};
use pec_verifier::{TrustedTime, VerificationConfiguration};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Encode one DER TLV.
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 128 {
        out.push(len as u8);
    } else if len < 256 {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push((len & 0xff) as u8);
    }
    out.extend_from_slice(content);
    out
}

/// Minimal structurally valid self-signed X.509 certificate
/// (CN=Test CA, validity 2022-01-01 .. 2026-01-01, placeholder key and
/// signature bytes; the engine never checks the outer signature value).
pub fn test_certificate_der() -> Vec<u8> {
    let cn_attr = tlv(
        0x30,
        &[tlv(0x06, &[0x55, 0x04, 0x03]), tlv(0x13, b"Test CA")].concat(),
    );
    let name = tlv(0x30, &tlv(0x31, &cn_attr));
    let validity = tlv(
        0x30,
        &[tlv(0x17, b"220101000000Z"), tlv(0x17, b"260101000000Z")].concat(),
    );
    // sha256WithRSAEncryption
    let sig_alg = tlv(
        0x30,
        &[
            tlv(
                0x06,
                &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B],
            ),
            tlv(0x05, &[]),
        ]
        .concat(),
    );
    // rsaEncryption with a placeholder key bit string
    let spki_alg = tlv(
        0x30,
        &[
            tlv(
                0x06,
                &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01],
            ),
            tlv(0x05, &[]),
        ]
        .concat(),
    );
    let spki = tlv(
        0x30,
        &[spki_alg, tlv(0x03, &[0x00, 0x01, 0x02, 0x03, 0x04])].concat(),
    );
    let serial = tlv(0x02, &[0x01]);
    let tbs = tlv(
        0x30,
        &[
            serial,
            sig_alg.clone(),
            name.clone(),
            validity,
            name,
            spki,
        ]
        .concat(),
    );
    tlv(
        0x30,
        &[tbs, sig_alg, tlv(0x03, &[0x00, 0xAA, 0xBB, 0xCC, 0xDD])].concat(),
    )
}

/// The test certificate as a PEM bundle usable as a trusted root store.
pub fn test_certificate_pem() -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(test_certificate_der());
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap());
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// Certification data covering the 2023-06-15T10:30:45Z certification event.
pub fn daticert_xml() -> Vec<u8> {
    b"<?xml version=\"1.0\"?>\r\n\
      <postacert tipo=\"accettazione\" errore=\"nessuno\">\r\n\
      <intestazione><mittente>sender@example.org</mittente></intestazione>\r\n\
      <dati><gestore-emittente>Test Provider PEC</gestore-emittente>\r\n\
      <data zona=\"+0000\"><giorno>15/06/2023</giorno><ora>10:30:45</ora></data>\r\n\
      <msgid>&lt;abc123@pec.example.org&gt;</msgid></dati></postacert>\r\n"
        .to_vec()
}

/// Knobs for the synthetic envelope.
pub struct EnvelopeOptions {
    pub digest_ok: bool,
    pub include_certificate: bool,
    pub include_signature: bool,
}

impl Default for EnvelopeOptions {
    fn default() -> Self {
        Self {
            digest_ok: true,
            include_certificate: true,
            include_signature: true,
        }
    }
}

/// Hand-assembled CMS `SignedData` fragment: contentType OID, optional
/// embedded certificate, `messageDigest` and `signingTime` signed attributes.
pub fn cms_signature(signed_data: &[u8], opts: &EnvelopeOptions) -> Vec<u8> {
    let mut content = tlv(
        0x06,
        &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02],
    );
    if opts.include_certificate {
        content.extend_from_slice(&test_certificate_der());
    }

    let digest = if opts.digest_ok {
        Sha256::digest(signed_data).to_vec()
    } else {
        vec![0u8; 32]
    };
    content.extend_from_slice(&OID_MESSAGE_DIGEST_COMPLETE);
    content.extend_from_slice(&tlv(0x31, &tlv(0x04, &digest)));

    // signingTime matching the certification instant
    content.extend_from_slice(&OID_SIGNING_TIME_COMPLETE);
    content.extend_from_slice(&tlv(0x31, &tlv(0x17, b"230615103045Z")));

    tlv(0x30, &content)
}

fn base64_lines(data: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    encoded
        .as_bytes()
        .chunks(64)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Full transport envelope with declared send time 2023-06-15T10:30:40Z.
pub fn transport_envelope(opts: &EnvelopeOptions) -> Vec<u8> {
    let daticert = daticert_xml();
    let signature = cms_signature(&daticert, opts);

    let mut eml = String::new();
    eml.push_str("From: sender@example.org\r\n");
    eml.push_str("To: recipient@example.org\r\n");
    eml.push_str("Subject: POSTA CERTIFICATA: invoice 42\r\n");
    eml.push_str("Date: Thu, 15 Jun 2023 10:30:40 +0000\r\n");
    eml.push_str("X-Trasporto: posta-certificata\r\n");
    eml.push_str("X-TipoRicevuta: completa\r\n");
    eml.push_str("Content-Type: multipart/mixed; boundary=\"bnd42\"\r\n");
    eml.push_str("\r\n");

    eml.push_str("--bnd42\r\n");
    eml.push_str("Content-Type: application/xml; name=\"daticert.xml\"\r\n");
    eml.push_str("Content-Transfer-Encoding: base64\r\n");
    eml.push_str("\r\n");
    eml.push_str(&base64_lines(&daticert));
    eml.push_str("\r\n");

    if opts.include_signature {
        eml.push_str("--bnd42\r\n");
        eml.push_str("Content-Type: application/pkcs7-signature; name=\"smime.p7s\"\r\n");
        eml.push_str("Content-Transfer-Encoding: base64\r\n");
        eml.push_str("\r\n");
        eml.push_str(&base64_lines(&signature));
        eml.push_str("\r\n");
    }

    eml.push_str("--bnd42\r\n");
    eml.push_str("Content-Type: message/rfc822\r\n");
    eml.push_str("\r\n");
    eml.push_str("From: sender@example.org\r\nSubject: invoice 42\r\n\r\npayload\r\n");

    eml.push_str("--bnd42--\r\n");
    eml.into_bytes()
}

/// An ordinary, uncertified email.
pub fn ordinary_email() -> Vec<u8> {
    b"From: a@example.org\r\nTo: b@example.org\r\nSubject: hi\r\n\
      Content-Type: text/plain\r\n\r\nhello there\r\n"
        .to_vec()
}

/// Trusted time shortly after the fixture's certification instant.
pub fn trusted_after_certification() -> TrustedTime {
    TrustedTime::new(
        Utc.with_ymd_and_hms(2023, 6, 15, 10, 31, 0).unwrap(),
        "pool.ntp.org",
    )
}

/// Engine configuration that never touches the network.
pub fn offline_config(trusted_roots_path: Option<PathBuf>) -> VerificationConfiguration {
    VerificationConfiguration {
        trusted_roots_path,
        check_revocation: false,
        retry_attempts: 1,
        network_timeout_seconds: 1,
        retry_delay_ms: 10,
        fallback_ntp_servers: Vec::new(),
        ..VerificationConfiguration::default()
    }
}

/// Write fixture bytes into the directory and return the path.
pub fn write_fixture(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
