//! Transport envelope parser service.
//!
//! Decodes a raw certified-email artifact into the structured
//! `CertifiedMessage` view: envelope headers, certification data part,
//! detached signature part, nested original message and every embedded
//! timestamp claim. Parsing is pure and performs no cryptographic
//! validation; that is deliberately left to the signature verifier so the
//! two failure categories stay separable.

use crate::domain::cms;
use crate::domain::message::{
    CertificationBlock, CertifiedMessage, EmbeddedTimestamp, EnvelopeHeaders, TimestampLabel,
};
use crate::infra::error::{MalformedReason, VerifyError, VerifyResult};
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Service decoding transport artifacts into `CertifiedMessage` values.
pub struct MessageParserService;

impl MessageParserService {
    /// Parse a raw transport artifact.
    pub fn parse(raw: &[u8]) -> VerifyResult<CertifiedMessage> {
        let (header_bytes, body) = split_header_block(raw).ok_or_else(|| {
            VerifyError::malformed(MalformedReason::NotAnEmail, "no header block found")
        })?;
        let headers = parse_headers(header_bytes)?;

        let envelope = EnvelopeHeaders {
            sender: header_value(&headers, "From"),
            recipient: header_value(&headers, "To"),
            subject: header_value(&headers, "Subject"),
            declared_send_time: header_value(&headers, "Date").and_then(|d| parse_rfc2822(&d)),
            transport_marker: header_value(&headers, "X-Trasporto"),
            receipt_type: header_value(&headers, "X-TipoRicevuta"),
        };

        let content_type = header_value(&headers, "Content-Type").ok_or_else(|| {
            VerifyError::malformed(
                MalformedReason::MissingCertificationBlock,
                "envelope has no Content-Type header",
            )
        })?;
        let (mime_type, params) = parse_content_type(&content_type);
        if !mime_type.starts_with("multipart/") {
            return Err(VerifyError::malformed(
                MalformedReason::MissingCertificationBlock,
                format!("transport envelope is not multipart ({mime_type})"),
            ));
        }
        let boundary = params.get("boundary").cloned().ok_or_else(|| {
            VerifyError::malformed(
                MalformedReason::MissingCertificationBlock,
                "multipart envelope without boundary parameter",
            )
        })?;

        let mut certification_data: Option<Vec<u8>> = None;
        let mut signature_der: Option<Vec<u8>> = None;
        let mut original_message: Option<Vec<u8>> = None;

        for part in split_multipart(body, &boundary) {
            let Some((part_header_bytes, part_body)) = split_header_block(part) else {
                continue;
            };
            let part_headers = parse_headers(part_header_bytes)?;
            let part_type = header_value(&part_headers, "Content-Type").unwrap_or_default();
            let (part_mime, part_params) = parse_content_type(&part_type);
            let name = part_name(&part_headers, &part_params);
            let encoding = header_value(&part_headers, "Content-Transfer-Encoding")
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            let decoded = decode_transfer_encoding(part_body, &encoding)?;

            if is_signature_part(&part_mime, name.as_deref()) {
                signature_der = Some(decoded);
            } else if is_certification_data_part(&part_mime, name.as_deref(), &decoded) {
                certification_data = Some(decoded);
            } else if part_mime == "message/rfc822"
                || name.as_deref().is_some_and(|n| n.ends_with(".eml"))
            {
                original_message = Some(decoded);
            }
        }

        let signed_data = certification_data.ok_or_else(|| {
            VerifyError::malformed(
                MalformedReason::MissingCertificationBlock,
                "no certification data part in envelope",
            )
        })?;
        let signature_der = signature_der.ok_or_else(|| {
            VerifyError::malformed(
                MalformedReason::MissingCertificationBlock,
                "no detached signature part in envelope",
            )
        })?;
        if !cms::is_signed_data(&signature_der) {
            return Err(VerifyError::malformed(
                MalformedReason::MissingCertificationBlock,
                "signature part is not a CMS SignedData structure",
            ));
        }

        let certification = parse_certification_data(signed_data, signature_der);
        let timestamps = collect_timestamps(&envelope, &certification);

        log::debug!(
            "parsed transport envelope: {} timestamp claim(s), original message {}",
            timestamps.len(),
            if original_message.is_some() {
                "present"
            } else {
                "absent"
            }
        );

        Ok(CertifiedMessage {
            envelope,
            certification,
            timestamps,
            original_message,
        })
    }
}

/// Decode the certification-data XML into a `CertificationBlock`.
///
/// The XML is scanned for the few elements the engine consumes; the raw
/// bytes are kept verbatim because they are what the signature covers.
fn parse_certification_data(signed_data: Vec<u8>, signature_der: Vec<u8>) -> CertificationBlock {
    let xml = String::from_utf8_lossy(&signed_data).into_owned();
    let certification_time = certification_time_of(&xml);
    CertificationBlock {
        provider: xml_tag_text(&xml, "gestore-emittente").map(str::to_string),
        receipt_type: xml_attr(&xml, "postacert", "tipo"),
        message_id: xml_tag_text(&xml, "msgid").map(str::to_string),
        certification_time,
        signed_data,
        signature_der,
    }
}

/// Certification instant: `<data zona="+0200"><giorno>15/06/2023</giorno>
/// <ora>10:30:45</ora></data>`.
fn certification_time_of(xml: &str) -> Option<DateTime<Utc>> {
    let day = xml_tag_text(xml, "giorno")?;
    let time = xml_tag_text(xml, "ora")?;
    let zone = xml_attr(xml, "data", "zona").unwrap_or_else(|| "+0000".to_string());
    let combined = format!("{day} {time} {zone}");
    DateTime::parse_from_str(&combined, "%d/%m/%Y %H:%M:%S %z")
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn collect_timestamps(
    envelope: &EnvelopeHeaders,
    certification: &CertificationBlock,
) -> Vec<EmbeddedTimestamp> {
    let mut timestamps = Vec::new();
    if let Some(at) = envelope.declared_send_time {
        timestamps.push(EmbeddedTimestamp {
            label: TimestampLabel::DeclaredSend,
            claimed: at,
            source: "envelope Date header".to_string(),
        });
    }
    if let Some(at) = certification.certification_time {
        timestamps.push(EmbeddedTimestamp {
            label: TimestampLabel::Certification,
            claimed: at,
            source: "certification data part".to_string(),
        });
    }
    if let Some(at) = cms::find_signing_time(&certification.signature_der) {
        timestamps.push(EmbeddedTimestamp {
            label: TimestampLabel::SignatureDeclared,
            claimed: at,
            source: "signature signingTime attribute".to_string(),
        });
    }
    timestamps
}

/// Split a message (or part) into header block and body at the first
/// blank line.
fn split_header_block(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = find_subslice(raw, b"\r\n\r\n") {
        return Some((&raw[..pos], &raw[pos + 4..]));
    }
    if let Some(pos) = find_subslice(raw, b"\n\n") {
        return Some((&raw[..pos], &raw[pos + 2..]));
    }
    None
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse an RFC 822 header block with continuation-line unfolding.
fn parse_headers(block: &[u8]) -> VerifyResult<Vec<(String, String)>> {
    let text = String::from_utf8_lossy(block);
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            // Folded continuation of the previous header
            if let Some(last) = headers.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
                continue;
            }
            return Err(VerifyError::malformed(
                MalformedReason::NotAnEmail,
                "header block starts with a continuation line",
            ));
        }
        let Some(colon) = line.find(':') else {
            return Err(VerifyError::malformed(
                MalformedReason::NotAnEmail,
                format!("header line without colon: {line:.40}"),
            ));
        };
        let name = line[..colon].trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(VerifyError::malformed(
                MalformedReason::NotAnEmail,
                "malformed header field name",
            ));
        }
        headers.push((name.to_string(), line[colon + 1..].trim().to_string()));
    }

    if headers.is_empty() {
        return Err(VerifyError::malformed(
            MalformedReason::NotAnEmail,
            "empty header block",
        ));
    }
    Ok(headers)
}

fn header_value(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

/// Split a Content-Type value into lowercase mime type and parameters.
fn parse_content_type(value: &str) -> (String, HashMap<String, String>) {
    let mut pieces = value.split(';');
    let mime_type = pieces.next().unwrap_or_default().trim().to_ascii_lowercase();
    let mut params = HashMap::new();
    for piece in pieces {
        if let Some((key, val)) = piece.split_once('=') {
            params.insert(
                key.trim().to_ascii_lowercase(),
                val.trim().trim_matches('"').to_string(),
            );
        }
    }
    (mime_type, params)
}

fn part_name(
    part_headers: &[(String, String)],
    content_type_params: &HashMap<String, String>,
) -> Option<String> {
    if let Some(disposition) = header_value(part_headers, "Content-Disposition") {
        let (_, params) = parse_content_type(&disposition);
        if let Some(filename) = params.get("filename") {
            return Some(filename.to_ascii_lowercase());
        }
    }
    content_type_params
        .get("name")
        .map(|n| n.to_ascii_lowercase())
}

fn is_signature_part(mime: &str, name: Option<&str>) -> bool {
    mime.contains("pkcs7-signature") || name.is_some_and(|n| n.ends_with(".p7s"))
}

fn is_certification_data_part(mime: &str, name: Option<&str>, decoded: &[u8]) -> bool {
    if name.is_some_and(|n| n.contains("daticert")) {
        return true;
    }
    (mime == "application/xml" || mime == "text/xml")
        && find_subslice(decoded, b"<postacert").is_some()
}

/// Split a multipart body at its boundary delimiters.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut cuts: Vec<(usize, usize)> = Vec::new();

    let mut pos = 0usize;
    while pos + delimiter.len() <= body.len() {
        let Some(found) = find_subslice(&body[pos..], delimiter) else {
            break;
        };
        let at = pos + found;
        // Delimiters sit at line starts
        if at == 0 || body[at - 1] == b'\n' {
            cuts.push((at, at + delimiter.len()));
        }
        pos = at + delimiter.len();
    }

    let mut parts = Vec::new();
    for pair in cuts.windows(2) {
        let (_, mut start) = pair[0];
        let (mut end, _) = pair[1];
        // Skip the line break after the delimiter
        if body.get(start) == Some(&b'\r') {
            start += 1;
        }
        if body.get(start) == Some(&b'\n') {
            start += 1;
        }
        // Drop the line break before the next delimiter
        if end > start && body[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
        if end > start {
            parts.push(&body[start..end]);
        }
    }
    parts
}

fn decode_transfer_encoding(body: &[u8], encoding: &str) -> VerifyResult<Vec<u8>> {
    match encoding {
        "" | "7bit" | "8bit" | "binary" => Ok(body.to_vec()),
        "base64" => {
            let compact: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(&compact)
                .map_err(|e| {
                    VerifyError::malformed(
                        MalformedReason::UnsupportedEncoding,
                        format!("invalid base64 part body: {e}"),
                    )
                })
        }
        "quoted-printable" => Ok(decode_quoted_printable(body)),
        other => Err(VerifyError::malformed(
            MalformedReason::UnsupportedEncoding,
            format!("unsupported content-transfer-encoding: {other}"),
        )),
    }
}

fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0usize;
    while i < data.len() {
        if data[i] != b'=' {
            out.push(data[i]);
            i += 1;
            continue;
        }
        // Soft line break
        if data.get(i + 1) == Some(&b'\r') && data.get(i + 2) == Some(&b'\n') {
            i += 3;
            continue;
        }
        if data.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }
        let hex = (data.get(i + 1).copied(), data.get(i + 2).copied());
        if let (Some(hi), Some(lo)) = hex {
            if let (Some(hi), Some(lo)) = (hex_digit(hi), hex_digit(lo)) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(b'=');
        i += 1;
    }
    out
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn parse_rfc2822(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Text of the first `<tag ...>text</tag>` element, trimmed.
fn xml_tag_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}");
    let start = xml.find(&open)?;
    let content_start = start + xml[start..].find('>')? + 1;
    let close = format!("</{tag}>");
    let content_end = content_start + xml[content_start..].find(close.as_str())?;
    Some(xml[content_start..content_end].trim())
}

/// Value of `attr="..."` on the first `<elem ...>` tag.
fn xml_attr(xml: &str, elem: &str, attr: &str) -> Option<String> {
    let open = format!("<{elem}");
    let start = xml.find(&open)?;
    let tag_end = start + xml[start..].find('>')?;
    let tag = &xml[start..tag_end];
    let key = format!("{attr}=\"");
    let value_start = tag.find(&key)? + key.len();
    let value_end = value_start + tag[value_start..].find('"')?;
    Some(tag[value_start..value_end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_an_email() {
        let err = MessageParserService::parse(b"just some words\nwithout structure\n").unwrap_err();
        match err {
            VerifyError::MalformedInput { reason, .. } => {
                assert_eq!(reason, MalformedReason::NotAnEmail);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ordinary_email_lacks_certification_block() {
        let eml = b"From: a@example.org\r\nTo: b@example.org\r\nSubject: hi\r\n\
                    Content-Type: text/plain\r\n\r\nhello\r\n";
        let err = MessageParserService::parse(eml).unwrap_err();
        match err {
            VerifyError::MalformedInput { reason, .. } => {
                assert_eq!(reason, MalformedReason::MissingCertificationBlock);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn header_unfolding() {
        let headers = parse_headers(
            b"Subject: a very\r\n long subject\r\nFrom: x@example.org",
        )
        .unwrap();
        assert_eq!(
            header_value(&headers, "subject").unwrap(),
            "a very long subject"
        );
    }

    #[test]
    fn content_type_params() {
        let (mime, params) =
            parse_content_type("multipart/signed; boundary=\"--=_b1\"; micalg=sha-256");
        assert_eq!(mime, "multipart/signed");
        assert_eq!(params.get("boundary").unwrap(), "--=_b1");
        assert_eq!(params.get("micalg").unwrap(), "sha-256");
    }

    #[test]
    fn quoted_printable_decoding() {
        assert_eq!(decode_quoted_printable(b"caff=C3=A8"), "caffè".as_bytes());
        assert_eq!(decode_quoted_printable(b"a=\r\nb"), b"ab");
        assert_eq!(decode_quoted_printable(b"x=ZZy"), b"x=ZZy");
    }

    #[test]
    fn unknown_transfer_encoding_is_rejected() {
        let err = decode_transfer_encoding(b"abc", "uuencode").unwrap_err();
        match err {
            VerifyError::MalformedInput { reason, .. } => {
                assert_eq!(reason, MalformedReason::UnsupportedEncoding);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn multipart_split_finds_parts() {
        let body = b"preamble\r\n--bnd\r\nContent-Type: text/plain\r\n\r\nfirst\r\n--bnd\r\n\
                     Content-Type: text/plain\r\n\r\nsecond\r\n--bnd--\r\n";
        let parts = split_multipart(body, "bnd");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with(b"first"));
        assert!(parts[1].ends_with(b"second"));
    }

    #[test]
    fn certification_time_parsing() {
        let xml = "<dati><data zona=\"+0200\"><giorno>15/06/2023</giorno>\
                   <ora>12:30:45</ora></data></dati>";
        let t = certification_time_of(xml).unwrap();
        // +0200 normalizes to UTC
        assert_eq!(t.to_rfc3339(), "2023-06-15T10:30:45+00:00");
    }

    #[test]
    fn xml_scanning_helpers() {
        let xml = "<postacert tipo=\"accettazione\" errore=\"nessuno\">\
                   <msgid>&lt;abc@pec&gt;</msgid></postacert>";
        assert_eq!(xml_attr(xml, "postacert", "tipo").unwrap(), "accettazione");
        assert_eq!(xml_tag_text(xml, "msgid").unwrap(), "&lt;abc@pec&gt;");
        assert!(xml_tag_text(xml, "missing").is_none());
    }
}
