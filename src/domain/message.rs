//! Structured view of a certified-email transport artifact.
//!
//! Built once per verification run by the message parser and owned
//! exclusively by that run. No field is ever mutated after construction
//! and nothing here performs cryptographic validation.

use chrono::{DateTime, Utc};

/// Label identifying which transport event a timestamp claim refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampLabel {
    /// The send time declared in the envelope `Date:` header.
    DeclaredSend,
    /// The certification instant recorded in the certification data part.
    Certification,
    /// The signing time claimed inside the signature itself.
    SignatureDeclared,
}

impl TimestampLabel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampLabel::DeclaredSend => "declared-send",
            TimestampLabel::Certification => "certification",
            TimestampLabel::SignatureDeclared => "signature-declared",
        }
    }
}

impl std::fmt::Display for TimestampLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamp claim embedded in the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedTimestamp {
    pub label: TimestampLabel,
    pub claimed: DateTime<Utc>,
    /// Where in the artifact the claim came from (header name, part name).
    pub source: String,
}

/// Envelope headers of the transport message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeHeaders {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    /// Declared send time from the `Date:` header, when parseable.
    pub declared_send_time: Option<DateTime<Utc>>,
    /// Value of the transport marker header (`X-Trasporto`).
    pub transport_marker: Option<String>,
    /// Receipt type declared by the envelope (`X-TipoRicevuta`).
    pub receipt_type: Option<String>,
}

/// The signed certification envelope: the certification data bytes and the
/// detached signature covering them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationBlock {
    /// Raw certification-data bytes exactly as signed (XML part).
    pub signed_data: Vec<u8>,
    /// Detached CMS signature, DER.
    pub signature_der: Vec<u8>,
    /// Provider that produced the certification, when declared.
    pub provider: Option<String>,
    /// Receipt type from the certification data (`accettazione`, ...).
    pub receipt_type: Option<String>,
    /// Message identifier from the certification data.
    pub message_id: Option<String>,
    /// Certification instant from the certification data.
    pub certification_time: Option<DateTime<Utc>>,
}

/// Immutable structured view of the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertifiedMessage {
    pub envelope: EnvelopeHeaders,
    pub certification: CertificationBlock,
    /// Ordered timestamp claims found across the artifact.
    pub timestamps: Vec<EmbeddedTimestamp>,
    /// Nested original message, carried opaquely and never interpreted.
    pub original_message: Option<Vec<u8>>,
}

impl CertifiedMessage {
    /// The claim with the given label, if the artifact carries one.
    #[must_use]
    pub fn timestamp(&self, label: TimestampLabel) -> Option<&EmbeddedTimestamp> {
        self.timestamps.iter().find(|t| t.label == label)
    }
}
