//! Network time authority adapter.
//! SNTP client adapter for obtaining a trusted current time.
//! Provides retry and failover over a list of time authorities.

use crate::domain::types::{NtpServerAddr, TrustedTime};
use crate::infra::error::{VerifyError, VerifyResult};
use chrono::{TimeZone, Utc};
use std::net::UdpSocket;
use std::time::Duration;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_EPOCH_DELTA: i64 = 2_208_988_800;

/// SNTP packet size (RFC 4330, no authenticator).
const SNTP_PACKET_LEN: usize = 48;

/// Configuration for time authority queries.
#[derive(Debug, Clone)]
pub struct NtpClientConfig {
    pub primary: NtpServerAddr,
    pub fallbacks: Vec<NtpServerAddr>,
    pub timeout: Duration,
    pub retries_per_server: usize,
    pub retry_delay: Duration,
}

impl NtpClientConfig {
    #[must_use]
    pub fn servers(&self) -> Vec<&NtpServerAddr> {
        std::iter::once(&self.primary)
            .chain(self.fallbacks.iter())
            .collect()
    }
}

/// UDP adapter performing SNTP request/response exchanges.
///
/// The returned time is authoritative for the whole verification run; the
/// engine never substitutes the local clock when a query fails.
pub struct NtpClient {
    cfg: NtpClientConfig,
}

impl NtpClient {
    #[must_use]
    pub fn new(cfg: NtpClientConfig) -> Self {
        Self { cfg }
    }

    /// Obtain the current time from the configured authorities.
    pub fn fetch_trusted_time(&self) -> VerifyResult<TrustedTime> {
        let mut last_err: Option<VerifyError> = None;
        for (idx, server) in self.cfg.servers().iter().enumerate() {
            log::info!("time authority attempt {}: {}", idx + 1, server.as_str());
            match self.query_with_retries(server) {
                Ok(time) => return Ok(time),
                Err(e) => {
                    log::warn!("authority {} failed: {}", server.as_str(), e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| VerifyError::TimeSourceUnreachable("All authorities failed".into())))
    }

    fn query_with_retries(&self, server: &NtpServerAddr) -> VerifyResult<TrustedTime> {
        let mut last_err: Option<VerifyError> = None;
        for attempt in 1..=self.cfg.retries_per_server {
            log::debug!(
                "sntp attempt {} of {} -> {}",
                attempt,
                self.cfg.retries_per_server,
                server.as_str()
            );
            match self.single_query(server) {
                Ok(time) => return Ok(time),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < self.cfg.retries_per_server {
                        std::thread::sleep(self.cfg.retry_delay);
                    }
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| VerifyError::TimeSourceUnreachable("no attempts made".into())))
    }

    fn single_query(&self, server: &NtpServerAddr) -> VerifyResult<TrustedTime> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| VerifyError::TimeSourceUnreachable(format!("socket bind failed: {e}")))?;
        socket
            .set_read_timeout(Some(self.cfg.timeout))
            .and_then(|()| socket.set_write_timeout(Some(self.cfg.timeout)))
            .map_err(|e| VerifyError::TimeSourceUnreachable(format!("socket setup failed: {e}")))?;

        // LI = 0, VN = 4, Mode = 3 (client)
        let mut request = [0u8; SNTP_PACKET_LEN];
        request[0] = 0x23;

        socket
            .send_to(&request, server.socket_addr())
            .map_err(|e| {
                VerifyError::TimeSourceUnreachable(format!(
                    "send to {} failed: {e}",
                    server.as_str()
                ))
            })?;

        let mut response = [0u8; SNTP_PACKET_LEN];
        let (received, _) = socket.recv_from(&mut response).map_err(|e| {
            VerifyError::TimeSourceUnreachable(format!(
                "no response from {} within {:?}: {e}",
                server.as_str(),
                self.cfg.timeout
            ))
        })?;

        let instant = parse_sntp_response(&response[..received])?;
        Ok(TrustedTime::new(instant, server.as_str()))
    }
}

/// Decode the transmit timestamp out of an SNTP server response.
fn parse_sntp_response(packet: &[u8]) -> VerifyResult<chrono::DateTime<Utc>> {
    if packet.len() < SNTP_PACKET_LEN {
        return Err(VerifyError::TimeSourceInvalidResponse(format!(
            "short packet: {} bytes",
            packet.len()
        )));
    }

    let mode = packet[0] & 0x07;
    if mode != 4 && mode != 5 {
        return Err(VerifyError::TimeSourceInvalidResponse(format!(
            "unexpected mode {mode} in response"
        )));
    }

    // Stratum 0 is a kiss-of-death packet, not a time value
    if packet[1] == 0 {
        return Err(VerifyError::TimeSourceInvalidResponse(
            "stratum 0 response".into(),
        ));
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    if seconds == 0 {
        return Err(VerifyError::TimeSourceInvalidResponse(
            "zero transmit timestamp".into(),
        ));
    }
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);

    let unix_secs = i64::from(seconds) - NTP_UNIX_EPOCH_DELTA;
    let nanos = ((u64::from(fraction) * 1_000_000_000) >> 32) as u32;

    Utc.timestamp_opt(unix_secs, nanos).single().ok_or_else(|| {
        VerifyError::TimeSourceInvalidResponse(format!("unrepresentable timestamp: {unix_secs}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(seconds: u32, mode: u8, stratum: u8) -> [u8; SNTP_PACKET_LEN] {
        let mut packet = [0u8; SNTP_PACKET_LEN];
        packet[0] = 0x20 | mode;
        packet[1] = stratum;
        packet[40..44].copy_from_slice(&seconds.to_be_bytes());
        packet
    }

    #[test]
    fn parses_server_response() {
        // 2023-06-15T10:30:45Z as NTP seconds
        let ntp_secs = (1_686_825_045i64 + NTP_UNIX_EPOCH_DELTA) as u32;
        let t = parse_sntp_response(&response_with(ntp_secs, 4, 2)).unwrap();
        assert_eq!(t.timestamp(), 1_686_825_045);
    }

    #[test]
    fn rejects_short_packet() {
        let err = parse_sntp_response(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, VerifyError::TimeSourceInvalidResponse(_)));
    }

    #[test]
    fn rejects_client_mode_echo() {
        let ntp_secs = (1_686_825_045i64 + NTP_UNIX_EPOCH_DELTA) as u32;
        assert!(parse_sntp_response(&response_with(ntp_secs, 3, 2)).is_err());
    }

    #[test]
    fn rejects_zero_timestamp_and_stratum() {
        assert!(parse_sntp_response(&response_with(0, 4, 2)).is_err());
        let ntp_secs = (1_686_825_045i64 + NTP_UNIX_EPOCH_DELTA) as u32;
        assert!(parse_sntp_response(&response_with(ntp_secs, 4, 0)).is_err());
    }

    #[test]
    fn config_servers_list() {
        let cfg = NtpClientConfig {
            primary: NtpServerAddr::new("pool.ntp.org").unwrap(),
            fallbacks: vec![NtpServerAddr::new("time.google.com").unwrap()],
            timeout: Duration::from_secs(5),
            retries_per_server: 2,
            retry_delay: Duration::from_millis(100),
        };
        assert_eq!(cfg.servers().len(), 2);
    }
}
