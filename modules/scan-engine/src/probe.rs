//! Single-port TCP probe: connect, banner negotiation, status classification.

use crate::services::{service_for_port, vulnerabilities_for_port};
use netscan_core::models::{PortRecord, PortStatus};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Bound on the TCP connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);
/// Bound on each banner read.
pub const BANNER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Knock sent when a service stays quiet after connect; some protocols only
/// identify themselves in response to traffic.
const PROBE_PAYLOAD: &[u8] = b"Hello\r\n";

const UNKNOWN_SERVICE: &str = "Unknown Service";

/// Probe one port and produce its record. Connection failures are classified
/// into the status taxonomy and recorded, never dropped.
pub async fn probe_port(target: &str, port: u16) -> PortRecord {
    match timeout(CONNECT_TIMEOUT, TcpStream::connect((target, port))).await {
        Ok(Ok(mut stream)) => {
            let service = match grab_banner(&mut stream).await {
                Some(banner) => banner,
                None => service_for_port(port)
                    .map(str::to_string)
                    .unwrap_or_else(|| UNKNOWN_SERVICE.to_string()),
            };
            PortRecord {
                port,
                status: PortStatus::Open,
                service,
                vulnerabilities: vulnerabilities_for_port(port),
            }
        }
        Ok(Err(e)) => {
            tracing::debug!(target_host = target, port, error = %e, "connect failed");
            PortRecord {
                port,
                status: classify_connect_error(&e),
                service: String::new(),
                vulnerabilities: Vec::new(),
            }
        }
        Err(_) => PortRecord {
            port,
            status: PortStatus::Filtered,
            service: String::new(),
            vulnerabilities: Vec::new(),
        },
    }
}

/// Map a connect failure onto the status taxonomy. Refusal means something
/// answered, so the port is closed; a timeout at the OS level looks the same
/// as our own connect bound and means filtered.
pub fn classify_connect_error(err: &io::Error) -> PortStatus {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => PortStatus::Closed,
        io::ErrorKind::TimedOut => PortStatus::Filtered,
        _ => PortStatus::Error,
    }
}

/// Try for a greeting banner; quiet services get one knock and one more read.
async fn grab_banner(stream: &mut TcpStream) -> Option<String> {
    if let Some(banner) = read_banner(stream).await {
        return Some(banner);
    }
    match timeout(BANNER_TIMEOUT, stream.write_all(PROBE_PAYLOAD)).await {
        Ok(Ok(())) => read_banner(stream).await,
        _ => None,
    }
}

async fn read_banner(stream: &mut TcpStream) -> Option<String> {
    let mut buf = [0u8; 1024];
    match timeout(BANNER_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            let text = String::from_utf8_lossy(&buf[..n]);
            let line = text.trim_start().lines().next().unwrap_or("").trim_end();
            if line.is_empty() {
                None
            } else {
                Some(line.to_string())
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn refused_is_closed_and_timeout_is_filtered() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_connect_error(&refused), PortStatus::Closed);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(classify_connect_error(&timed_out), PortStatus::Filtered);
        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify_connect_error(&other), PortStatus::Error);
    }

    #[tokio::test]
    async fn greeting_banner_becomes_service_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"SSH-2.0-OpenSSH_8.9\r\nextra noise").await.unwrap();
        });

        let record = probe_port("127.0.0.1", port).await;
        assert_eq!(record.status, PortStatus::Open);
        assert_eq!(record.service, "SSH-2.0-OpenSSH_8.9");
    }

    #[tokio::test]
    async fn quiet_service_answers_the_knock() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            // Say nothing until the probe payload arrives.
            let mut buf = [0u8; 16];
            let n = sock.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"Hello\r\n");
            sock.write_all(b"220 mail.example ESMTP\r\n").await.unwrap();
        });

        let record = probe_port("127.0.0.1", port).await;
        assert_eq!(record.status, PortStatus::Open);
        assert_eq!(record.service, "220 mail.example ESMTP");
    }

    #[tokio::test]
    async fn silent_unknown_port_falls_back_to_placeholder() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            // Hold the connection open without ever writing.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let record = probe_port("127.0.0.1", port).await;
        assert_eq!(record.status, PortStatus::Open);
        assert_eq!(record.service, "Unknown Service");
    }

    #[tokio::test]
    async fn refused_connection_records_closed() {
        // Bind then drop to find a port that is almost certainly unbound.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let record = probe_port("127.0.0.1", port).await;
        assert_eq!(record.status, PortStatus::Closed);
        assert!(record.service.is_empty());
        assert!(record.vulnerabilities.is_empty());
    }

    #[tokio::test]
    async fn vulnerabilities_come_from_the_table_even_with_live_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"MyCustomDaemon 1.0\r\n").await.unwrap();
        });

        let record = probe_port("127.0.0.1", port).await;
        assert_eq!(record.service, "MyCustomDaemon 1.0");
        // Ephemeral test port has no table entry, so the list is empty, but it
        // is still the table's answer rather than something banner-derived.
        assert_eq!(record.vulnerabilities, crate::services::vulnerabilities_for_port(port));
    }
}
