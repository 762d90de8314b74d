//! Static service-name and vulnerability tables keyed by port, used when a
//! service stays quiet or closes the connection before identifying itself.

const SERVICE_NAMES: &[(u16, &str)] = &[
    (20, "FTP-DATA"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (123, "NTP"),
    (139, "NetBIOS-SSN"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (1433, "MSSQL"),
    (3000, "Node.js/HTTP"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5000, "Flask/HTTP"),
    (5432, "PostgreSQL"),
    (5900, "VNC"),
    (5901, "VNC"),
    (8080, "HTTP-Proxy"),
    (8443, "HTTPS-Alt"),
];

const VULNERABILITIES: &[(u16, &[&str])] = &[
    (21, &["Anonymous login", "Cleartext credentials"]),
    (22, &["Brute force"]),
    (23, &["Cleartext protocol", "Default credentials"]),
    (25, &["Open relay", "User enumeration"]),
    (53, &["Zone transfer", "Cache poisoning"]),
    (80, &["Unencrypted traffic"]),
    (110, &["Cleartext credentials"]),
    (139, &["Null session"]),
    (143, &["Cleartext credentials"]),
    (443, &["Weak SSL/TLS configuration"]),
    (445, &["EternalBlue (MS17-010)", "Null session"]),
    (1433, &["Weak sa credentials"]),
    (3000, &["Debug endpoints exposed"]),
    (3306, &["Weak root credentials"]),
    (3389, &["BlueKeep (CVE-2019-0708)", "Brute force"]),
    (5000, &["Debug mode enabled"]),
    (5432, &["Weak credentials"]),
    (5900, &["Unauthenticated access"]),
    (8080, &["Open proxy", "Unencrypted traffic"]),
];

/// Well-known service name for a port, if any.
pub fn service_for_port(port: u16) -> Option<&'static str> {
    SERVICE_NAMES.iter().find(|(p, _)| *p == port).map(|(_, name)| *name)
}

/// Known vulnerability descriptors for a port. Applied regardless of whether
/// a live banner was obtained.
pub fn vulnerabilities_for_port(port: u16) -> Vec<String> {
    VULNERABILITIES
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, list)| list.iter().map(|v| v.to_string()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ports_resolve() {
        assert_eq!(service_for_port(22), Some("SSH"));
        assert_eq!(service_for_port(3306), Some("MySQL"));
        assert_eq!(service_for_port(47812), None);
    }

    #[test]
    fn vulnerability_lookup_is_port_keyed() {
        assert_eq!(
            vulnerabilities_for_port(3389),
            vec!["BlueKeep (CVE-2019-0708)".to_string(), "Brute force".to_string()]
        );
        assert!(vulnerabilities_for_port(47812).is_empty());
    }
}
