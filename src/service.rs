use crate::config::Config;
use crate::types::{ServiceRecord, Target};
use lazy_static::lazy_static;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Banner value recorded when nothing could be read.
pub const BANNER_UNAVAILABLE: &str = "N/A";

pub const UNKNOWN_SERVICE: &str = "Unknown";

const HTTP_PORTS: [u16; 3] = [80, 8080, 8443];
const HTTP_PROBE: &[u8] = b"HEAD / HTTP/1.0\r\n\r\n";

lazy_static! {
    static ref PORT_SERVICES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(21, "FTP");
        map.insert(22, "SSH");
        map.insert(23, "Telnet");
        map.insert(25, "SMTP");
        map.insert(53, "DNS");
        map.insert(80, "HTTP");
        map.insert(110, "POP3");
        map.insert(143, "IMAP");
        map.insert(443, "HTTPS");
        map.insert(445, "SMB");
        map.insert(3306, "MySQL");
        map.insert(3389, "RDP");
        map.insert(5432, "PostgreSQL");
        map.insert(5900, "VNC");
        map.insert(8080, "HTTP-Alt");
        map.insert(8443, "HTTPS-Alt");
        map
    };
}

/// Well-known service label for a port, or "Unknown".
pub fn service_name(port: u16) -> &'static str {
    PORT_SERVICES.get(&port).copied().unwrap_or(UNKNOWN_SERVICE)
}

pub struct ServiceDetector {
    timeout: Duration,
    banner_window: Duration,
}

impl ServiceDetector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            banner_window: Duration::from_millis(500).min(timeout),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.detection_timeout(),
            banner_window: config.banner_window().min(config.detection_timeout()),
        }
    }

    /// One record per distinct port, in the order the ports were given.
    pub async fn detect(&self, target: &Target, open_ports: &[u16]) -> Vec<ServiceRecord> {
        let mut seen = HashSet::new();
        let mut services = Vec::with_capacity(open_ports.len());

        for &port in open_ports {
            if !seen.insert(port) {
                continue;
            }

            let record = self.detect_service(target, port).await;
            info!("Detected {} on port {}", record.service, port);
            services.push(record);
        }

        services
    }

    pub async fn detect_service(&self, target: &Target, port: u16) -> ServiceRecord {
        let banner = self.grab_banner(target, port).await;
        ServiceRecord {
            port,
            service: service_name(port).to_string(),
            banner: banner.unwrap_or_else(|| BANNER_UNAVAILABLE.to_string()),
            status: "open".to_string(),
        }
    }

    /// Read what the service announces on connect, or ask HTTP ports for a status line.
    pub async fn grab_banner(&self, target: &Target, port: u16) -> Option<String> {
        let mut stream = match timeout(self.timeout, TcpStream::connect((target.as_str(), port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!("Could not grab banner on {}:{} - {}", target, port, e);
                return None;
            }
            Err(_) => {
                debug!("Could not grab banner on {}:{} - connect timed out", target, port);
                return None;
            }
        };

        let mut buffer = vec![0u8; 1024];
        if let Ok(Ok(n)) = timeout(self.banner_window, stream.read(&mut buffer)).await {
            let banner = String::from_utf8_lossy(&buffer[..n]).trim().to_string();
            if !banner.is_empty() {
                return Some(banner);
            }
        }

        if !HTTP_PORTS.contains(&port) {
            return None;
        }

        if timeout(self.timeout, stream.write_all(HTTP_PROBE)).await.ok()?.is_err() {
            return None;
        }

        let mut response = vec![0u8; 2048];
        match timeout(self.timeout, stream.read(&mut response)).await {
            Ok(Ok(n)) if n > 0 => {
                let text = String::from_utf8_lossy(&response[..n]);
                text.split("\r\n")
                    .next()
                    .map(|line| line.trim().to_string())
                    .filter(|line| !line.is_empty())
            }
            _ => None,
        }
    }
}

/// Guess the operating system from which well-known ports are open.
pub fn fingerprint(services: &[ServiceRecord]) -> &'static str {
    let open: HashSet<u16> = services.iter().map(|s| s.port).collect();

    if open.contains(&445) || open.contains(&3389) {
        "Windows"
    } else if open.contains(&22) {
        "Linux/Unix"
    } else {
        "Unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn record(port: u16) -> ServiceRecord {
        ServiceRecord {
            port,
            service: service_name(port).to_string(),
            banner: BANNER_UNAVAILABLE.to_string(),
            status: "open".to_string(),
        }
    }

    #[test]
    fn well_known_ports_map_to_services() {
        assert_eq!(service_name(22), "SSH");
        assert_eq!(service_name(80), "HTTP");
        assert_eq!(service_name(443), "HTTPS");
        assert_eq!(service_name(8443), "HTTPS-Alt");
        assert_eq!(service_name(31337), "Unknown");
    }

    #[test]
    fn os_heuristic() {
        assert_eq!(fingerprint(&[record(445)]), "Windows");
        assert_eq!(fingerprint(&[record(22), record(3389)]), "Windows");
        assert_eq!(fingerprint(&[record(22)]), "Linux/Unix");
        assert_eq!(fingerprint(&[record(80)]), "Unknown");
    }

    #[tokio::test]
    async fn reads_announced_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"SSH-2.0-OpenSSH_8.9p1\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let detector = ServiceDetector::new(Duration::from_secs(2));
        let target = Target::new("127.0.0.1").unwrap();
        let banner = detector.grab_banner(&target, port).await;
        assert_eq!(banner.as_deref(), Some("SSH-2.0-OpenSSH_8.9p1"));
    }

    #[tokio::test]
    async fn silent_port_and_closed_port_yield_marker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let silent = listener.local_addr().unwrap().port();
        let closed = {
            let temp = TcpListener::bind("127.0.0.1:0").await.unwrap();
            temp.local_addr().unwrap().port()
        };

        let detector = ServiceDetector::new(Duration::from_millis(300));
        let target = Target::new("127.0.0.1").unwrap();
        let services = detector.detect(&target, &[silent, closed, silent]).await;

        assert_eq!(services.len(), 2);
        assert_eq!(services[0].port, silent);
        assert_eq!(services[1].port, closed);
        assert!(services.iter().all(|s| s.banner == BANNER_UNAVAILABLE));
        assert!(services.iter().all(|s| s.status == "open"));
        drop(listener);
    }

    #[tokio::test]
    async fn http_status_line_is_captured_after_head_request() {
        // Port 8080 is treated as HTTP, so bind it only when it is free.
        let listener = match TcpListener::bind("127.0.0.1:8080").await {
            Ok(listener) => listener,
            Err(_) => return,
        };
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.is_empty() {
                    break;
                }
            }
            write.write_all(b"HTTP/1.0 200 OK\r\nServer: test\r\n\r\n").await.unwrap();
        });

        let detector = ServiceDetector::new(Duration::from_secs(2));
        let target = Target::new("127.0.0.1").unwrap();
        let record = detector.detect_service(&target, 8080).await;
        assert_eq!(record.service, "HTTP-Alt");
        assert_eq!(record.banner, "HTTP/1.0 200 OK");
    }
}
