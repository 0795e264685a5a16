//! Compiled-in plugin checks and the manifest `kind` catalog.

use crate::plugin::{Plugin, PluginManifest, PluginMetadata};
use crate::types::{PluginResult, Severity};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use log::debug;
use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const FTP_ANONYMOUS: &str = "ftp-anonymous";
pub const WEAK_HEADERS: &str = "weak-headers";
pub const BANNER_MATCH: &str = "banner-match";
pub const SAMPLE: &str = "sample";
pub const HTTP_METHODS: &str = "http-methods";
pub const SQL_ERRORS: &str = "sql-errors";
pub const TLS_CERT: &str = "tls-cert";

const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASS: &str = "anonymous@example.com";

const SECURITY_HEADERS: [(&str, Severity); 5] = [
    ("Strict-Transport-Security", Severity::Critical),
    ("X-Content-Type-Options", Severity::High),
    ("X-Frame-Options", Severity::High),
    ("X-XSS-Protection", Severity::Medium),
    ("Content-Security-Policy", Severity::High),
];

const DANGEROUS_METHODS: [&str; 3] = ["PUT", "DELETE", "TRACE"];

const SQL_PAYLOADS: [&str; 4] = ["'", "\" OR \"1\"=\"1", "admin' --", "1' UNION SELECT NULL --"];
const SQL_ERROR_KEYWORDS: [&str; 5] = ["sql", "mysql", "postgres", "error", "syntax"];

/// Build a plugin from a manifest.
pub fn build(manifest: &PluginManifest, timeout: Duration) -> Result<Arc<dyn Plugin>, String> {
    let metadata = manifest.metadata();

    let plugin: Arc<dyn Plugin> = match manifest.kind.as_str() {
        FTP_ANONYMOUS => Arc::new(FtpAnonymousCheck::new(metadata, timeout)),
        WEAK_HEADERS => Arc::new(WeakHeadersCheck::new(metadata, timeout)),
        SAMPLE => Arc::new(SampleCheck::new(metadata)),
        HTTP_METHODS => Arc::new(HttpMethodsCheck::new(metadata, timeout)),
        TLS_CERT => Arc::new(TlsCertCheck::new(metadata, timeout)),
        SQL_ERRORS => {
            let path = manifest.params.get("path").and_then(|v| v.as_str());
            let param = manifest.params.get("param").and_then(|v| v.as_str());
            Arc::new(SqlErrorsCheck::new(metadata, timeout).with_endpoint(path, param))
        }
        BANNER_MATCH => {
            let pattern = manifest
                .params
                .get("pattern")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "banner-match requires a string `pattern` parameter".to_string())?;
            let probe = manifest.params.get("probe").and_then(|v| v.as_str());
            let check = BannerMatchCheck::new(metadata, pattern, timeout)
                .map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
            Arc::new(check.with_probe(probe))
        }
        other => return Err(format!("unknown plugin kind '{}'", other)),
    };

    Ok(plugin)
}

/// The checks shipped with the binary, with their default metadata.
pub fn builtin_catalog(timeout: Duration) -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(FtpAnonymousCheck::new(
            PluginMetadata::new(
                "FTP Anonymous Login",
                "Tests for FTP servers allowing anonymous access",
                Severity::High,
            ),
            timeout,
        )),
        Arc::new(WeakHeadersCheck::new(
            PluginMetadata::new(
                "Weak Security Headers",
                "Detects missing or improperly configured security headers",
                Severity::Medium,
            ),
            timeout,
        )),
        Arc::new(SampleCheck::new(PluginMetadata::new(
            "Sample Plugin",
            "Template for creating custom vulnerability checks",
            Severity::Info,
        ))),
    ]
}

/// The web application checks run by `labscan web`.
pub fn web_suite(timeout: Duration) -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(WeakHeadersCheck::new(
            PluginMetadata::new(
                "Missing Security Headers",
                "Checks the response for standard security headers",
                Severity::Medium,
            ),
            timeout,
        )),
        Arc::new(TlsCertCheck::new(
            PluginMetadata::new(
                "SSL Certificate",
                "Checks that the server certificate passes verification",
                Severity::High,
            ),
            timeout,
        )),
        Arc::new(SqlErrorsCheck::new(
            PluginMetadata::new(
                "SQL Error Detection",
                "Sends SQL metacharacters and looks for database errors in the response",
                Severity::High,
            ),
            timeout,
        )),
        Arc::new(HttpMethodsCheck::new(
            PluginMetadata::new(
                "HTTP Methods",
                "Checks whether PUT, DELETE or TRACE are accepted",
                Severity::Medium,
            ),
            timeout,
        )),
    ]
}

/// https on 443, plain http everywhere else.
fn web_url(target: &str, port: u16) -> String {
    if port == 443 {
        format!("https://{}:{}", target, port)
    } else {
        format!("http://{}:{}", target, port)
    }
}

fn http_client(timeout: Duration, accept_invalid_certs: bool) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("failed to build HTTP client")
}

fn excerpt(text: &str) -> String {
    text.chars().take(50).collect()
}

pub struct FtpAnonymousCheck {
    metadata: PluginMetadata,
    timeout: Duration,
}

impl FtpAnonymousCheck {
    pub fn new(metadata: PluginMetadata, timeout: Duration) -> Self {
        Self { metadata, timeout }
    }

    async fn login(&self, target: &str, port: u16) -> anyhow::Result<(u16, String)> {
        let stream = timeout(self.timeout, TcpStream::connect((target, port)))
            .await
            .map_err(|_| anyhow!("connect timed out"))?
            .context("Could not connect")?;

        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        let (code, text) = read_reply(&mut reader).await?;
        if code != 220 {
            return Ok((code, text));
        }

        write
            .write_all(format!("USER {}\r\n", ANONYMOUS_USER).as_bytes())
            .await?;
        let (code, text) = read_reply(&mut reader).await?;
        if code != 331 {
            return Ok((code, text));
        }

        write
            .write_all(format!("PASS {}\r\n", ANONYMOUS_PASS).as_bytes())
            .await?;
        let reply = read_reply(&mut reader).await?;

        let _ = write.write_all(b"QUIT\r\n").await;
        Ok(reply)
    }
}

/// Read one FTP reply, following multi-line `123-` continuations.
async fn read_reply<R>(reader: &mut R) -> anyhow::Result<(u16, String)>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        bail!("connection closed by server");
    }

    let code: u16 = line
        .get(..3)
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| anyhow!("malformed FTP reply: {}", excerpt(line.trim())))?;

    if line.as_bytes().get(3) == Some(&b'-') {
        let terminator = format!("{} ", code);
        loop {
            let mut next = String::new();
            if reader.read_line(&mut next).await? == 0 {
                bail!("connection closed inside multi-line reply");
            }
            if next.starts_with(&terminator) {
                line = next;
                break;
            }
        }
    }

    Ok((code, line.trim().to_string()))
}

#[async_trait]
impl Plugin for FtpAnonymousCheck {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn check(&self, target: &str, port: u16, service: &str) -> anyhow::Result<PluginResult> {
        let service = if service.is_empty() { "FTP" } else { service };
        let (code, text) = timeout(self.timeout, self.login(target, port))
            .await
            .map_err(|_| anyhow!("FTP dialogue timed out"))??;

        debug!("FTP {}:{} answered {} to anonymous login", target, port, code);

        let result = if code == 230 {
            PluginResult::vulnerable(
                self.name(),
                target,
                port,
                service,
                "Vulnerable - Anonymous login allowed",
            )
            .with_details(json!({ "severity": self.metadata.severity }))
        } else {
            PluginResult::safe(
                self.name(),
                target,
                port,
                service,
                format!("Not vulnerable - {}", excerpt(&text)),
            )
        };
        Ok(result)
    }
}

pub struct WeakHeadersCheck {
    metadata: PluginMetadata,
    timeout: Duration,
}

impl WeakHeadersCheck {
    pub fn new(metadata: PluginMetadata, timeout: Duration) -> Self {
        Self { metadata, timeout }
    }
}

#[async_trait]
impl Plugin for WeakHeadersCheck {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn check(&self, target: &str, port: u16, service: &str) -> anyhow::Result<PluginResult> {
        let client = http_client(self.timeout, true)?;
        let response = client.head(web_url(target, port)).send().await?;
        let headers = response.headers();

        let mut missing = Vec::new();
        let mut found = Vec::new();
        for (header, severity) in SECURITY_HEADERS {
            match headers.get(header) {
                Some(value) => found.push(json!({
                    "header": header,
                    "value": excerpt(&String::from_utf8_lossy(value.as_bytes())),
                })),
                None => missing.push(json!({ "header": header, "severity": severity })),
            }
        }

        let status = format!("Found {}/{} headers", found.len(), SECURITY_HEADERS.len());
        let result = if missing.is_empty() {
            PluginResult::safe(self.name(), target, port, service, status)
        } else {
            PluginResult::vulnerable(self.name(), target, port, service, status)
        };

        Ok(result.with_details(json!({
            "missing_headers": missing,
            "headers_found": found,
        })))
    }
}

/// Flags web servers that accept PUT, DELETE or TRACE.
pub struct HttpMethodsCheck {
    metadata: PluginMetadata,
    timeout: Duration,
}

impl HttpMethodsCheck {
    pub fn new(metadata: PluginMetadata, timeout: Duration) -> Self {
        Self { metadata, timeout }
    }
}

#[async_trait]
impl Plugin for HttpMethodsCheck {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn check(&self, target: &str, port: u16, service: &str) -> anyhow::Result<PluginResult> {
        let client = http_client(self.timeout, true)?;
        let url = web_url(target, port);

        let mut allowed = Vec::new();
        for name in DANGEROUS_METHODS {
            let method = Method::from_bytes(name.as_bytes())?;
            let response = client.request(method, &url).send().await?;
            // Anything below 405 Method Not Allowed counts as accepted.
            if response.status() < StatusCode::METHOD_NOT_ALLOWED {
                allowed.push(name);
            }
        }

        debug!("{}:{} accepts {:?}", target, port, allowed);

        let result = if allowed.is_empty() {
            PluginResult::safe(self.name(), target, port, service, "No dangerous methods allowed")
        } else {
            PluginResult::vulnerable(
                self.name(),
                target,
                port,
                service,
                format!("Dangerous methods allowed: {}", allowed.join(", ")),
            )
        };
        Ok(result.with_details(json!({ "allowed_methods": allowed })))
    }
}

/// Looks for database error text in responses to SQL metacharacters.
pub struct SqlErrorsCheck {
    metadata: PluginMetadata,
    path: String,
    param: String,
    timeout: Duration,
}

impl SqlErrorsCheck {
    pub fn new(metadata: PluginMetadata, timeout: Duration) -> Self {
        Self {
            metadata,
            path: "/search".to_string(),
            param: "q".to_string(),
            timeout,
        }
    }

    /// Override the injected path and query parameter.
    pub fn with_endpoint(mut self, path: Option<&str>, param: Option<&str>) -> Self {
        if let Some(path) = path {
            self.path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            };
        }
        if let Some(param) = param {
            self.param = param.to_string();
        }
        self
    }

    async fn fetch(&self, client: &Client, url: &str, payload: &str) -> anyhow::Result<String> {
        let response = client
            .get(url)
            .query(&[(self.param.as_str(), payload)])
            .send()
            .await?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Plugin for SqlErrorsCheck {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn check(&self, target: &str, port: u16, service: &str) -> anyhow::Result<PluginResult> {
        let client = http_client(self.timeout, true)?;
        let url = format!("{}{}", web_url(target, port), self.path);

        let mut triggered = Vec::new();
        let mut answered = 0;
        for payload in SQL_PAYLOADS {
            let body = match self.fetch(&client, &url, payload).await {
                Ok(body) => body.to_lowercase(),
                Err(e) => {
                    debug!("SQL payload {:?} against {} failed: {}", payload, url, e);
                    continue;
                }
            };
            answered += 1;
            if SQL_ERROR_KEYWORDS.iter().any(|keyword| body.contains(keyword)) {
                triggered.push(payload);
            }
        }

        if answered == 0 {
            bail!("no response from {}", url);
        }

        let details = json!({ "endpoint": url, "param": self.param, "payloads": triggered });
        let result = if triggered.is_empty() {
            PluginResult::safe(self.name(), target, port, service, "No SQL errors detected")
        } else {
            PluginResult::vulnerable(
                self.name(),
                target,
                port,
                service,
                format!("SQL errors returned for {}/{} payloads", triggered.len(), SQL_PAYLOADS.len()),
            )
        };
        Ok(result.with_details(details))
    }
}

/// Verifies the server certificate chain over https.
pub struct TlsCertCheck {
    metadata: PluginMetadata,
    timeout: Duration,
}

impl TlsCertCheck {
    pub fn new(metadata: PluginMetadata, timeout: Duration) -> Self {
        Self { metadata, timeout }
    }
}

#[async_trait]
impl Plugin for TlsCertCheck {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn check(&self, target: &str, port: u16, service: &str) -> anyhow::Result<PluginResult> {
        let url = format!("https://{}:{}", target, port);

        let rejection = match http_client(self.timeout, false)?.head(&url).send().await {
            Ok(_) => {
                return Ok(PluginResult::safe(self.name(), target, port, service, "Certificate valid"));
            }
            Err(e) => format!("{:#}", anyhow::Error::new(e)),
        };

        // Only a handshake that succeeds without verification means the certificate is at fault.
        http_client(self.timeout, true)?
            .head(&url)
            .send()
            .await
            .with_context(|| format!("TLS handshake with {} failed", url))?;

        Ok(PluginResult::vulnerable(
            self.name(),
            target,
            port,
            service,
            format!("Certificate rejected - {}", excerpt(&rejection)),
        )
        .with_details(json!({ "reason": rejection })))
    }
}

/// Flags services whose banner matches a configured expression.
pub struct BannerMatchCheck {
    metadata: PluginMetadata,
    pattern: Regex,
    probe: Option<String>,
    timeout: Duration,
}

impl BannerMatchCheck {
    pub fn new(metadata: PluginMetadata, pattern: &str, timeout: Duration) -> Result<Self, regex::Error> {
        Ok(Self {
            metadata,
            pattern: Regex::new(pattern)?,
            probe: None,
            timeout,
        })
    }

    /// Bytes written after connecting, for services that wait for the client.
    pub fn with_probe(mut self, probe: Option<&str>) -> Self {
        self.probe = probe.map(str::to_string);
        self
    }

    async fn read_banner(&self, target: &str, port: u16) -> anyhow::Result<String> {
        let mut stream = timeout(self.timeout, TcpStream::connect((target, port)))
            .await
            .map_err(|_| anyhow!("connect timed out"))?
            .context("Could not connect")?;

        if let Some(probe) = &self.probe {
            stream.write_all(probe.as_bytes()).await?;
        }

        let mut buffer = vec![0u8; 1024];
        let n = match timeout(self.timeout, stream.read(&mut buffer)).await {
            Ok(read) => read?,
            Err(_) => 0,
        };
        Ok(String::from_utf8_lossy(&buffer[..n]).trim().to_string())
    }
}

#[async_trait]
impl Plugin for BannerMatchCheck {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn check(&self, target: &str, port: u16, service: &str) -> anyhow::Result<PluginResult> {
        let banner = self.read_banner(target, port).await?;

        if banner.is_empty() {
            return Ok(PluginResult::safe(self.name(), target, port, service, "No banner received"));
        }

        let details = json!({ "banner": excerpt(&banner), "pattern": self.pattern.as_str() });
        let result = if self.pattern.is_match(&banner) {
            PluginResult::vulnerable(self.name(), target, port, service, "Vulnerable - Banner matched")
        } else {
            PluginResult::safe(self.name(), target, port, service, "Banner did not match")
        };
        Ok(result.with_details(details))
    }
}

/// Template for new checks. Never reports a finding.
pub struct SampleCheck {
    metadata: PluginMetadata,
}

impl SampleCheck {
    pub fn new(metadata: PluginMetadata) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl Plugin for SampleCheck {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn check(&self, target: &str, port: u16, service: &str) -> anyhow::Result<PluginResult> {
        Ok(
            PluginResult::safe(self.name(), target, port, service, "Sample check executed")
                .with_details(json!("This is a template - implement your logic here")),
        )
    }
}
