//! Network reachability probe
//!
//! The overall check runs in a fixed order and stops at the first failing
//! stage: DNS resolution of a well-known name, HTTPS to the trust-anchor host,
//! then the custom endpoint or the first candidate cloud endpoint that answers.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{redirect, Client};
use serde::Serialize;
use tokio::net::lookup_host;
use tracing::{debug, error, info, warn};

use crate::errors::ProvisionError;
use crate::storage::settings::ProbeSettings;

/// Outcome of an overall reachability check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub connected: bool,
    pub dns_ok: bool,
    pub https_ok: bool,
    /// Empty when connected
    pub error: String,
    /// Round trip to the trust-anchor host, when it answered
    pub latency: Option<Duration>,
    pub tested_endpoints: Vec<String>,
}

/// Reachability of the cloud from this device
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn check_overall(&self) -> ConnectivityReport;

    async fn check_dns(&self, host: &str) -> bool;

    async fn check_https(&self, url: &str) -> bool;

    /// Check this endpoint instead of the candidate list
    fn set_custom_endpoint(&mut self, url: &str);

    /// Total timeout per request; the connect phase gets half of it
    fn set_timeout_seconds(&mut self, seconds: u64);
}

/// Probe using the system resolver and HEAD requests
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
    dns_host: String,
    trust_anchor_url: String,
    candidate_endpoints: Vec<String>,
    custom_endpoint: Option<String>,
}

impl HttpProbe {
    pub fn new(settings: &ProbeSettings) -> Result<Self, ProvisionError> {
        let timeout = Duration::from_secs(settings.timeout_secs.max(1));
        let mut probe = Self {
            client: build_client(timeout)?,
            timeout,
            dns_host: settings.dns_host.clone(),
            trust_anchor_url: settings.trust_anchor_url.clone(),
            candidate_endpoints: settings.candidate_endpoints.clone(),
            custom_endpoint: None,
        };
        if let Some(endpoint) = &settings.custom_endpoint {
            probe.set_custom_endpoint(endpoint);
        }
        Ok(probe)
    }

    /// Replace the candidate endpoints, in order of preference
    pub fn set_candidate_endpoints(&mut self, endpoints: Vec<String>) {
        self.candidate_endpoints = endpoints;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn custom_endpoint(&self) -> Option<&str> {
        self.custom_endpoint.as_deref()
    }
}

fn build_client(timeout: Duration) -> Result<Client, ProvisionError> {
    let client = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout / 2)
        .redirect(redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}

/// Add an `https://` scheme to bare host names
fn normalize_endpoint(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn check_overall(&self) -> ConnectivityReport {
        info!("Starting connectivity check...");
        let mut report = ConnectivityReport::default();

        report.dns_ok = self.check_dns(&self.dns_host).await;
        if !report.dns_ok {
            report.error = "DNS resolution failed".to_string();
            error!("DNS resolution check failed for {}", self.dns_host);
            return report;
        }

        let started = Instant::now();
        report.https_ok = self.check_https(&self.trust_anchor_url).await;
        if !report.https_ok {
            report.error = "HTTPS connectivity check failed".to_string();
            error!("HTTPS connectivity check failed for {}", self.trust_anchor_url);
            return report;
        }
        report.latency = Some(started.elapsed());

        if let Some(endpoint) = &self.custom_endpoint {
            report.tested_endpoints.push(endpoint.clone());
            if !self.check_https(endpoint).await {
                report.error = "Failed to connect to custom endpoint".to_string();
                error!("Failed to connect to custom endpoint: {}", endpoint);
                return report;
            }
        } else {
            let mut reached = false;
            for endpoint in &self.candidate_endpoints {
                report.tested_endpoints.push(endpoint.clone());
                if self.check_https(endpoint).await {
                    debug!("Successfully connected to: {}", endpoint);
                    reached = true;
                    break;
                }
            }
            if !reached {
                report.error = "Failed to connect to any cloud endpoint".to_string();
                error!("Failed to connect to any cloud endpoint");
                return report;
            }
        }

        report.connected = true;
        info!(
            "Connectivity check passed. Latency: {}ms",
            report.latency.unwrap_or_default().as_millis()
        );
        report
    }

    async fn check_dns(&self, host: &str) -> bool {
        match tokio::time::timeout(self.timeout, lookup_host((host, 443))).await {
            Ok(Ok(mut addrs)) => match addrs.next() {
                Some(addr) => {
                    debug!("Resolved {} to {}", host, addr.ip());
                    true
                }
                None => {
                    debug!("No addresses for {}", host);
                    false
                }
            },
            Ok(Err(e)) => {
                debug!("Failed to resolve hostname {}: {}", host, e);
                false
            }
            Err(_) => {
                debug!("Timed out resolving {}", host);
                false
            }
        }
    }

    async fn check_https(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || status.is_redirection() {
                    debug!("Successfully connected to {} (HTTP {})", url, status.as_u16());
                    true
                } else {
                    debug!("HTTP request to {} returned status: {}", url, status.as_u16());
                    false
                }
            }
            Err(e) => {
                debug!("Request to {} failed: {}", url, e);
                false
            }
        }
    }

    fn set_custom_endpoint(&mut self, url: &str) {
        let endpoint = normalize_endpoint(url);
        if url::Url::parse(&endpoint).is_err() {
            warn!("Ignoring malformed custom endpoint: {}", url);
            return;
        }
        debug!("Custom endpoint set to: {}", endpoint);
        self.custom_endpoint = Some(endpoint);
    }

    fn set_timeout_seconds(&mut self, seconds: u64) {
        let timeout = Duration::from_secs(seconds.max(1));
        match build_client(timeout) {
            Ok(client) => {
                self.client = client;
                self.timeout = timeout;
                debug!("Connectivity check timeout set to: {} seconds", seconds);
            }
            Err(e) => warn!("Keeping previous timeout, client rebuild failed: {}", e),
        }
    }
}
