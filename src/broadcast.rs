//! Submitting signed transactions to an Esplora-compatible HTTP endpoint.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

use crate::config::BroadcastConfig;
use crate::error::BroadcastError;

/// Something that can relay a raw transaction to the network.
pub trait Broadcaster {
    /// Submit `raw_hex` and return the txid reported by the endpoint.
    fn broadcast(&self, raw_hex: &str) -> Result<String, BroadcastError>;
}

/// POSTs the hex body to `{endpoint}/tx`.
#[derive(Debug, Clone)]
pub struct EsploraBroadcaster {
    endpoint: String,
    max_retries: u32,
    backoff: Duration,
    client: Client,
}

enum Attempt {
    Retry(String),
    Fail(BroadcastError),
}

impl EsploraBroadcaster {
    pub fn new(config: &BroadcastConfig) -> Result<Self, BroadcastError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(EsploraBroadcaster {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            backoff: config.backoff(),
            client,
        })
    }

    pub fn url(&self) -> String {
        format!("{}/tx", self.endpoint)
    }

    fn post_once(&self, raw_hex: &str) -> Result<String, Attempt> {
        let response = self
            .client
            .post(self.url())
            .header(CONTENT_TYPE, "text/plain")
            .body(raw_hex.to_string())
            .send()
            .map_err(|e| Attempt::Retry(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| Attempt::Retry(e.to_string()))?;

        if status.is_success() {
            Ok(body.trim().to_string())
        } else if status.is_server_error() {
            Err(Attempt::Retry(format!("{}: {}", status, body)))
        } else {
            // The node's verification message, untouched.
            Err(Attempt::Fail(BroadcastError::Rejected {
                status: status.as_u16(),
                message: body,
            }))
        }
    }
}

/// Delay before retry number `retry` (starting at 1).
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(1u32 << retry.saturating_sub(1).min(16))
}

impl Broadcaster for EsploraBroadcaster {
    fn broadcast(&self, raw_hex: &str) -> Result<String, BroadcastError> {
        let attempts = self.max_retries + 1;
        let mut last = String::new();
        for attempt in 1..=attempts {
            match self.post_once(raw_hex) {
                Ok(txid) => {
                    info!(txid = %txid, attempt, "transaction accepted");
                    return Ok(txid);
                }
                Err(Attempt::Fail(e)) => {
                    info!(error = %e, "transaction rejected");
                    return Err(e);
                }
                Err(Attempt::Retry(reason)) => {
                    warn!(attempt, attempts, reason = %reason, "broadcast failed");
                    last = reason;
                    if attempt < attempts {
                        thread::sleep(backoff_delay(self.backoff, attempt));
                    }
                }
            }
        }
        Err(BroadcastError::RetriesExhausted { attempts, last })
    }
}
