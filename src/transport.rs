//! HTTP transport seam
//!
//! The extraction client only needs "GET this URL, give me the body or a
//! classified failure". [`ReqwestTransport`] does that over a blocking reqwest
//! client; [`ScriptedTransport`] is an in-memory test double replaying canned replies.

use crate::endpoint::{ApiBase, Endpoint};
use crate::error::{EtlError, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, trace};

pub trait HttpTransport {
    /// Performs one GET. Non-2xx statuses and transport failures come back as
    /// `TransientNetwork` or `PermanentNetwork`.
    fn get(&self, url: &Url) -> Result<String>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn get(&self, url: &Url) -> Result<String> {
        (**self).get(url)
    }
}

/// Maps a non-success HTTP status onto the transient/permanent split.
pub fn classify_status(url: &str, status: u16) -> EtlError {
    match status {
        // request timeout and rate limiting clear up on their own
        408 | 429 | 500..=599 => EtlError::TransientNetwork {
            url: url.to_string(),
            reason: format!("HTTP {}", status),
        },
        _ => EtlError::PermanentNetwork {
            url: url.to_string(),
            status,
        },
    }
}

/// Maps a failed `send()` onto the transient/permanent split. Requests that
/// could not be built and redirect loops fail the same way on every attempt.
pub fn classify_send_error(url: &str, err: &reqwest::Error) -> EtlError {
    if err.is_builder() || err.is_redirect() {
        return EtlError::Config(format!("Request to {} cannot succeed: {}", url, err));
    }
    EtlError::TransientNetwork {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chainetl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EtlError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &Url) -> Result<String> {
        debug!(target: "chainetl::transport", %url, "GET");

        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| classify_send_error(url.as_str(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(url.as_str(), status.as_u16()));
        }

        let body = response.text().map_err(|e| EtlError::TransientNetwork {
            url: url.to_string(),
            reason: format!("Failed to read body: {}", e),
        })?;
        trace!(target: "chainetl::transport", %url, bytes = body.len(), "response");
        Ok(body)
    }
}

/// A canned reply for [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Body(String),
    Status(u16),
    Timeout,
}

/// In-memory test double replaying scripted replies per endpoint.
///
/// Replies queued for an endpoint are served in order; the last one repeats
/// for every later request. Endpoints with no script answer 404.
pub struct ScriptedTransport {
    base: ApiBase,
    replies: RefCell<HashMap<String, VecDeque<Reply>>>,
    requests: RefCell<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(base: ApiBase) -> Self {
        Self {
            base,
            replies: RefCell::new(HashMap::new()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn base(&self) -> &ApiBase {
        &self.base
    }

    pub fn on(&self, endpoint: &Endpoint, reply: Reply) -> Result<()> {
        let url = self.base.url_for(endpoint)?;
        self.replies
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        Ok(())
    }

    pub fn on_json(&self, endpoint: &Endpoint, body: &serde_json::Value) -> Result<()> {
        self.on(endpoint, Reply::Body(body.to_string()))
    }

    pub fn on_text(&self, endpoint: &Endpoint, body: &str) -> Result<()> {
        self.on(endpoint, Reply::Body(body.to_string()))
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self, endpoint: &Endpoint) -> usize {
        let Ok(url) = self.base.url_for(endpoint) else {
            return 0;
        };
        self.requests
            .borrow()
            .iter()
            .filter(|u| u.as_str() == url.as_str())
            .count()
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &Url) -> Result<String> {
        let key = url.to_string();
        self.requests.borrow_mut().push(key.clone());

        let reply = {
            let mut replies = self.replies.borrow_mut();
            match replies.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(status)) if (200..300).contains(&status) => Ok(String::new()),
            Some(Reply::Status(status)) => Err(classify_status(&key, status)),
            Some(Reply::Timeout) => Err(EtlError::TransientNetwork {
                url: key,
                reason: "operation timed out".to_string(),
            }),
            None => Err(classify_status(&key, 404)),
        }
    }
}
