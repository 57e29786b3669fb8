use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
    time::Duration,
};

use anyhow::Context;

use crate::error::HttpError;

/// Read-only GET capability shared by the resolver and the artwork cache.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, HttpError>;
}

pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    bearer_token: Option<String>,
}

impl ReqwestClient {
    pub fn new(timeout: Duration, bearer_token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("now_playing_ticker/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            bearer_token,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let mut request = self.client.get(url);
        if let Some(token) = self.bearer_token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status.as_u16()));
        }
        let body = response
            .bytes()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// In-process client serving canned responses. Used by `--demo` and tests.
#[derive(Default)]
pub struct MemoryHttp {
    routes: Mutex<HashMap<String, Result<Vec<u8>, HttpError>>>,
    gates: Mutex<HashMap<String, Receiver<()>>>,
    requests: Mutex<Vec<String>>,
}

/// Holds the next request for a URL until released or dropped.
pub struct Gate(Sender<()>);

impl Gate {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

impl MemoryHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.into(), Ok(body.into()));
        }
    }

    pub fn fail(&self, url: impl Into<String>, error: HttpError) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.into(), Err(error));
        }
    }

    pub fn gate(&self, url: impl Into<String>) -> Gate {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut gates) = self.gates.lock() {
            gates.insert(url.into(), rx);
        }
        Gate(tx)
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == url).count()
    }
}

impl HttpClient for MemoryHttp {
    fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_owned());
        }

        let gate = self.gates.lock().ok().and_then(|mut gates| gates.remove(url));
        if let Some(rx) = gate {
            let _ = rx.recv();
        }

        self.routes
            .lock()
            .map_err(|_| HttpError::Transport("route table poisoned".into()))?
            .get(url)
            .cloned()
            .unwrap_or(Err(HttpError::Status(404)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_routes_are_not_found() {
        let http = MemoryHttp::new();
        assert_eq!(http.get("https://nowhere"), Err(HttpError::Status(404)));
        assert_eq!(http.request_count("https://nowhere"), 1);
    }

    #[test]
    fn canned_responses_are_returned() {
        let http = MemoryHttp::new();
        http.respond("https://img/a.png", b"bytes".to_vec());
        http.fail("https://img/b.png", HttpError::Transport("reset".into()));
        assert_eq!(http.get("https://img/a.png").unwrap(), b"bytes");
        assert!(matches!(
            http.get("https://img/b.png"),
            Err(HttpError::Transport(_))
        ));
    }
}
