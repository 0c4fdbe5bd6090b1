//! Scripted probe and forwarder doubles shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
};
use url::Url;
use crate::health::probe::{Probe, ProbeError};
use crate::http::forward::{DemotionPolicy, ForwardError, Forwarder};
use crate::load_balancer::backend::Backend;

fn host(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_string()
}

/// A probe whose answer is flipped by the test, globally or per host.
///
/// Answers queued with [`ScriptedProbe::push_answer`] take precedence, one
/// per call, and may take a while to arrive.
#[derive(Debug)]
pub struct ScriptedProbe {
    healthy: AtomicBool,
    script: Mutex<VecDeque<(Duration, bool)>>,
    down_hosts: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    calls_by_host: Mutex<HashMap<String, usize>>,
    last_timeout: Mutex<Option<Duration>>,
}

impl ScriptedProbe {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            script: Mutex::new(VecDeque::new()),
            down_hosts: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            calls_by_host: Mutex::new(HashMap::new()),
            last_timeout: Mutex::new(None),
        })
    }

    pub fn failing() -> Arc<Self> {
        let probe = Self::healthy();
        probe.set_healthy(false);
        probe
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_host_down(&self, host: &str, down: bool) {
        let mut hosts = self.down_hosts.lock().unwrap();
        if down {
            hosts.insert(host.to_string());
        } else {
            hosts.remove(host);
        }
    }

    /// Queue an answer for a later call, returned after `delay`.
    pub fn push_answer(&self, delay: Duration, healthy: bool) {
        self.script.lock().unwrap().push_back((delay, healthy));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, host: &str) -> usize {
        self.calls_by_host.lock().unwrap().get(host).copied().unwrap_or(0)
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        *self.last_timeout.lock().unwrap()
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, target: &Url, timeout: Duration) -> Result<(), ProbeError> {
        let host = host(target);
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.calls_by_host.lock().unwrap().entry(host.clone()).or_default() += 1;
        *self.last_timeout.lock().unwrap() = Some(timeout);

        let scripted = self.script.lock().unwrap().pop_front();
        if let Some((delay, healthy)) = scripted {
            tokio::time::sleep(delay).await;
            return if healthy {
                Ok(())
            } else {
                Err(ProbeError::Status(StatusCode::SERVICE_UNAVAILABLE))
            };
        }

        let down = self.down_hosts.lock().unwrap().contains(&host);
        if self.healthy.load(Ordering::SeqCst) && !down {
            Ok(())
        } else {
            Err(ProbeError::Status(StatusCode::SERVICE_UNAVAILABLE))
        }
    }
}

/// A forwarder that records what it was asked to send.
///
/// Successful responses carry the origin URL as their body.
#[derive(Debug)]
pub struct RecordingForwarder {
    failure: Option<ForwardError>,
    failing_hosts: Mutex<HashMap<String, ForwardError>>,
    requests: Mutex<Vec<(Url, String)>>,
}

impl RecordingForwarder {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            failure: None,
            failing_hosts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(err: ForwardError) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(err),
            failing_hosts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_host(&self, host: &str, err: ForwardError) {
        self.failing_hosts.lock().unwrap().insert(host.to_string(), err);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_for(&self, host: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u.host_str() == Some(host))
            .count()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(&self, origin: &Url, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        self.requests
            .lock()
            .unwrap()
            .push((origin.clone(), request.uri().path().to_string()));

        if let Some(err) = self.failing_hosts.lock().unwrap().get(&host(origin)) {
            return Err(err.clone());
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(Response::new(Body::from(origin.to_string()))),
        }
    }
}

pub fn backend_with(
    cache_window: Duration,
    probe: Arc<ScriptedProbe>,
    forwarder: Arc<RecordingForwarder>,
) -> Backend {
    Backend::new(
        Url::parse("http://localhost:9000").unwrap(),
        cache_window,
        probe,
        forwarder,
        DemotionPolicy::AnyError,
    )
}
