//! Scripted executor for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use esigate_core::{UpstreamRequest, UpstreamResponse};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::executor::{HttpExecutor, TransportError, TransportErrorKind};

/// Replays queued results in order and records every request it sees.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Result<UpstreamResponse, TransportError>>>,
    requests: Mutex<Vec<UpstreamRequest>>,
    calls: AtomicU32,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<Result<UpstreamResponse, TransportError>>) -> Self {
        Self { script: Mutex::new(script.into()), ..Default::default() }
    }

    /// Executor answering with the given statuses and empty bodies.
    pub fn statuses(statuses: &[u16]) -> Self {
        Self::new(statuses.iter().map(|s| Ok(response(*s, &[], ""))).collect())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpExecutor for ScriptedExecutor {
    async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new(TransportErrorKind::Other, "script exhausted")))
    }
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> UpstreamResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(HeaderName::try_from(*name).unwrap(), HeaderValue::try_from(*value).unwrap());
    }
    UpstreamResponse::new(StatusCode::from_u16(status).unwrap(), map, Bytes::from(body.to_string()))
}

pub fn transport(kind: TransportErrorKind) -> Result<UpstreamResponse, TransportError> {
    Err(TransportError::new(kind, "simulated"))
}
