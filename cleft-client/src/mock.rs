//! In-memory transport with scripted responses, for tests and offline demos.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

use crate::error::{ClientError, Result};
use crate::gateway::{ApiRequest, ApiResponse, Method, Transport};

type RouteKey = (Method, String);

#[derive(Clone)]
enum Scripted {
    Respond(ApiResponse),
    Fail(String),
}

/// Answers requests by `(method, path)`. One-shot responses queued with
/// [`ScriptedTransport::respond_once`] are consumed before the sticky one.
/// Unknown routes answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    sticky: DashMap<RouteKey, Scripted>,
    queued: DashMap<RouteKey, VecDeque<Scripted>>,
    gates: DashMap<RouteKey, Arc<Semaphore>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        self.sticky.insert(
            (method, path.to_string()),
            Scripted::Respond(ApiResponse::new(status, body)),
        );
    }

    pub fn respond_once(&self, method: Method, path: &str, status: u16, body: Value) {
        self.queued
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Scripted::Respond(ApiResponse::new(status, body)));
    }

    /// Simulate a network failure on the route.
    pub fn fail(&self, method: Method, path: &str, message: &str) {
        self.sticky.insert(
            (method, path.to_string()),
            Scripted::Fail(message.to_string()),
        );
    }

    /// Hold responses on the route until [`ScriptedTransport::release`] is
    /// called. The request is logged before it blocks.
    pub fn hold(&self, method: Method, path: &str) {
        self.gates
            .insert((method, path.to_string()), Arc::new(Semaphore::new(0)));
    }

    /// Let one held response through.
    pub fn release(&self, method: Method, path: &str) {
        if let Some(gate) = self.gates.get(&(method, path.to_string())) {
            gate.add_permits(1);
        }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn next_scripted(&self, key: &RouteKey) -> Option<Scripted> {
        if let Some(mut queue) = self.queued.get_mut(key) {
            if let Some(next) = queue.pop_front() {
                return Some(next);
            }
        }
        self.sticky.get(key).map(|entry| entry.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let key = (request.method, request.path.clone());
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let gate = self.gates.get(&key).map(|entry| Arc::clone(entry.value()));
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            permit.forget();
        }

        match self.next_scripted(&key) {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(ClientError::Transport(message)),
            None => Ok(ApiResponse::new(404, json!({"detail": "Not Found"}))),
        }
    }
}
