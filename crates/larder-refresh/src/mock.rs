//! Scripted fetcher for testing

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::{Fetcher, RefreshError, RefreshResult};

/// Fetcher that serves canned bodies per locator
pub struct MockFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, VecDeque<String>>>,
    calls: Mutex<HashMap<String, usize>>,
    gate: Option<Arc<Semaphore>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            bodies: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            gate: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Hold every fetch until [`MockFetcher::release`] hands out a permit
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Serve `body` for `locator` from now on
    pub fn respond(&self, locator: &str, body: impl Into<Vec<u8>>) {
        self.bodies
            .lock()
            .unwrap()
            .insert(locator.to_string(), body.into());
    }

    /// Make the next fetch of `locator` fail with `message`
    pub fn fail_next(&self, locator: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry(locator.to_string())
            .or_default()
            .push_back(message.to_string());
    }

    /// Let `n` held fetches proceed
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Total fetches started
    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Highest number of fetches that were running at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, locator: &str, out: &mut File) -> RefreshResult<u64> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(locator.to_string())
            .or_default() += 1;

        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(locator)
            .and_then(VecDeque::pop_front);
        let body = self.bodies.lock().unwrap().get(locator).cloned();

        let result = match (failure, body) {
            (Some(message), _) => Err(RefreshError::Transport(message)),
            (None, None) => Err(RefreshError::Transport(format!("no body for {}", locator))),
            (None, Some(body)) => match out.write_all(&body).await {
                Ok(()) => Ok(body.len() as u64),
                Err(e) => Err(e.into()),
            },
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
