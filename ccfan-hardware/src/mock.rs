//! Mock implementations for testing
//!
//! In-memory transport and connector that record what the link writes and
//! replay scripted device responses, so link and control loop behaviour can
//! be tested without a board attached.

use crate::serial_driver::{Connector, LineTransport};
use async_trait::async_trait;
use ccfan_core::{CcFanError, Endpoint, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    written: Vec<String>,
    incoming: VecDeque<String>,
    responses: HashMap<String, Vec<String>>,
    fail_writes: bool,
    fail_writes_after: Option<usize>,
    fail_close: bool,
    output_clears: usize,
    closed: bool,
}

/// Shared view of a mock transport's state
///
/// Stays usable after the transport has been moved into a link.
#[derive(Debug, Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Queue lines the device answers with whenever `command` is written
    pub fn respond_to(&self, command: &str, lines: &[&str]) {
        self.with_state(|s| {
            s.responses.insert(
                command.to_string(),
                lines.iter().map(|l| l.to_string()).collect(),
            )
        });
    }

    /// Queue lines as if the device had already sent them
    pub fn push_incoming(&self, lines: &[&str]) {
        self.with_state(|s| s.incoming.extend(lines.iter().map(|l| l.to_string())));
    }

    /// Make every write fail
    pub fn fail_writes(&self, fail: bool) {
        self.with_state(|s| s.fail_writes = fail);
    }

    /// Let `count` more writes succeed, then fail the rest
    pub fn fail_writes_after(&self, count: usize) {
        self.with_state(|s| s.fail_writes_after = Some(s.written.len() + count));
    }

    /// Make close report an error
    pub fn fail_close(&self, fail: bool) {
        self.with_state(|s| s.fail_close = fail);
    }

    /// Lines written so far, without delimiters
    pub fn written(&self) -> Vec<String> {
        self.with_state(|s| s.written.clone())
    }

    /// Duty commands written so far
    pub fn duty_commands(&self) -> Vec<String> {
        self.with_state(|s| {
            s.written
                .iter()
                .filter(|l| l.starts_with("gpufan "))
                .cloned()
                .collect()
        })
    }

    /// Lines received but not read yet
    pub fn pending_incoming(&self) -> usize {
        self.with_state(|s| s.incoming.len())
    }

    /// Number of output buffer clears
    pub fn output_clears(&self) -> usize {
        self.with_state(|s| s.output_clears)
    }

    /// Whether close was called
    pub fn is_closed(&self) -> bool {
        self.with_state(|s| s.closed)
    }
}

/// Mock line transport
#[derive(Debug, Default)]
pub struct MockTransport {
    handle: MockHandle,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport sharing the given handle's state
    pub fn with_handle(handle: MockHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl LineTransport for MockTransport {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.handle.with_state(|s| {
            let over_budget = s
                .fail_writes_after
                .is_some_and(|limit| s.written.len() >= limit);
            if s.closed || s.fail_writes || over_budget {
                return Err(CcFanError::Serial("Write failed: mock failure".to_string()));
            }

            s.written.push(line.to_string());
            if let Some(reply) = s.responses.get(line).cloned() {
                s.incoming.extend(reply);
            }
            Ok(())
        })
    }

    async fn read_line(&mut self, wait: Duration) -> Result<Option<String>> {
        if let Some(line) = self.handle.with_state(|s| s.incoming.pop_front()) {
            return Ok(Some(line));
        }
        // Nothing arrives: behave like a quiet serial line
        tokio::time::sleep(wait).await;
        Ok(None)
    }

    fn clear_input_buffer(&mut self) -> Result<()> {
        self.handle.with_state(|s| s.incoming.clear());
        Ok(())
    }

    fn clear_output_buffer(&mut self) -> Result<()> {
        self.handle.with_state(|s| s.output_clears += 1);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.handle.with_state(|s| {
            s.closed = true;
            if s.fail_close {
                Err(CcFanError::Serial("Close failed: mock failure".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

/// Connector handing out mock transports that share one handle
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    handle: MockHandle,
    refuse: bool,
    opened: Arc<Mutex<Vec<Endpoint>>>,
}

impl MockConnector {
    pub fn new(handle: MockHandle) -> Self {
        Self {
            handle,
            ..Self::default()
        }
    }

    /// Connector whose every open attempt fails
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Endpoints open was called with
    pub fn opened(&self) -> Vec<Endpoint> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn LineTransport>> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(endpoint.clone());

        if self.refuse {
            return Err(CcFanError::Connection {
                endpoint: endpoint.to_string(),
                reason: "Permission denied".to_string(),
            });
        }
        Ok(Box::new(MockTransport::with_handle(self.handle.clone())))
    }
}
