//! Device transport abstraction.
//!
//! Production code uses the SSH transport in livedatad. Tests use
//! `FakeTransport` with pre-configured responses, so no device is touched.

use crate::error::{LivedataError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ============================================================================
// Transport Traits
// ============================================================================

/// Opens CLI sessions to devices
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Open a session; fails with `ConnectionError`
    async fn open_session(&self, address: &str) -> Result<Box<dyn DeviceSession>>;
}

/// One open CLI session. Commands must not be interleaved.
#[async_trait]
pub trait DeviceSession: Send {
    /// Run a command and return its captured output; fails with `CommandExecutionError`
    async fn run(&mut self, command: &str) -> Result<String>;

    /// Orderly close
    async fn close(&mut self) -> Result<()>;

    /// Immediate release for a session dropped without `close`
    /// (cancellation, panics). Must not block.
    fn abort(&mut self);
}

// ============================================================================
// Fake Transport (Testing)
// ============================================================================

#[derive(Debug, Clone)]
pub enum FakeResponse {
    Output(String),
    Fail(String),
    /// Never completes; used to exercise cancellation
    Hang,
}

/// Everything the fake saw, for assertions
#[derive(Debug, Clone, Default)]
pub struct FakeTransportLog {
    pub connect_attempts: Vec<String>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub sessions_aborted: usize,
    pub commands: Vec<String>,
}

impl FakeTransportLog {
    /// Sessions that were opened but neither closed nor aborted
    pub fn leaked_sessions(&self) -> usize {
        self.sessions_opened - self.sessions_closed - self.sessions_aborted
    }
}

/// Fake transport for deterministic testing
///
/// ```rust,ignore
/// let fake = FakeTransport::new()
///     .respond("show version", "IOS 15.2")
///     .fail("show tech", "permission denied");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    responses: HashMap<String, FakeResponse>,
    connect_error: Option<String>,
    close_error: Option<String>,
    log: Arc<Mutex<FakeTransportLog>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &str, output: &str) -> Self {
        self.responses
            .insert(command.to_string(), FakeResponse::Output(output.to_string()));
        self
    }

    pub fn fail(mut self, command: &str, reason: &str) -> Self {
        self.responses
            .insert(command.to_string(), FakeResponse::Fail(reason.to_string()));
        self
    }

    pub fn hang(mut self, command: &str) -> Self {
        self.responses.insert(command.to_string(), FakeResponse::Hang);
        self
    }

    pub fn refuse_connections(mut self, reason: &str) -> Self {
        self.connect_error = Some(reason.to_string());
        self
    }

    /// Sessions still count as closed, but `close` reports an error
    pub fn fail_close(mut self, reason: &str) -> Self {
        self.close_error = Some(reason.to_string());
        self
    }

    pub fn log(&self) -> FakeTransportLog {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DeviceTransport for FakeTransport {
    async fn open_session(&self, address: &str) -> Result<Box<dyn DeviceSession>> {
        if let Ok(mut log) = self.log.lock() {
            log.connect_attempts.push(address.to_string());
        }
        if let Some(reason) = &self.connect_error {
            return Err(LivedataError::ConnectionError {
                address: address.to_string(),
                reason: reason.clone(),
            });
        }
        if let Ok(mut log) = self.log.lock() {
            log.sessions_opened += 1;
        }
        Ok(Box::new(FakeSession {
            responses: self.responses.clone(),
            close_error: self.close_error.clone(),
            log: Arc::clone(&self.log),
            open: true,
        }))
    }
}

struct FakeSession {
    responses: HashMap<String, FakeResponse>,
    close_error: Option<String>,
    log: Arc<Mutex<FakeTransportLog>>,
    open: bool,
}

#[async_trait]
impl DeviceSession for FakeSession {
    async fn run(&mut self, command: &str) -> Result<String> {
        if let Ok(mut log) = self.log.lock() {
            log.commands.push(command.to_string());
        }
        match self.responses.get(command).cloned() {
            Some(FakeResponse::Output(output)) => Ok(output),
            Some(FakeResponse::Fail(reason)) => Err(LivedataError::CommandExecutionError {
                command: command.to_string(),
                reason,
            }),
            Some(FakeResponse::Hang) => std::future::pending().await,
            None => Ok(String::new()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            if let Ok(mut log) = self.log.lock() {
                log.sessions_closed += 1;
            }
        }
        match &self.close_error {
            Some(reason) => Err(LivedataError::ConnectionError {
                address: "fake".to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn abort(&mut self) {
        if self.open {
            self.open = false;
            if let Ok(mut log) = self.log.lock() {
                log.sessions_aborted += 1;
            }
        }
    }
}
