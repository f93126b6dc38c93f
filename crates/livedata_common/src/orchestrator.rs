//! Execution orchestrator.
//!
//! Runs rendered commands over exactly one device session:
//!
//! ```text
//! Idle -> SessionOpen -> Running(0) -> Running(1) ... -> Closing -> Closed
//! ```
//!
//! The session is owned by a `SessionGuard`. Every exit path goes through
//! `Closing`, and a guard dropped before that (job cancelled mid-command)
//! aborts the session in `Drop`.
//!
//! Invariants:
//! - At most one session per execution, no reconnect
//! - Commands run strictly in order, one at a time
//! - The first failing command aborts the rest; no partial results are returned

use crate::error::{LivedataError, Result};
use crate::transport::{DeviceSession, DeviceTransport};
use crate::types::{address_host, Device, ExecutionResult, RenderedCommand};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "index")]
pub enum ExecutionState {
    Idle,
    SessionOpen,
    Running(usize),
    Closing,
    Closed,
}

/// Owns an open session and guarantees it is released
pub struct SessionGuard {
    session: Option<Box<dyn DeviceSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn DeviceSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub async fn run(&mut self, command: &str) -> Result<String> {
        match self.session.as_mut() {
            Some(session) => session.run(command).await,
            None => Err(LivedataError::CommandExecutionError {
                command: command.to_string(),
                reason: "session already closed".to_string(),
            }),
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let result = session.close().await;
        // Only forget the session once close has finished; if this future is
        // dropped mid-close, Drop still aborts it.
        self.session = None;
        result
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            warn!("Device session dropped while open, aborting");
            session.abort();
        }
    }
}

pub struct Orchestrator<'t> {
    transport: &'t dyn DeviceTransport,
    state: ExecutionState,
    history: Vec<ExecutionState>,
}

impl<'t> Orchestrator<'t> {
    pub fn new(transport: &'t dyn DeviceTransport) -> Self {
        Self {
            transport,
            state: ExecutionState::Idle,
            history: vec![ExecutionState::Idle],
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Every state visited so far, in order
    pub fn history(&self) -> &[ExecutionState] {
        &self.history
    }

    fn transition(&mut self, next: ExecutionState) {
        debug!("Execution state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Run all commands against the managed device over one session
    pub async fn execute(
        &mut self,
        device: &Device,
        commands: &[RenderedCommand],
    ) -> Result<Vec<ExecutionResult>> {
        let address = device
            .usable_address()
            .ok_or_else(|| LivedataError::NoManagementAddress {
                device: device.name.clone(),
            })?;

        debug!("Opening session to {} ({})", device.name, address);
        let session = match self.transport.open_session(address_host(address)).await {
            Ok(session) => session,
            Err(e) => {
                self.transition(ExecutionState::Closed);
                return Err(as_connection_error(address, e));
            }
        };
        let mut guard = SessionGuard::new(session);
        self.transition(ExecutionState::SessionOpen);

        let outcome = self.run_commands(&mut guard, device, commands).await;

        self.transition(ExecutionState::Closing);
        let closed = guard.close().await;
        self.transition(ExecutionState::Closed);

        if let Err(e) = closed {
            warn!("Closing session to {} failed: {}", device.name, e);
        }
        outcome
    }

    async fn run_commands(
        &mut self,
        guard: &mut SessionGuard,
        device: &Device,
        commands: &[RenderedCommand],
    ) -> Result<Vec<ExecutionResult>> {
        let mut results = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            self.transition(ExecutionState::Running(index));
            debug!("Executing '{}' on device {}", command.rendered, device.name);

            let stdout = match guard.run(&command.rendered).await {
                Ok(stdout) => stdout,
                Err(e) => {
                    warn!(
                        "Command {} of {} failed on {}, discarding {} completed result(s)",
                        index + 1,
                        commands.len(),
                        device.name,
                        results.len()
                    );
                    return Err(as_command_error(&command.rendered, e));
                }
            };

            results.push(ExecutionResult {
                command: command.rendered.clone(),
                stdout,
                stderr: String::new(),
            });
        }
        Ok(results)
    }
}

/// Convenience wrapper for a single execution
pub async fn execute(
    transport: &dyn DeviceTransport,
    device: &Device,
    commands: &[RenderedCommand],
) -> Result<Vec<ExecutionResult>> {
    Orchestrator::new(transport).execute(device, commands).await
}

fn as_connection_error(address: &str, err: LivedataError) -> LivedataError {
    match err {
        LivedataError::ConnectionError { .. } => err,
        other => LivedataError::ConnectionError {
            address: address.to_string(),
            reason: other.to_string(),
        },
    }
}

fn as_command_error(command: &str, err: LivedataError) -> LivedataError {
    match err {
        LivedataError::CommandExecutionError { .. } => err,
        other => LivedataError::CommandExecutionError {
            command: command.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakeTransport;
    use crate::types::OperationalState;
    use std::time::Duration;

    fn switch() -> Device {
        Device {
            id: "d1".to_string(),
            name: "sw-dist-1".to_string(),
            management_address: Some("192.0.2.10/24".to_string()),
            operational_state: OperationalState::Active,
            cluster_id: None,
            platform_id: None,
        }
    }

    fn commands(list: &[&str]) -> Vec<RenderedCommand> {
        list.iter()
            .map(|c| RenderedCommand {
                template: c.to_string(),
                rendered: c.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_runs_all_commands_in_order() {
        let fake = FakeTransport::new()
            .respond("show interface Gi1/0/1", "Gi1/0/1 is up")
            .respond("show mac address-table interface Gi1/0/1", "10  aabb.cc00.0100  DYNAMIC");
        let mut orchestrator = Orchestrator::new(&fake);
        let results = orchestrator
            .execute(
                &switch(),
                &commands(&["show interface Gi1/0/1", "show mac address-table interface Gi1/0/1"]),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].command, "show interface Gi1/0/1");
        assert_eq!(results[0].stdout, "Gi1/0/1 is up");
        assert!(results[1].stderr.is_empty());
        assert_eq!(
            orchestrator.history(),
            &[
                ExecutionState::Idle,
                ExecutionState::SessionOpen,
                ExecutionState::Running(0),
                ExecutionState::Running(1),
                ExecutionState::Closing,
                ExecutionState::Closed,
            ]
        );

        let log = fake.log();
        assert_eq!(log.connect_attempts, vec!["192.0.2.10"]);
        assert_eq!(log.sessions_opened, 1);
        assert_eq!(log.sessions_closed, 1);
    }

    #[tokio::test]
    async fn test_second_of_three_fails() {
        let fake = FakeTransport::new()
            .respond("show version", "IOS XE")
            .fail("show interface Gi1/0/9", "% Invalid input detected")
            .respond("show clock", "12:00");
        let err = execute(
            &fake,
            &switch(),
            &commands(&["show version", "show interface Gi1/0/9", "show clock"]),
        )
        .await
        .unwrap_err();

        match &err {
            LivedataError::CommandExecutionError { command, .. } => {
                assert_eq!(command, "show interface Gi1/0/9")
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let log = fake.log();
        // Third command never ran, session still closed
        assert_eq!(log.commands, vec!["show version", "show interface Gi1/0/9"]);
        assert_eq!(log.sessions_closed, 1);
        assert_eq!(log.leaked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_runs_nothing() {
        let fake = FakeTransport::new().refuse_connections("connection refused");
        let mut orchestrator = Orchestrator::new(&fake);
        let err = orchestrator
            .execute(&switch(), &commands(&["show version"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "connection_error");
        assert_eq!(orchestrator.state(), ExecutionState::Closed);
        assert!(fake.log().commands.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_releases_session() {
        let fake = FakeTransport::new()
            .respond("show version", "IOS XE")
            .hang("show tech-support");
        let device = switch();
        let cmds = commands(&["show version", "show tech-support"]);

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            execute(&fake, &device, &cmds),
        )
        .await;
        assert!(outcome.is_err(), "execution should have been cancelled");

        let log = fake.log();
        assert_eq!(log.sessions_opened, 1);
        assert_eq!(log.sessions_aborted, 1);
        assert_eq!(log.leaked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_device_without_address_never_connects() {
        let fake = FakeTransport::new();
        let mut device = switch();
        device.management_address = None;
        let err = execute(&fake, &device, &commands(&["show version"])).await.unwrap_err();
        assert_eq!(err.kind(), "no_management_address");
        assert!(fake.log().connect_attempts.is_empty());
    }

    #[tokio::test]
    async fn test_close_failure_does_not_mask_command_failure() {
        let fake = FakeTransport::new()
            .fail("show interface Gi1/0/1", "% Invalid input")
            .fail_close("control socket gone");
        let mut orchestrator = Orchestrator::new(&fake);
        let err = orchestrator
            .execute(&switch(), &commands(&["show interface Gi1/0/1", "show clock"]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "command_execution_error");
        assert!(err.to_string().contains("show interface Gi1/0/1"));
        assert_eq!(orchestrator.state(), ExecutionState::Closed);
        let log = fake.log();
        assert_eq!(log.sessions_closed, 1);
        assert_eq!(log.leaked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_close_failure_after_success_keeps_results() {
        let fake = FakeTransport::new()
            .respond("show clock", "*12:00:00.000 UTC Mon Mar 4 2024")
            .fail_close("control socket gone");
        let results = execute(&fake, &switch(), &commands(&["show clock"])).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(fake.log().sessions_closed, 1);
    }
}
