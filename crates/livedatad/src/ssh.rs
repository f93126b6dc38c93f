//! SSH device transport
//!
//! One OpenSSH control master per session (`ssh -M -N -S <socket>`); every
//! command runs as a separate `ssh -S <socket> host <command>` over that
//! master, so the device sees a single login per job.

use async_trait::async_trait;
use livedata_common::config::SshConfig;
use livedata_common::error::{LivedataError, Result};
use livedata_common::transport::{DeviceSession, DeviceTransport};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, warn};

const CHECK_INTERVAL: Duration = Duration::from_millis(100);
const MASTER_EXIT_WAIT: Duration = Duration::from_secs(5);

pub struct SshTransport {
    config: SshConfig,
    sequence: AtomicU64,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            sequence: AtomicU64::new(0),
        }
    }

    /// Options shared by the master and check invocations
    fn connection_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-p".to_string(),
            self.config.port.to_string(),
        ];
        if let Some(user) = &self.config.user {
            args.push("-l".to_string());
            args.push(user.clone());
        }
        for option in &self.config.extra_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args
    }

    fn control_path(&self, host: &str) -> PathBuf {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let host: String = host
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        self.config
            .control_dir
            .join(format!("{}-{}-{}.sock", host, std::process::id(), n))
    }

    async fn master_is_up(&self, socket: &Path, host: &str) -> bool {
        Command::new(&self.config.binary)
            .arg("-S")
            .arg(socket)
            .args(["-O", "check"])
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl DeviceTransport for SshTransport {
    async fn open_session(&self, address: &str) -> Result<Box<dyn DeviceSession>> {
        let connection_error = |reason: String| LivedataError::ConnectionError {
            address: address.to_string(),
            reason,
        };

        tokio::fs::create_dir_all(&self.config.control_dir)
            .await
            .map_err(|e| {
                connection_error(format!(
                    "cannot create {}: {}",
                    self.config.control_dir.display(),
                    e
                ))
            })?;

        let socket = self.control_path(address);
        debug!("Starting ssh control master for {} at {}", address, socket.display());

        let mut master = Command::new(&self.config.binary)
            .args(self.connection_args())
            .args(["-M", "-N", "-S"])
            .arg(&socket)
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| connection_error(format!("failed to start {}: {}", self.config.binary, e)))?;

        let deadline = Instant::now() + Duration::from_secs(self.config.connect_timeout_secs.max(1));
        loop {
            if self.master_is_up(&socket, address).await {
                break;
            }
            match master.try_wait() {
                Ok(Some(status)) => {
                    let stderr = read_stderr(&mut master).await;
                    return Err(connection_error(if stderr.is_empty() {
                        format!("ssh exited with {}", status)
                    } else {
                        stderr
                    }));
                }
                Ok(None) => {}
                Err(e) => return Err(connection_error(e.to_string())),
            }
            if Instant::now() >= deadline {
                let _ = master.start_kill();
                return Err(connection_error("timed out waiting for ssh".to_string()));
            }
            tokio::time::sleep(CHECK_INTERVAL).await;
        }

        debug!("Session to {} is up", address);
        Ok(Box::new(SshSession {
            binary: self.config.binary.clone(),
            socket,
            host: address.to_string(),
            master: Some(master),
        }))
    }
}

async fn read_stderr(child: &mut Child) -> String {
    let mut buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buf).await;
    }
    buf.trim().to_string()
}

pub struct SshSession {
    binary: String,
    socket: PathBuf,
    host: String,
    master: Option<Child>,
}

impl SshSession {
    fn remove_socket(&self) {
        if let Err(e) = std::fs::remove_file(&self.socket) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove {}: {}", self.socket.display(), e);
            }
        }
    }
}

#[async_trait]
impl DeviceSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<String> {
        let command_error = |reason: String| LivedataError::CommandExecutionError {
            command: command.to_string(),
            reason,
        };

        let output = Command::new(&self.binary)
            .arg("-S")
            .arg(&self.socket)
            .arg(&self.host)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| command_error(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(command_error(if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut master) = self.master.take() else {
            return Ok(());
        };

        let exit = Command::new(&self.binary)
            .arg("-S")
            .arg(&self.socket)
            .args(["-O", "exit"])
            .arg(&self.host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = exit {
            warn!("ssh -O exit for {} failed: {}", self.host, e);
        }

        if tokio::time::timeout(MASTER_EXIT_WAIT, master.wait()).await.is_err() {
            warn!("ssh master for {} did not exit, killing it", self.host);
            let _ = master.kill().await;
        }
        self.remove_socket();
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(mut master) = self.master.take() {
            let _ = master.start_kill();
        }
        self.remove_socket();
    }
}
