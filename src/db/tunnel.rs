use crate::config::SshConfig;
use crate::error::{EtlError, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info};

const READY_TIMEOUT: Duration = Duration::from_secs(20);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// `ssh -N -L` local port forward. The ssh process is killed when the tunnel drops.
pub struct SshTunnel {
    child: Child,
    local_port: u16,
}

pub fn forward_spec(local_port: u16, remote_host: &str, remote_port: u16) -> String {
    format!("{local_port}:{remote_host}:{remote_port}")
}

impl SshTunnel {
    /// Forwards `127.0.0.1:<local_port>` to `remote_host:remote_port` as seen from the
    /// SSH server, and waits until the local port accepts connections.
    pub async fn open(ssh: &SshConfig, remote_host: &str, remote_port: u16) -> Result<Self> {
        let mut command = Command::new("ssh");
        command
            .arg("-N")
            .args(["-o", "ExitOnForwardFailure=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-p")
            .arg(ssh.port.to_string())
            .arg("-L")
            .arg(forward_spec(ssh.local_port, remote_host, remote_port));
        if let Some(key) = &ssh.key_path {
            command.arg("-i").arg(key);
        }
        command
            .arg(format!("{}@{}", ssh.user, ssh.host))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| EtlError::Tunnel(format!("failed to spawn ssh: {e}")))?;
        let mut tunnel = Self {
            child,
            local_port: ssh.local_port,
        };
        tunnel.wait_until_ready().await?;
        info!("SSH tunnel up: 127.0.0.1:{} -> {}:{} via {}", ssh.local_port, remote_host, remote_port, ssh.host);
        Ok(tunnel)
    }

    async fn wait_until_ready(&mut self) -> Result<()> {
        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Err(EtlError::Tunnel(format!("ssh exited before the tunnel was ready ({status})")));
            }
            if TcpStream::connect(("127.0.0.1", self.local_port)).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(EtlError::Tunnel(format!(
                    "local port {} not ready after {:?}",
                    self.local_port, READY_TIMEOUT
                )));
            }
            debug!("Waiting for tunnel on port {}", self.local_port);
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub async fn close(mut self) -> Result<()> {
        self.child.kill().await?;
        info!("SSH tunnel on port {} closed", self.local_port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::forward_spec;

    #[test]
    fn forward_spec_format() {
        assert_eq!(forward_spec(3307, "db.internal", 3306), "3307:db.internal:3306");
    }
}
