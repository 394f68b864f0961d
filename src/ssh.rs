// Copyright 2025 The fleetrun Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SSH transport backed by `async-ssh2-tokio`.

use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::SessionError;
use crate::node::NodeDescriptor;
use crate::transport::{ExecOutput, RemoteSession, Transport};

/// Transport-level settings shared by every node.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Budget for the TCP connect and SSH handshake together.
    pub connect_timeout: Duration,
    pub strict_host_key_checking: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            strict_host_key_checking: false,
        }
    }
}

pub struct SshTransport {
    config: SshConfig,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn auth_method(node: &NodeDescriptor) -> Result<AuthMethod, SessionError> {
        if let Some(key_file) = &node.key_file {
            return Ok(AuthMethod::with_key_file(key_file, None));
        }
        if let Some(password) = &node.password {
            return Ok(AuthMethod::with_password(password));
        }
        Err(SessionError::Auth(format!(
            "no key file or password configured for {}",
            node.name
        )))
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(
        &self,
        node: &NodeDescriptor,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        let auth = Self::auth_method(node)?;
        let check = if self.config.strict_host_key_checking {
            ServerCheckMethod::DefaultKnownHostsFile
        } else {
            ServerCheckMethod::NoCheck
        };

        debug!(node = %node, "opening ssh session");
        let connect = Client::connect((node.host.as_str(), node.port), &node.user, auth, check);
        let client = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| SessionError::Timeout(self.config.connect_timeout))?
            .map_err(classify_connect_error)?;

        Ok(Box::new(SshSession { client }))
    }
}

struct SshSession {
    client: Client,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError> {
        let result = self
            .client
            .execute(command)
            .await
            .map_err(|e| SessionError::ConnectionLost(e.to_string()))?;
        Ok(ExecOutput {
            exit_code: result.exit_status,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }

    async fn is_alive(&mut self) -> bool {
        matches!(self.client.execute("true").await, Ok(r) if r.exit_status == 0)
    }
}

/// Split handshake failures into terminal auth rejections and transient
/// network errors. The underlying error type does not expose a stable
/// variant for authentication, so this matches on the message text.
fn classify_connect_error(err: async_ssh2_tokio::Error) -> SessionError {
    let text = err.to_string();
    let lowered = text.to_ascii_lowercase();
    if lowered.contains("auth") || lowered.contains("password") || lowered.contains("key") {
        SessionError::Auth(text)
    } else {
        SessionError::Connect(text)
    }
}
