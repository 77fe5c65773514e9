//! Device access through an external gateway process
//!
//! The gateway is spawned with piped stdio and spoken to with framed JSON
//! requests (see [`super::codec`]). Every request waits for its matching
//! response, bounded by the configured request timeout.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::codec;
use super::protocol::{
    ConnectArguments, ConnectResponse, ReadArguments, ReadResponse, RequestMessage,
    WriteArguments,
};
use super::Device;
use crate::common::config::DeviceConfig;
use crate::common::{Error, Result};
use crate::points::PointValue;

/// Controller reached through a gateway subprocess
pub struct GatewayDevice {
    /// Gateway subprocess
    process: Child,
    reader: BufReader<ChildStdout>,
    writer: BufWriter<ChildStdin>,
    /// Sequence number for the next request
    seq: i64,
    request_timeout: Duration,
}

impl GatewayDevice {
    /// Spawn the gateway without connecting to a controller yet
    pub async fn spawn(gateway: &Path, args: &[String], request_timeout: Duration) -> Result<Self> {
        let mut cmd = Command::new(gateway);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(|e| {
            Error::GatewayStartFailed(format!("Failed to start {}: {}", gateway.display(), e))
        })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::GatewayStartFailed("Failed to get gateway stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::GatewayStartFailed("Failed to get gateway stdout".to_string()))?;

        Ok(Self {
            process,
            reader: BufReader::new(stdout),
            writer: BufWriter::new(stdin),
            seq: 1,
            request_timeout,
        })
    }

    /// Spawn the gateway and connect it to the configured controller
    pub async fn connect(gateway: &Path, config: &DeviceConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let mut device = Self::spawn(gateway, &config.args, timeout).await?;

        let args = ConnectArguments {
            network_address: config.network_address.clone(),
            device_address: config.device_address.clone(),
            device_id: config.device_id,
        };
        let info: ConnectResponse = device
            .request("connect", Some(serde_json::to_value(&args)?))
            .await?;

        tracing::info!(
            gateway = %gateway.display(),
            device = info.device_name.as_deref().unwrap_or("unknown"),
            points = info.point_count.unwrap_or(0),
            "Connected to controller"
        );
        Ok(device)
    }

    fn next_seq(&mut self) -> i64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    /// Send a request and wait for its response body
    pub async fn request<T: serde::de::DeserializeOwned>(
        &mut self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<T> {
        let secs = self.request_timeout.as_secs();
        match tokio::time::timeout(self.request_timeout, self.exchange(command, arguments)).await {
            Ok(result) => result,
            Err(_) => Err(Error::GatewayTimeout {
                command: command.to_string(),
                secs,
            }),
        }
    }

    async fn exchange<T: serde::de::DeserializeOwned>(
        &mut self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<T> {
        let seq = self.next_seq();
        let request = RequestMessage {
            seq,
            command: command.to_string(),
            arguments,
        };

        codec::write_request(&mut self.writer, &request).await?;

        // Responses to abandoned (timed out) requests may still arrive first
        loop {
            let response = codec::read_response(&mut self.reader).await?;

            if response.request_seq != seq {
                tracing::debug!(
                    expected = seq,
                    got = response.request_seq,
                    "Discarding stale gateway response"
                );
                continue;
            }

            if !response.success {
                return Err(Error::gateway_request_failed(
                    command,
                    &response.message.unwrap_or_else(|| "Unknown error".to_string()),
                ));
            }

            let body = response.body.unwrap_or(Value::Null);
            return serde_json::from_value(body).map_err(|e| {
                Error::GatewayProtocol(format!("Failed to parse {} response: {}", command, e))
            });
        }
    }
}

#[async_trait]
impl Device for GatewayDevice {
    async fn read(&mut self, point: &str) -> Result<PointValue> {
        let args = ReadArguments {
            point: point.to_string(),
        };
        let response: ReadResponse = self
            .request("read", Some(serde_json::to_value(&args)?))
            .await
            .map_err(|e| Error::device_read(point, e))?;
        Ok(response.value)
    }

    async fn write(&mut self, point: &str, value: &PointValue) -> Result<()> {
        let args = WriteArguments {
            point: point.to_string(),
            value: value.clone(),
        };
        self.request::<Value>("write", Some(serde_json::to_value(&args)?))
            .await
            .map_err(|e| Error::device_write(point, e))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.request::<Value>("disconnect", None).await {
            tracing::debug!(error = %e, "Gateway disconnect failed");
        }
        let _ = self.process.kill().await;
        Ok(())
    }
}
