//! Engine reached over TCP through a newline-delimited JSON bridge.
//!
//! Every request is one line `{"id": n, "method": "...", "params": {...}}`;
//! the bridge answers with one line carrying the same `id` and either a
//! `result` or an `error { code, message }`.
//!
//! The connection is opened lazily on the first call. A call holds it for the
//! whole request/reply exchange and hands it back only once the reply is
//! read, so an I/O or framing error, or a call abandoned halfway through,
//! drops it and the next call reconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{EngineBackend, EngineError, JobState};
use crate::entities::{AnalysisConfig, EntityRef, ModelEntity};
use crate::results::{ResultQuery, ResultRecord};

#[derive(Debug, Serialize)]
struct EngineRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct EngineFault {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct EngineReply {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<EngineFault>,
}

#[derive(Debug)]
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn send(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    async fn receive(&mut self) -> std::io::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "engine closed the connection",
            ));
        }
        Ok(line)
    }
}

/// Engine bridge reached at `address`
#[derive(Debug)]
pub struct TcpEngine {
    address: String,
    connect_timeout: Duration,
    connection: Mutex<Option<Connection>>,
    next_id: AtomicU64,
}

impl TcpEngine {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        TcpEngine {
            address: address.into(),
            connect_timeout,
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<Connection, EngineError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                EngineError::Unreachable(format!(
                    "connecting to {} timed out after {} ms",
                    self.address,
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| EngineError::Unreachable(format!("cannot connect to {}: {e}", self.address)))?;
        info!(address = %self.address, "connected to analysis engine");
        let (read, write) = stream.into_split();
        Ok(Connection {
            reader: BufReader::new(read),
            writer: write,
        })
    }

    /// Send one request and wait for its reply
    async fn call(&self, method: &str, params: Value) -> Result<Value, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&EngineRequest { id, method, params })
            .map_err(|e| EngineError::Protocol(format!("cannot encode {method} request: {e}")))?;

        let mut slot = self.connection.lock().await;
        let mut connection = match slot.take() {
            Some(connection) => connection,
            None => self.connect().await?,
        };

        debug!(id, method, "engine request");
        let reply = match exchange(&mut connection, &line, id).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(address = %self.address, error = %e, "dropping engine connection");
                return Err(e);
            }
        };
        *slot = Some(connection);
        drop(slot);

        match (reply.result, reply.error) {
            (_, Some(fault)) => Err(fault_to_error(fault, method)),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, EngineError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| EngineError::Protocol(format!("malformed {method} reply: {e}")))
    }
}

/// Write the request and read lines until the reply with our `id` arrives.
///
/// Replies with a lower id are stale and skipped.
async fn exchange(connection: &mut Connection, line: &str, id: u64) -> Result<EngineReply, EngineError> {
    connection
        .send(line)
        .await
        .map_err(|e| EngineError::Unreachable(e.to_string()))?;
    loop {
        let raw = connection
            .receive()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;
        let reply: EngineReply = serde_json::from_str(raw.trim())
            .map_err(|e| EngineError::Protocol(format!("malformed engine reply: {e}")))?;
        if reply.id == id {
            return Ok(reply);
        }
        if reply.id > id {
            return Err(EngineError::Protocol(format!("expected reply {id}, got {}", reply.id)));
        }
    }
}

fn fault_to_error(fault: EngineFault, method: &str) -> EngineError {
    match fault.code.as_str() {
        "UNKNOWN_JOB" => EngineError::UnknownJob(fault.message),
        "NOT_FINISHED" => EngineError::NotFinished(fault.message),
        _ => EngineError::Rejected {
            code: fault.code,
            message: format!("{method}: {}", fault.message),
        },
    }
}

#[derive(Debug, Deserialize)]
struct JobAccepted {
    job: String,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    #[serde(default)]
    records: Vec<ResultRecord>,
}

#[async_trait]
impl EngineBackend for TcpEngine {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn reset_model(&self, model_name: &str) -> Result<(), EngineError> {
        self.call("reset_model", json!({ "name": model_name })).await.map(|_| ())
    }

    async fn upsert(&self, entity: &ModelEntity) -> Result<(), EngineError> {
        let entity = serde_json::to_value(entity).map_err(|e| EngineError::Protocol(e.to_string()))?;
        self.call("upsert", entity).await.map(|_| ())
    }

    async fn remove(&self, target: &EntityRef) -> Result<(), EngineError> {
        self.call("remove", json!({ "kind": target.kind, "id": target.id }))
            .await
            .map(|_| ())
    }

    async fn start_analysis(&self, config: &AnalysisConfig) -> Result<String, EngineError> {
        let accepted: JobAccepted = self.call_as("start_analysis", json!({ "config": config })).await?;
        Ok(accepted.job)
    }

    async fn job_status(&self, job: &str) -> Result<JobState, EngineError> {
        self.call_as("job_status", json!({ "job": job })).await
    }

    async fn job_results(&self, job: &str, query: &ResultQuery) -> Result<Vec<ResultRecord>, EngineError> {
        let results: JobResults = self
            .call_as("job_results", json!({ "job": job, "query": query }))
            .await?;
        Ok(results.records)
    }
}
