//! Per-run tool broker.
//!
//! Owns every tool connection a pipeline run opens, creates them lazily on
//! first use, and guarantees teardown on every exit path. Connections are
//! never shared across runs.

use std::collections::HashMap;
use std::time::Duration;

use crate::capability::CapabilityRegistry;
use crate::error::{DealdeskError, DealdeskResult};
use crate::tools::connection::ToolConnection;
use crate::tools::protocol::{ToolCall, ToolResult};

pub struct ToolBroker {
    registry: CapabilityRegistry,
    connect_timeout: Duration,
    shutdown_grace: Duration,
    connections: HashMap<String, ToolConnection>,
}

impl ToolBroker {
    pub fn new(
        registry: CapabilityRegistry,
        connect_timeout: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            registry,
            connect_timeout,
            shutdown_grace,
            connections: HashMap::new(),
        }
    }

    /// Invoke a tool through the named capability set, opening its
    /// connection on first use.
    ///
    /// Start failures are fatal only for required capability sets; for
    /// optional sets the call degrades to an `Error` result the worker can
    /// route around. Call-level failures (timeout, malformed response) are
    /// always degraded results, per the connection contract.
    pub async fn invoke(&mut self, capability: &str, call: ToolCall) -> DealdeskResult<ToolResult> {
        let required = self.registry.resolve(capability)?.required;

        if !self.connections.contains_key(capability) {
            match self.open_connection(capability).await {
                Ok(connection) => {
                    self.connections.insert(capability.to_string(), connection);
                }
                Err(err) if !required => {
                    log::warn!(
                        "[ToolBroker] optional capability '{}' unavailable: {}",
                        capability,
                        err
                    );
                    return Ok(ToolResult::error(
                        call,
                        format!("capability '{}' unavailable: {}", capability, err),
                    ));
                }
                Err(err) => return Err(err),
            }
        }

        let connection = self
            .connections
            .get_mut(capability)
            .ok_or_else(|| DealdeskError::UnknownCapability(capability.to_string()))?;
        match connection.invoke(call.clone()).await {
            Ok(result) => Ok(result),
            // A respawn failure after recycling is a start failure again.
            Err(err) if !required => {
                log::warn!(
                    "[ToolBroker] optional capability '{}' lost: {}",
                    capability,
                    err
                );
                Ok(ToolResult::error(
                    call,
                    format!("capability '{}' unavailable: {}", capability, err),
                ))
            }
            Err(err) => Err(err),
        }
    }

    async fn open_connection(&self, capability: &str) -> DealdeskResult<ToolConnection> {
        let set = self.registry.resolve(capability)?;
        ToolConnection::open(set, self.connect_timeout, self.shutdown_grace).await
    }

    /// Total invokes across every connection this run opened.
    pub fn total_invocations(&self) -> u64 {
        self.connections.values().map(|c| c.invocations()).sum()
    }

    /// Number of connections currently held (open or recycled).
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Close every connection. Safe to call repeatedly; close is
    /// idempotent per connection.
    pub async fn close_all(&mut self) {
        for (name, connection) in self.connections.iter_mut() {
            log::debug!("[ToolBroker] closing connection '{}'", name);
            connection.close().await;
        }
    }
}
