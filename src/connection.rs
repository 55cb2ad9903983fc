//! # Connection Management
//!
//! [`ConnectionManager`] owns the one client talking to the device. It
//! reconnects transparently when the client reports itself dead and
//! enforces a ceiling on consecutive connection-level failures.
//!
//! Failures are split in two:
//!
//! - **Connection faults** (socket errors, broken framing) increment the
//!   consecutive-failure counter. Reaching the ceiling is fatal.
//! - **Declines** (exception responses, timeouts, mismatched replies) come
//!   from a reachable device and leave the counter untouched.
//!
//! Any successful read resets the counter.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::client::{Connector, ModbusClient};
use crate::constants::MAX_CONSECUTIVE_FAILURES;
use crate::error::{ModbusError, ModbusResult, PollerError, PollerResult};
use crate::protocol::{ModbusFunction, SlaveId};

/// Health of the connection as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Last read failed at connection level; holds the consecutive count
    Failing(u32),
}

/// Result of a single read attempt that did not hit the ceiling.
#[derive(Debug)]
pub enum ReadOutcome {
    /// The device returned a register block
    Block(Vec<u16>),
    /// The device refused or did not answer; the connection is still usable
    Declined(ModbusError),
    /// The connection broke; the read may be retried
    ConnectionFault(ModbusError),
}

/// Owns the client and applies the reconnect and ceiling policy.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    client: Option<C::Client>,
    state: ConnectionState,
    consecutive_failures: u32,
    max_failures: u32,
    unit_id: SlaveId,
    reconnect_delay: Duration,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, unit_id: SlaveId) -> Self {
        Self {
            connector,
            client: None,
            state: ConnectionState::Disconnected,
            consecutive_failures: 0,
            max_failures: MAX_CONSECUTIVE_FAILURES,
            unit_id,
            reconnect_delay: Duration::ZERO,
        }
    }

    /// Set the consecutive-failure ceiling (at least 1)
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures.max(1);
        self
    }

    /// Pause after each connection fault before the next attempt
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Establish the first connection.
    ///
    /// There is no retry here: a device that cannot be reached at startup
    /// is a fatal error.
    pub async fn connect(&mut self) -> PollerResult<()> {
        info!("Connecting to {} (unit {})", self.target(), self.unit_id);

        match self.connector.connect().await {
            Ok(client) => {
                self.client = Some(client);
                self.state = ConnectionState::Connected;
                info!("Connected to {}", self.target());
                Ok(())
            }
            Err(e) => {
                error!("Cannot connect to {}: {}", self.target(), e);
                Err(PollerError::InitialConnect {
                    target: self.target(),
                    source: e,
                })
            }
        }
    }

    /// Whether a client exists and reports its connection as usable
    pub fn is_alive(&self) -> bool {
        self.client.as_ref().is_some_and(|client| client.is_connected())
    }

    /// Reconnect if the connection is not alive.
    ///
    /// Returns the fault of a failed reconnect so the caller can retry.
    /// A failed reconnect counts toward the ceiling like any other fault.
    pub async fn ensure_connected(&mut self) -> PollerResult<Option<ModbusError>> {
        if self.is_alive() {
            return Ok(None);
        }
        match self.reconnect().await {
            Ok(()) => Ok(None),
            Err(e) => self.record_fault(e).await.map(Some),
        }
    }

    /// Read `length` registers at `address`.
    ///
    /// Reconnects first if the connection is not alive. Only returns an
    /// error once the consecutive-failure ceiling is reached.
    pub async fn read(
        &mut self,
        function: ModbusFunction,
        address: u16,
        length: u16,
    ) -> PollerResult<ReadOutcome> {
        match self.try_read(function, address, length).await {
            Ok(words) => {
                if self.consecutive_failures > 0 {
                    info!(
                        "Connection to {} recovered after {} failures",
                        self.target(),
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                self.state = ConnectionState::Connected;
                Ok(ReadOutcome::Block(words))
            }
            Err(e) if e.is_connection_fault() => {
                self.record_fault(e).await.map(ReadOutcome::ConnectionFault)
            }
            Err(e) => Ok(ReadOutcome::Declined(e)),
        }
    }

    async fn try_read(
        &mut self,
        function: ModbusFunction,
        address: u16,
        length: u16,
    ) -> ModbusResult<Vec<u16>> {
        if !self.is_alive() {
            self.reconnect().await?;
        }

        let client = self
            .client
            .as_mut()
            .ok_or_else(|| ModbusError::connection("no client"))?;
        client
            .read_registers(function, self.unit_id, address, length)
            .await
    }

    async fn reconnect(&mut self) -> ModbusResult<()> {
        if let Some(mut stale) = self.client.take() {
            if let Err(e) = stale.close().await {
                debug!("Closing stale connection: {}", e);
            }
        }

        info!("Reconnecting to {}", self.target());
        match self.connector.connect().await {
            Ok(client) => {
                self.client = Some(client);
                Ok(())
            }
            // Whatever stopped the connect, the connection is what failed.
            Err(e) if e.is_connection_fault() => Err(e),
            Err(e) => Err(ModbusError::connection(e.to_string())),
        }
    }

    async fn record_fault(&mut self, e: ModbusError) -> PollerResult<ModbusError> {
        self.consecutive_failures += 1;
        self.state = ConnectionState::Failing(self.consecutive_failures);

        if self.consecutive_failures >= self.max_failures {
            error!(
                "Giving up on {} after {} consecutive failures: {}",
                self.target(),
                self.consecutive_failures,
                e
            );
            return Err(PollerError::FailureCeiling {
                target: self.target(),
                failures: self.consecutive_failures,
                source: e,
            });
        }

        warn!(
            "Connection fault on {} ({}/{}): {}",
            self.target(),
            self.consecutive_failures,
            self.max_failures,
            e
        );
        if !self.reconnect_delay.is_zero() {
            tokio::time::sleep(self.reconnect_delay).await;
        }
        Ok(e)
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.close().await {
                debug!("Error while closing {}: {}", self.target(), e);
            }
            info!("Disconnected from {}", self.target());
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn unit_id(&self) -> SlaveId {
        self.unit_id
    }

    pub fn target(&self) -> String {
        self.connector.target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EXCEPTION_ILLEGAL_DATA_ADDRESS;
    use crate::testing::{MockConnector, MockDevice};

    const FC04: ModbusFunction = ModbusFunction::ReadInputRegisters;

    async fn connected(device: &MockDevice) -> ConnectionManager<MockConnector> {
        let mut manager = ConnectionManager::new(MockConnector::new(device.clone()), 1);
        manager.connect().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_fatal() {
        let device = MockDevice::new();
        device.add_connect_result(Err(ModbusError::connection("refused")));

        let mut manager = ConnectionManager::new(MockConnector::new(device.clone()), 1);
        let err = manager.connect().await.unwrap_err();

        assert!(matches!(err, PollerError::InitialConnect { .. }));
        assert_eq!(device.connects(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_successful_read() {
        let device = MockDevice::new();
        device.add_registers(FC04, &[7, 8]);
        let mut manager = connected(&device).await;

        let outcome = manager.read(FC04, 30, 2).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Block(ref w) if w == &[7, 8]));
        assert_eq!(manager.state(), ConnectionState::Connected);

        let requests = device.get_requests();
        assert_eq!(requests[0].address, 30);
        assert_eq!(requests[0].quantity, 2);
        assert_eq!(requests[0].slave_id, 1);
    }

    #[tokio::test]
    async fn test_ceiling_reached_after_five_faults() {
        let device = MockDevice::new();
        device.add_connection_faults(5);
        device.add_registers(FC04, &[1]);
        let mut manager = connected(&device).await;

        for n in 1..5 {
            let outcome = manager.read(FC04, 0, 1).await.unwrap();
            assert!(matches!(outcome, ReadOutcome::ConnectionFault(_)));
            assert_eq!(manager.state(), ConnectionState::Failing(n));
        }

        let err = manager.read(FC04, 0, 1).await.unwrap_err();
        assert!(matches!(err, PollerError::FailureCeiling { failures: 5, .. }));
        // The sixth response was never requested.
        assert_eq!(device.get_requests().len(), 5);
        assert_eq!(device.pending_responses(), 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let device = MockDevice::new();
        device.add_connection_faults(4);
        device.add_registers(FC04, &[1]);
        device.add_connection_faults(4);
        device.add_registers(FC04, &[2]);
        let mut manager = connected(&device).await;

        let mut blocks = Vec::new();
        for _ in 0..10 {
            if let ReadOutcome::Block(words) = manager.read(FC04, 0, 1).await.unwrap() {
                blocks.push(words);
            }
        }

        assert_eq!(blocks, vec![vec![1], vec![2]]);
        assert_eq!(manager.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_decline_does_not_count_as_fault() {
        let device = MockDevice::new();
        for _ in 0..6 {
            device.add_response(Err(ModbusError::exception(
                FC04.to_u8(),
                EXCEPTION_ILLEGAL_DATA_ADDRESS,
            )));
        }
        device.add_response(Err(ModbusError::timeout("read", 1000)));
        let mut manager = connected(&device).await;

        for _ in 0..7 {
            let outcome = manager.read(FC04, 9999, 1).await.unwrap();
            assert!(matches!(outcome, ReadOutcome::Declined(_)));
        }
        assert_eq!(manager.consecutive_failures(), 0);
        assert_eq!(device.connects(), 1);
    }

    #[tokio::test]
    async fn test_reconnects_when_connection_is_gone() {
        let device = MockDevice::new();
        device.add_registers(FC04, &[42]);
        let mut manager = connected(&device).await;

        device.drop_connections();
        assert!(!manager.is_alive());

        let outcome = manager.read(FC04, 0, 1).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Block(_)));
        assert_eq!(device.connects(), 2);
        assert_eq!(device.closes(), 1);
    }

    #[tokio::test]
    async fn test_failed_reconnect_counts_toward_ceiling() {
        let device = MockDevice::new();
        let mut manager = connected(&device).await.with_max_failures(2);

        device.drop_connections();
        device.add_connect_result(Err(ModbusError::timeout("connect", 100)));
        device.add_connect_result(Err(ModbusError::connection("refused")));

        let first = manager.read(FC04, 0, 1).await.unwrap();
        assert!(matches!(first, ReadOutcome::ConnectionFault(ModbusError::Connection { .. })));

        let err = manager.read(FC04, 0, 1).await.unwrap_err();
        assert!(matches!(err, PollerError::FailureCeiling { failures: 2, .. }));
        assert!(device.get_requests().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_connected_reconnects_without_reading() {
        let device = MockDevice::new();
        let mut manager = connected(&device).await;

        assert!(manager.ensure_connected().await.unwrap().is_none());
        assert_eq!(device.connects(), 1);

        device.drop_connections();
        assert!(manager.ensure_connected().await.unwrap().is_none());
        assert!(manager.is_alive());
        assert_eq!(device.connects(), 2);
        assert!(device.get_requests().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_connected_counts_failed_reconnects() {
        let device = MockDevice::new();
        let mut manager = connected(&device).await.with_max_failures(2);

        device.drop_connections();
        device.add_connect_result(Err(ModbusError::connection("refused")));
        device.add_connect_result(Err(ModbusError::connection("refused")));

        let fault = manager.ensure_connected().await.unwrap();
        assert!(matches!(fault, Some(ModbusError::Connection { .. })));
        assert_eq!(manager.state(), ConnectionState::Failing(1));

        let err = manager.ensure_connected().await.unwrap_err();
        assert!(matches!(err, PollerError::FailureCeiling { failures: 2, .. }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let device = MockDevice::new();
        let mut manager = connected(&device).await;

        manager.close().await;
        manager.close().await;

        assert_eq!(device.closes(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_alive());
    }
}
