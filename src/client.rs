//! Register-read clients
//!
//! The poller only ever reads registers, so the client surface is small:
//!
//! | Function Code | Primary Name | Semantic Alias |
//! |---------------|--------------|----------------|
//! | 0x03 | `read_03()` | `read_holding_registers()` |
//! | 0x04 | `read_04()` | `read_input_registers()` |
//!
//! A client is created by a [`Connector`]. The connector is what the
//! connection manager keeps around so it can build a fresh client after
//! the previous one lost its socket.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modbus_poller::{ModbusTcpClient, ModbusClient, ModbusResult};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let mut client = ModbusTcpClient::from_address(
//!         "127.0.0.1:502",
//!         Duration::from_secs(5)
//!     ).await?;
//!
//!     // Read 10 input registers from slave 1, starting at address 0
//!     let registers = client.read_04(1, 0, 10).await?;
//!     println!("Registers: {:?}", registers);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
use std::net::SocketAddr;
use std::time::Duration;

use tracing::debug;

use crate::constants::MAX_READ_REGISTERS;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse, SlaveId};
use crate::transport::{ModbusTransport, TcpTransport, TransportStats};

/// Trait defining the register-read interface of a Modbus client.
///
/// # Implemented By
///
/// - [`ModbusTcpClient`] - Modbus TCP client
/// - [`GenericModbusClient`] - Generic client for custom transports
pub trait ModbusClient: Send + Sync {
    /// Read holding registers (function code 0x03).
    ///
    /// # Arguments
    ///
    /// * `slave_id` - The Modbus slave/unit ID (1-247)
    /// * `address` - Starting register address (0-65535)
    /// * `quantity` - Number of registers to read (1-125)
    fn read_03(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send;

    /// Read input registers (function code 0x04).
    ///
    /// # Arguments
    ///
    /// * `slave_id` - The Modbus slave/unit ID (1-247)
    /// * `address` - Starting register address (0-65535)
    /// * `quantity` - Number of registers to read (1-125)
    fn read_04(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send;

    /// Check if the client is connected.
    fn is_connected(&self) -> bool;

    /// Close the client connection.
    fn close(&mut self) -> impl std::future::Future<Output = ModbusResult<()>> + Send;

    /// Get transport statistics.
    fn get_stats(&self) -> TransportStats;

    /// Dispatch to `read_03` or `read_04` by function.
    #[inline]
    fn read_registers(
        &mut self,
        function: ModbusFunction,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send
    where
        Self: Sized,
    {
        async move {
            match function {
                ModbusFunction::ReadHoldingRegisters => {
                    self.read_03(slave_id, address, quantity).await
                }
                ModbusFunction::ReadInputRegisters => {
                    self.read_04(slave_id, address, quantity).await
                }
            }
        }
    }

    /// Alias for `read_03` - Read holding registers
    #[inline]
    fn read_holding_registers(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send {
        self.read_03(slave_id, address, quantity)
    }

    /// Alias for `read_04` - Read input registers
    #[inline]
    fn read_input_registers(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> impl std::future::Future<Output = ModbusResult<Vec<u16>>> + Send {
        self.read_04(slave_id, address, quantity)
    }
}

/// Generic Modbus client working over any transport
pub struct GenericModbusClient<T: ModbusTransport> {
    transport: T,
}

impl<T: ModbusTransport> GenericModbusClient<T> {
    /// Create a new generic client
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Execute a raw request
    pub async fn execute_request(
        &mut self,
        request: ModbusRequest,
    ) -> ModbusResult<ModbusResponse> {
        debug!(
            "Request: slave={} fc={:#04x} addr={} qty={}",
            request.slave_id,
            request.function.to_u8(),
            request.address,
            request.quantity
        );

        let response = self.transport.request(&request).await?;

        debug!(
            "Response: slave={} fc={:#04x} {} bytes",
            response.slave_id,
            response.function.to_u8(),
            response.data().len()
        );

        Ok(response)
    }

    async fn read_block(
        &mut self,
        function: ModbusFunction,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        if quantity == 0 || quantity as usize > MAX_READ_REGISTERS {
            return Err(ModbusError::invalid_data("Invalid quantity"));
        }

        let request = ModbusRequest::new(slave_id, function, address, quantity);
        let response = self.execute_request(request).await?;
        // parse_registers() skips the byte_count prefix
        response.parse_registers()
    }
}

impl<T: ModbusTransport + Send + Sync> ModbusClient for GenericModbusClient<T> {
    async fn read_03(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        self.read_block(ModbusFunction::ReadHoldingRegisters, slave_id, address, quantity)
            .await
    }

    async fn read_04(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        self.read_block(ModbusFunction::ReadInputRegisters, slave_id, address, quantity)
            .await
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.transport.close().await
    }

    fn get_stats(&self) -> TransportStats {
        self.transport.get_stats()
    }
}

/// Modbus TCP client implementation using the generic client
pub struct ModbusTcpClient {
    inner: GenericModbusClient<TcpTransport>,
}

impl ModbusTcpClient {
    /// Create a new TCP client
    pub async fn new(addr: SocketAddr, timeout: Duration) -> ModbusResult<Self> {
        let transport = TcpTransport::new(addr, timeout).await?;
        Ok(Self {
            inner: GenericModbusClient::new(transport),
        })
    }

    /// Create a new TCP client from address string
    pub async fn from_address(addr: &str, timeout: Duration) -> ModbusResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| ModbusError::configuration(format!("Invalid address: {}", e)))?;
        Self::new(addr, timeout).await
    }

    /// Get the server address
    pub fn server_address(&self) -> SocketAddr {
        self.inner.transport().address
    }

    /// Enable or disable packet logging on existing client
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.inner.transport_mut().set_packet_logging(enabled);
    }
}

impl ModbusClient for ModbusTcpClient {
    async fn read_03(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        self.inner.read_03(slave_id, address, quantity).await
    }

    async fn read_04(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        self.inner.read_04(slave_id, address, quantity).await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.inner.close().await
    }

    fn get_stats(&self) -> TransportStats {
        self.inner.get_stats()
    }
}

/// Factory for fresh client connections.
pub trait Connector: Send + Sync {
    /// Client produced by a successful connect
    type Client: ModbusClient;

    /// Open a new connection.
    fn connect(&self) -> impl std::future::Future<Output = ModbusResult<Self::Client>> + Send;

    /// Human-readable description of the remote end, used in diagnostics.
    fn target(&self) -> String;
}

/// Connects [`ModbusTcpClient`]s to `host:port`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    timeout: Duration,
    packet_logging: bool,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            packet_logging: false,
        }
    }

    /// Enable frame dumps on every client this connector creates
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }
}

impl Connector for TcpConnector {
    type Client = ModbusTcpClient;

    async fn connect(&self) -> ModbusResult<ModbusTcpClient> {
        let addr = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| ModbusError::connection(format!("Cannot resolve {}: {}", self.target(), e)))?
            .next()
            .ok_or_else(|| ModbusError::connection(format!("No address for {}", self.target())))?;

        let mut client = ModbusTcpClient::new(addr, self.timeout).await?;
        client.set_packet_logging(self.packet_logging);
        Ok(client)
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{register_response, MockTransport};

    #[tokio::test]
    async fn test_tcp_client_invalid_address() {
        let result = ModbusTcpClient::from_address("not-an-address", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ModbusError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_read_03_and_04_use_distinct_functions() {
        let mock = MockTransport::new();
        mock.add_response(Ok(register_response(1, ModbusFunction::ReadHoldingRegisters, &[10])));
        mock.add_response(Ok(register_response(1, ModbusFunction::ReadInputRegisters, &[20])));

        let mut client = GenericModbusClient::new(mock);

        assert_eq!(client.read_holding_registers(1, 100, 1).await.unwrap(), vec![10]);
        assert_eq!(client.read_input_registers(1, 200, 1).await.unwrap(), vec![20]);

        let requests = client.transport().get_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].function, ModbusFunction::ReadHoldingRegisters);
        assert_eq!(requests[0].address, 100);
        assert_eq!(requests[1].function, ModbusFunction::ReadInputRegisters);
        assert_eq!(requests[1].address, 200);
    }

    #[tokio::test]
    async fn test_read_registers_dispatch() {
        let mock = MockTransport::new();
        mock.add_response(Ok(register_response(
            1,
            ModbusFunction::ReadInputRegisters,
            &[1, 2, 3],
        )));

        let mut client = GenericModbusClient::new(mock);
        let values = client
            .read_registers(ModbusFunction::ReadInputRegisters, 1, 0, 3)
            .await
            .unwrap();

        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(
            client.transport().get_requests()[0].function,
            ModbusFunction::ReadInputRegisters
        );
    }

    #[tokio::test]
    async fn test_invalid_quantity_sends_nothing() {
        let mock = MockTransport::new();
        let mut client = GenericModbusClient::new(mock);

        assert!(client.read_03(1, 0, 0).await.is_err());
        assert!(client.read_04(1, 0, 126).await.is_err());
        assert!(client.transport().get_requests().is_empty());
    }

    #[tokio::test]
    async fn test_error_propagation() {
        let mock = MockTransport::new();
        mock.add_response(Err(ModbusError::timeout("Simulated timeout", 1000)));

        let mut client = GenericModbusClient::new(mock);
        let err = client.read_03(1, 0, 2).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(client.transport().get_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_close_disconnects() {
        let mock = MockTransport::new();
        let mut client = GenericModbusClient::new(mock);
        assert!(client.is_connected());

        client.close().await.unwrap();
        assert!(!client.is_connected());
    }

    #[test]
    fn test_tcp_connector_target() {
        let connector = TcpConnector::new("plc.local", 1502, Duration::from_secs(1));
        assert_eq!(connector.target(), "plc.local:1502");
    }
}
