//! Network transport layer
//!
//! A transport moves one [`ModbusRequest`] to the device and brings back
//! the matching [`ModbusResponse`]. It owns the socket; nothing above it
//! touches the stream directly.
//!
//! Only Modbus TCP is provided. Frames are `MBAP header + unit id + PDU`:
//!
//! ```text
//! | transaction id (2) | protocol id (2) | length (2) | unit id (1) | PDU (n) |
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN, MBAP_PROTOCOL_ID};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{request_pdu, ModbusPdu};
use crate::protocol::{ModbusRequest, ModbusResponse};

/// Counters kept by every transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Request/response exchange with a single device.
pub trait ModbusTransport: Send + Sync {
    /// Send a request and wait for its response.
    fn request(
        &mut self,
        request: &ModbusRequest,
    ) -> impl std::future::Future<Output = ModbusResult<ModbusResponse>> + Send;

    /// Whether the transport believes its connection is usable.
    fn is_connected(&self) -> bool;

    /// Close the connection.
    fn close(&mut self) -> impl std::future::Future<Output = ModbusResult<()>> + Send;

    /// Snapshot of the transport counters.
    fn get_stats(&self) -> TransportStats;
}

/// How far an exchange got before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Writing,
    AwaitingResponse,
    ReadingFrame,
}

/// Modbus TCP transport.
#[derive(Debug)]
pub struct TcpTransport {
    pub address: SocketAddr,
    stream: Option<TcpStream>,
    timeout: Duration,
    transaction_id: u16,
    stats: TransportStats,
    packet_logging: bool,
}

impl TcpTransport {
    /// Connect to `address`, giving up after `timeout`.
    pub async fn new(address: SocketAddr, timeout: Duration) -> ModbusResult<Self> {
        let timeout_ms = timeout.as_millis() as u64;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| ModbusError::connection(format!("Connect to {} timed out after {}ms", address, timeout_ms)))?
            .map_err(|e| ModbusError::connection(format!("Failed to connect to {}: {}", address, e)))?;

        stream.set_nodelay(true)?;
        debug!("TCP transport connected to {}", address);

        Ok(Self {
            address,
            stream: Some(stream),
            timeout,
            transaction_id: 0,
            stats: TransportStats::default(),
            packet_logging: false,
        })
    }

    /// Log every frame sent and received at debug level
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    async fn exchange(
        stream: &mut TcpStream,
        stats: &mut TransportStats,
        frame: &[u8],
        transaction_id: u16,
        packet_logging: bool,
        progress: &mut Progress,
    ) -> ModbusResult<ModbusPdu> {
        if packet_logging {
            debug!("TX [{}]: {:02X?}", transaction_id, frame);
        }
        *progress = Progress::Writing;
        stream.write_all(frame).await?;
        stats.bytes_sent += frame.len() as u64;

        loop {
            // A single byte is either read or not, so waiting here can be
            // cancelled without losing frame alignment.
            *progress = Progress::AwaitingResponse;
            let mut header = [0u8; MBAP_HEADER_LEN];
            header[0] = stream.read_u8().await?;
            *progress = Progress::ReadingFrame;
            stream.read_exact(&mut header[1..]).await?;

            let mut cursor = &header[..];
            let received_id = cursor.get_u16();
            let protocol_id = cursor.get_u16();
            let length = cursor.get_u16() as usize;

            if protocol_id != MBAP_PROTOCOL_ID {
                return Err(ModbusError::frame(format!(
                    "Unexpected protocol id {}",
                    protocol_id
                )));
            }
            if !(2..=MAX_MBAP_LENGTH).contains(&length) {
                return Err(ModbusError::frame(format!("Invalid MBAP length {}", length)));
            }

            let mut body = vec![0u8; length];
            stream.read_exact(&mut body).await?;
            stats.bytes_received += (MBAP_HEADER_LEN + length) as u64;

            if packet_logging {
                debug!("RX [{}]: {:02X?} {:02X?}", received_id, header, body);
            }

            // A response that arrives after its request timed out is still in
            // the stream; skip it rather than treating the socket as broken.
            if received_id != transaction_id {
                debug!(
                    "Discarding stale response: transaction {} (expected {})",
                    received_id, transaction_id
                );
                continue;
            }

            return ModbusPdu::from_slice(&body[1..]);
        }
    }
}

impl ModbusTransport for TcpTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        let pdu = request_pdu(request)?;
        let transaction_id = self.next_transaction_id();

        let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
        frame.put_u16(transaction_id);
        frame.put_u16(MBAP_PROTOCOL_ID);
        frame.put_u16((pdu.len() + 1) as u16);
        frame.put_u8(request.slave_id);
        frame.put_slice(pdu.as_slice());

        let Some(stream) = self.stream.as_mut() else {
            return Err(ModbusError::connection(format!(
                "Not connected to {}",
                self.address
            )));
        };

        self.stats.requests_sent += 1;
        let mut progress = Progress::Writing;
        let exchange = Self::exchange(
            stream,
            &mut self.stats,
            &frame,
            transaction_id,
            self.packet_logging,
            &mut progress,
        );

        let result = tokio::time::timeout(self.timeout, exchange).await;
        match result {
            Ok(Ok(pdu)) => {
                self.stats.responses_received += 1;
                pdu.into_response(request)
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                if e.is_connection_fault() {
                    warn!("Connection to {} lost: {}", self.address, e);
                    self.stream = None;
                }
                Err(e)
            }
            Err(_) => {
                self.stats.timeouts += 1;
                // Part of a frame is in flight; the stream cannot be reused.
                if progress != Progress::AwaitingResponse {
                    warn!(
                        "Timed out mid-frame on {}, dropping connection",
                        self.address
                    );
                    self.stream = None;
                }
                Err(ModbusError::timeout(
                    format!("{} @ {}", request.function, request.address),
                    self.timeout.as_millis() as u64,
                ))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
            debug!("TCP transport to {} closed", self.address);
        }
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::PduBuilder;
    use crate::protocol::ModbusFunction;
    use tokio::net::TcpListener;

    /// Accept one connection and answer every request with `reply(request)`.
    async fn spawn_responder<F>(reply: F) -> SocketAddr
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            loop {
                let mut header = [0u8; 7];
                if socket.read_exact(&mut header).await.is_err() {
                    return;
                }
                let length = u16::from_be_bytes([header[4], header[5]]) as usize;
                let mut pdu = vec![0u8; length - 1];
                socket.read_exact(&mut pdu).await.unwrap();

                let Some(answer) = reply(&pdu) else {
                    continue;
                };
                let mut frame = Vec::new();
                frame.extend_from_slice(&header[0..4]);
                frame.extend_from_slice(&((answer.len() + 1) as u16).to_be_bytes());
                frame.push(header[6]);
                frame.extend_from_slice(&answer);
                socket.write_all(&frame).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_read_registers_over_tcp() {
        let addr = spawn_responder(|_| {
            Some(
                PduBuilder::build_read_response(ModbusFunction::ReadHoldingRegisters, &[0x1234, 0x5678])
                    .unwrap()
                    .as_slice()
                    .to_vec(),
            )
        })
        .await;

        let mut transport = TcpTransport::new(addr, Duration::from_secs(1)).await.unwrap();
        let request = ModbusRequest::new(1, ModbusFunction::ReadHoldingRegisters, 0, 2);
        let response = transport.request(&request).await.unwrap();

        assert_eq!(response.parse_registers().unwrap(), vec![0x1234, 0x5678]);
        let stats = transport.get_stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.responses_received, 1);
        assert!(stats.bytes_sent > 0);

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_exception_is_not_a_connection_fault() {
        let addr = spawn_responder(|_| {
            Some(
                PduBuilder::build_exception(ModbusFunction::ReadInputRegisters, 0x02)
                    .unwrap()
                    .as_slice()
                    .to_vec(),
            )
        })
        .await;

        let mut transport = TcpTransport::new(addr, Duration::from_secs(1)).await.unwrap();
        let request = ModbusRequest::new(1, ModbusFunction::ReadInputRegisters, 999, 1);
        let err = transport.request(&request).await.unwrap_err();

        assert!(matches!(err, ModbusError::Exception { .. }));
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_timeout_keeps_connection() {
        let addr = spawn_responder(|_| None).await;

        let mut transport = TcpTransport::new(addr, Duration::from_millis(50)).await.unwrap();
        let request = ModbusRequest::new(1, ModbusFunction::ReadInputRegisters, 0, 1);
        let err = transport.request(&request).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(transport.is_connected());
        assert_eq!(transport.get_stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_timeout_mid_frame_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            // Start a response header, then stall.
            socket.write_all(&request[0..3]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::new(addr, Duration::from_millis(100)).await.unwrap();
        let request = ModbusRequest::new(1, ModbusFunction::ReadInputRegisters, 0, 1);
        let err = transport.request(&request).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(!transport.is_connected());
        assert_eq!(transport.get_stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with nobody listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpTransport::new(addr, Duration::from_millis(500)).await;
        assert!(matches!(result, Err(ModbusError::Connection { .. })));
    }
}
