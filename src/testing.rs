//! Scripted fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{Connector, GenericModbusClient};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse, SlaveId};
use crate::transport::{ModbusTransport, TransportStats};

#[derive(Default)]
struct Script {
    /// Pre-configured responses (FIFO queue)
    responses: VecDeque<ModbusResult<ModbusResponse>>,
    /// Records all requests received
    requests: Vec<ModbusRequest>,
    /// Pre-configured connect outcomes; empty means success
    connect_results: VecDeque<ModbusResult<()>>,
    /// How long every connect attempt takes
    connect_delay: Duration,
    connects: usize,
    closes: usize,
    /// Bumped to invalidate every open transport
    epoch: u64,
}

/// A fake device shared between a connector and the transports it creates.
#[derive(Clone, Default)]
pub struct MockDevice {
    script: Arc<Mutex<Script>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response to the queue
    pub fn add_response(&self, response: ModbusResult<ModbusResponse>) {
        self.script.lock().unwrap().responses.push_back(response);
    }

    /// Queue a successful register block for `function`
    pub fn add_registers(&self, function: ModbusFunction, values: &[u16]) {
        self.add_response(Ok(register_response(1, function, values)));
    }

    /// Queue `count` connection-level failures
    pub fn add_connection_faults(&self, count: usize) {
        for _ in 0..count {
            self.add_response(Err(ModbusError::connection("Simulated reset")));
        }
    }

    /// Queue the outcome of the next connect attempt
    pub fn add_connect_result(&self, result: ModbusResult<()>) {
        self.script.lock().unwrap().connect_results.push_back(result);
    }

    /// Make every connect attempt take `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        self.script.lock().unwrap().connect_delay = delay;
    }

    /// Make every open transport report itself as disconnected
    pub fn drop_connections(&self) {
        self.script.lock().unwrap().epoch += 1;
    }

    /// Get recorded requests for verification
    pub fn get_requests(&self) -> Vec<ModbusRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn connects(&self) -> usize {
        self.script.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.script.lock().unwrap().closes
    }

    pub fn pending_responses(&self) -> usize {
        self.script.lock().unwrap().responses.len()
    }

    fn epoch(&self) -> u64 {
        self.script.lock().unwrap().epoch
    }
}

/// Mock transport replaying the device script
pub struct MockTransport {
    device: MockDevice,
    epoch: u64,
    connected: bool,
}

impl MockTransport {
    /// A transport with its own private device
    pub fn new() -> Self {
        Self::attach(MockDevice::new())
    }

    pub fn attach(device: MockDevice) -> Self {
        let epoch = device.epoch();
        Self {
            device,
            epoch,
            connected: true,
        }
    }

    pub fn add_response(&self, response: ModbusResult<ModbusResponse>) {
        self.device.add_response(response);
    }

    pub fn get_requests(&self) -> Vec<ModbusRequest> {
        self.device.get_requests()
    }
}

impl ModbusTransport for MockTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        if !self.is_connected() {
            return Err(ModbusError::connection("Mock transport is disconnected"));
        }

        let response = {
            let mut script = self.device.script.lock().unwrap();
            script.requests.push(request.clone());
            script
                .responses
                .pop_front()
                .unwrap_or_else(|| Err(ModbusError::connection("No response prepared in mock")))
        };

        if let Err(e) = &response {
            if e.is_connection_fault() {
                self.connected = false;
            }
        }
        response
    }

    fn is_connected(&self) -> bool {
        self.connected && self.epoch == self.device.epoch()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.connected = false;
        self.device.script.lock().unwrap().closes += 1;
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Connector handing out [`MockTransport`]s bound to one device
#[derive(Clone, Default)]
pub struct MockConnector {
    pub device: MockDevice,
}

impl MockConnector {
    pub fn new(device: MockDevice) -> Self {
        Self { device }
    }
}

impl Connector for MockConnector {
    type Client = GenericModbusClient<MockTransport>;

    async fn connect(&self) -> ModbusResult<Self::Client> {
        let (outcome, delay) = {
            let mut script = self.device.script.lock().unwrap();
            script.connects += 1;
            let outcome = script.connect_results.pop_front().unwrap_or(Ok(()));
            (outcome, script.connect_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome?;
        Ok(GenericModbusClient::new(MockTransport::attach(self.device.clone())))
    }

    fn target(&self) -> String {
        "mock:502".to_string()
    }
}

/// Create a FC03/FC04 (read registers) response with byte_count prefix
pub fn register_response(slave_id: SlaveId, function: ModbusFunction, values: &[u16]) -> ModbusResponse {
    let byte_count = (values.len() * 2) as u8;
    let mut data = Vec::with_capacity(1 + values.len() * 2);
    data.push(byte_count);
    for &val in values {
        data.extend_from_slice(&val.to_be_bytes());
    }
    ModbusResponse::new_success(slave_id, function, data)
}
