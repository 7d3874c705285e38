//! Shared test doubles for the gpuwatchd integration tests.
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use gpuwatch_core::{AllocationError, DeviceId, DeviceSnapshot, MemoryInfo, ProcessInfo, GIB};
use gpuwatch_protocol::{ChatId, CommandEvent};
use gpuwatchd::config::Whitelist;
use gpuwatchd::device::{SharedDevices, StaticDevices};
use gpuwatchd::reservation::ReservationBackend;
use gpuwatchd::transport::{DeliveryError, MessageFormat, Messenger};

// ============================================================================
// Messenger
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: ChatId,
    pub text: String,
    pub format: MessageFormat,
}

/// Records every delivered message; chosen recipients always fail.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<Vec<ChatId>>,
}

impl RecordingMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, recipient: ChatId) {
        self.failing.lock().unwrap().push(recipient);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, recipient: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.recipient == recipient)
            .map(|m| m.text)
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        recipient: ChatId,
        text: &str,
        format: MessageFormat,
    ) -> Result<(), DeliveryError> {
        if self.failing.lock().unwrap().contains(&recipient) {
            return Err(DeliveryError::Unauthorized {
                recipient,
                reason: "Forbidden: bot was blocked by the user".into(),
            });
        }
        self.sent.lock().unwrap().push(SentMessage {
            recipient,
            text: text.to_string(),
            format,
        });
        Ok(())
    }
}

// ============================================================================
// Reservation backend
// ============================================================================

/// What the scripted backend observed.
#[derive(Debug, Default)]
pub struct BackendLog {
    pub requested: Vec<u64>,
    pub freed: Vec<(DeviceId, u64)>,
    pub resets: Vec<DeviceId>,
}

/// Allocator that fails or succeeds according to a script.
///
/// Once the script runs out every allocation succeeds.
pub struct ScriptedBackend {
    script: VecDeque<bool>,
    log: Arc<Mutex<BackendLog>>,
}

impl ScriptedBackend {
    pub fn new(script: &[bool]) -> (Self, Arc<Mutex<BackendLog>>) {
        let log = Arc::new(Mutex::new(BackendLog::default()));
        let backend = Self {
            script: script.iter().copied().collect(),
            log: Arc::clone(&log),
        };
        (backend, log)
    }

    pub fn always_succeeds() -> (Self, Arc<Mutex<BackendLog>>) {
        Self::new(&[])
    }
}

impl ReservationBackend for ScriptedBackend {
    type Handle = (DeviceId, u64);

    fn allocate(&mut self, device: DeviceId, bytes: u64) -> Result<(DeviceId, u64), AllocationError> {
        self.log.lock().unwrap().requested.push(bytes);
        if self.script.pop_front().unwrap_or(true) {
            Ok((device, bytes))
        } else {
            Err(AllocationError::OutOfMemory {
                device,
                bytes,
                reason: "CUDA_ERROR_OUT_OF_MEMORY".into(),
            })
        }
    }

    fn free(&mut self, handle: (DeviceId, u64)) {
        self.log.lock().unwrap().freed.push(handle);
    }

    fn reset_device(&mut self, device: DeviceId) {
        self.log.lock().unwrap().resets.push(device);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A 16 GiB device with `used` bytes in use and the given process owners.
pub fn device(id: u32, used: u64, users: &[&str]) -> DeviceSnapshot {
    let total = 16 * GIB;
    DeviceSnapshot {
        id: DeviceId::new(id),
        memory: MemoryInfo::new(used, total, total.saturating_sub(used)),
        processes: users
            .iter()
            .enumerate()
            .map(|(i, user)| ProcessInfo::new(1000 + i as u32, *user, vec!["train.py".into()]))
            .collect(),
    }
}

/// Device 0 busy with alice's `train.py`, device 1 idle.
pub fn two_devices() -> Vec<DeviceSnapshot> {
    vec![device(0, 2 * GIB, &["alice"]), device(1, 0, &[])]
}

pub fn static_devices(snapshots: Vec<DeviceSnapshot>) -> (Arc<StaticDevices>, SharedDevices) {
    let stub = Arc::new(StaticDevices::new(snapshots));
    let shared: SharedDevices = stub.clone();
    (stub, shared)
}

pub fn whitelist(ids: &[i64]) -> Arc<Whitelist> {
    Arc::new(Whitelist::new(ids.iter().map(|id| ChatId::new(*id))))
}

/// A private-chat command from `sender`.
pub fn command(sender: i64, text: &str) -> CommandEvent {
    CommandEvent::parse(ChatId::new(sender), None, ChatId::new(sender), text).unwrap()
}
