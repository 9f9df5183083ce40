//! Broadcast registry: the room membership table shared by every worker.
//!
//! Maps `socket -> room` in a fixed-capacity array guarded by one mutex.
//! The lock is held only for membership scans and snapshot copies, never
//! across I/O — a slow peer during `broadcast_to_room` must never stall a
//! concurrent `unregister` (spec §4.4/§8 liveness property).

use std::io::Write;

use tap1_core::{ConnectionHandle, sync::Mutex};
use tap1_proto::send_message;

use crate::error::RegistryError;

/// One broadcast membership record.
#[derive(Clone)]
struct Record {
    handle: ConnectionHandle,
    room: i32,
}

/// Fixed-capacity, mutex-protected `socket -> room` membership table.
pub struct BroadcastRegistry {
    capacity: usize,
    records: Mutex<Vec<Record>>,
}

impl BroadcastRegistry {
    /// Default fixed capacity, matching the reference design.
    pub const DEFAULT_CAPACITY: usize = 100;

    /// Create an empty registry with `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity, records: Mutex::new(Vec::with_capacity(capacity)) }
    }

    /// Register `handle` into `room`, or — if a record already exists for
    /// this socket — update its room in place. This pre-scan dedup is the
    /// resolved behavior for the open question on duplicate registration
    /// (spec §9): callers are never required to unregister before moving a
    /// socket to a new room.
    pub fn register(&self, handle: ConnectionHandle, room: i32) -> Result<(), RegistryError> {
        let mut records = self.records.lock();

        if let Some(existing) = records.iter_mut().find(|r| r.handle == handle) {
            existing.room = room;
            return Ok(());
        }

        if records.len() >= self.capacity {
            return Err(RegistryError::Full);
        }

        records.push(Record { handle, room });
        Ok(())
    }

    /// Remove the record for `handle`. Idempotent: repeated calls after
    /// the first return [`RegistryError::NotFound`].
    pub fn unregister(&self, handle: &ConnectionHandle) -> Result<(), RegistryError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| &r.handle != handle);
        if records.len() == before { Err(RegistryError::NotFound) } else { Ok(()) }
    }

    /// Move `handle` to `new_room`. Equivalent to `register` on an
    /// existing socket; kept as a separate name to match the operation
    /// named in the design.
    pub fn update_room(
        &self,
        handle: &ConnectionHandle,
        new_room: i32,
    ) -> Result<(), RegistryError> {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| &r.handle == handle) {
            Some(existing) => {
                existing.room = new_room;
                Ok(())
            },
            None => Err(RegistryError::NotFound),
        }
    }

    /// Number of active records.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Send `(message_type, payload)` to every socket currently registered
    /// to `room`. The membership list is snapshotted under the lock and
    /// released before any I/O runs. Per-recipient send failures are
    /// swallowed; only the delivered count is returned.
    pub fn broadcast_to_room(&self, room: i32, message_type: u16, payload: &[u8]) -> usize {
        let targets: Vec<ConnectionHandle> = {
            let records = self.records.lock();
            records.iter().filter(|r| r.room == room).map(|r| r.handle.clone()).collect()
        };

        let mut delivered = 0;
        for handle in &targets {
            if let Ok(mut stream) = handle.try_clone_stream() {
                if send_to(&mut stream, message_type, payload).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }
}

fn send_to<W: Write>(
    writer: &mut W,
    message_type: u16,
    payload: &[u8],
) -> tap1_proto::Result<usize> {
    send_message(writer, message_type, payload, b"")
}
