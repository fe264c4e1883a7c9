use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::addr::Protocol;
use crate::buffer::WriteBuf;
use crate::error::ReactorError;
use crate::sys::Socket;

/// Maximum number of live sockets a single `Poll` will track. Matches the
/// original protocol's fixed-size table; chosen so the rotating-cursor
/// allocator stays O(1) amortized without ever compacting.
pub const MAX_SLOTS: usize = 0xFFFF;

pub const READ_HINT_MIN: usize = 512;
pub const READ_HINT_DEFAULT: usize = 4096;
pub const READ_HINT_MAX: usize = 64 * 1024;

/// Stable handle to a socket, valid for the socket's whole lifetime. The
/// same integer is never reused until the slot it names has been fully
/// torn down.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Invalid,
    Reserved,
    Listening,
    Connecting,
    Connected,
    UdpBound,
}

pub(crate) struct WriteNode {
    pub buf: WriteBuf,
    pub offset: usize,
    pub dest: Option<SocketAddr>,
}

impl WriteNode {
    pub fn remaining(&self) -> &[u8] {
        &self.buf.as_slice()[self.offset..]
    }

    pub fn is_drained(&self) -> bool {
        self.offset >= self.buf.len()
    }
}

pub(crate) struct SocketSlot {
    /// `None` only while the slot is `Invalid`/freshly `Reserved`.
    pub socket: Option<Socket>,
    pub kind: SlotKind,
    pub protocol: Protocol,
    pub peer_addr: Option<SocketAddr>,
    pub write_queue: VecDeque<WriteNode>,
    pub closing: bool,
    pub read_enabled: bool,
    pub write_enabled: bool,
    /// Adaptive size hint for the next TCP read buffer: doubles when a read
    /// fills the buffer, halves when a read badly underfills it.
    pub read_hint: usize,
}

impl SocketSlot {
    fn empty() -> SocketSlot {
        SocketSlot {
            socket: None,
            kind: SlotKind::Invalid,
            protocol: Protocol::Tcp,
            peer_addr: None,
            write_queue: VecDeque::new(),
            closing: false,
            read_enabled: false,
            write_enabled: false,
            read_hint: READ_HINT_DEFAULT,
        }
    }

    fn reset(&mut self) {
        *self = SocketSlot::empty();
    }
}

/// Fixed-capacity slot table addressed by [`SlotId`]. Allocation probes
/// linearly from a rotating cursor for the next `Invalid` slot rather than
/// keeping a free list (`slab`-style) — the table never shrinks and ids
/// must stay stable for the socket's whole life, which a free-list/generation
/// scheme would complicate for no benefit here.
pub(crate) struct SlotTable {
    slots: Vec<SocketSlot>,
    cursor: usize,
}

impl SlotTable {
    pub fn new() -> SlotTable {
        SlotTable {
            slots: Vec::new(),
            cursor: 0,
        }
    }

    pub fn get(&self, id: SlotId) -> Option<&SocketSlot> {
        self.slots.get(id.0).filter(|s| s.kind != SlotKind::Invalid)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut SocketSlot> {
        let slot = self.slots.get_mut(id.0)?;
        if slot.kind == SlotKind::Invalid {
            None
        } else {
            Some(slot)
        }
    }

    /// Raw lookup that does not check liveness — used by teardown, which
    /// must be able to touch a slot it is about to invalidate.
    pub(crate) fn get_mut_raw(&mut self, id: SlotId) -> Option<&mut SocketSlot> {
        self.slots.get_mut(id.0)
    }

    pub fn allocate(&mut self) -> Result<SlotId, ReactorError> {
        if self.slots.is_empty() {
            self.slots.resize_with(1, SocketSlot::empty);
        }

        let len = self.slots.len();
        for i in 0..len {
            let idx = (self.cursor + i) % len;
            if self.slots[idx].kind == SlotKind::Invalid {
                self.slots[idx].kind = SlotKind::Reserved;
                self.cursor = (idx + 1) % len;
                return Ok(SlotId(idx));
            }
        }

        if self.slots.len() >= MAX_SLOTS {
            return Err(ReactorError::SlotTableFull);
        }

        let idx = self.slots.len();
        self.slots.push(SocketSlot::empty());
        self.slots[idx].kind = SlotKind::Reserved;
        self.cursor = (idx + 1) % self.slots.len();
        Ok(SlotId(idx))
    }

    /// Every slot that is not `Invalid`, in table order. Used by shutdown to
    /// close out whatever is still open.
    pub fn live_ids(&self) -> Vec<SlotId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind != SlotKind::Invalid)
            .map(|(idx, _)| SlotId(idx))
            .collect()
    }

    pub fn free(&mut self, id: SlotId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.reset();
        }
    }
}
