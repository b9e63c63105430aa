//! A bounded FIFO mailbox backed by a ring buffer

use super::*;

/// A fixed capacity message queue
///
/// Slots are preallocated. `first_pos` indexes the oldest message,
/// `last_pos` the slot the next push writes to, both wrapping around
/// the end of the buffer.
pub(crate) struct Mailbox {
    slots: Box<[Option<Message>]>,
    first_pos: usize,
    last_pos: usize,
    len: usize,
}

impl Mailbox {
    pub(crate) fn with_capacity(capacity: usize) -> Mailbox {
        let slots: Box<[Option<Message>]> = (0..capacity).map(|_| None).collect();
        Mailbox {
            slots,
            first_pos: 0,
            last_pos: 0,
            len: 0,
        }
    }

    /// Appends a message, or returns it to the caller if the mailbox is full
    pub(crate) fn push(&mut self, msg: Message) -> Result<(), Message> {
        if self.len == self.slots.len() {
            return Err(msg);
        }
        self.slots[self.last_pos] = Some(msg);
        self.last_pos = (self.last_pos + 1) % self.slots.len();
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the oldest message
    pub(crate) fn pop(&mut self) -> Option<Message> {
        if self.len == 0 {
            return None;
        }
        let msg = self.slots[self.first_pos].take();
        self.first_pos = (self.first_pos + 1) % self.slots.len();
        self.len -= 1;
        msg
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    #[allow(dead_code)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
