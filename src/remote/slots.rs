//! Per-command reply dispatch
//!
//! One slot per [`CommandKind`]. A slot holding a pending entry is "active":
//! a second command of the same kind is rejected until the reply arrives, the
//! caller gives up, or the connection fails.
//!
//! A command the caller gave up on, or stopped, is still owed a reply. Those
//! stragglers are counted so the reader can drop them; any other reply to an
//! idle kind is a protocol error.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::Mutex;
use tracing::trace;

use crate::audio::Buffer;
use crate::protocol::{CommandKind, ReplyHeader};

use super::error::RemoteError;

/// Decoded reply payload
#[derive(Debug)]
pub enum ReplyBody {
    Empty,
    Recorded(Buffer),
    Text(String),
}

/// A complete reply
#[derive(Debug)]
pub struct Reply {
    pub header: ReplyHeader,
    pub body: ReplyBody,
}

pub type ReplyResult = Result<Reply, RemoteError>;

/// What the reader needs to know to decode the payload
#[derive(Debug, Clone, Copy, Default)]
pub struct Expectation {
    /// Largest payload accepted, in bytes
    pub capacity: usize,
    pub stereo: bool,
}

struct Pending {
    expect: Expectation,
    tx: Sender<ReplyResult>,
}

/// Reply dispatch table
pub struct CommandSlots {
    slots: [Mutex<Option<Pending>>; 6],
    owed: [AtomicU32; 6],
}

impl Default for CommandSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandSlots {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            owed: Default::default(),
        }
    }

    fn slot(&self, kind: CommandKind) -> &Mutex<Option<Pending>> {
        &self.slots[kind.index()]
    }

    /// Mark `kind` active and return the channel its reply will arrive on
    pub fn claim(&self, kind: CommandKind, expect: Expectation) -> Result<Receiver<ReplyResult>, RemoteError> {
        let mut slot = self.slot(kind).lock();
        if slot.is_some() {
            return Err(RemoteError::Busy(kind));
        }
        let (tx, rx) = mpsc::channel();
        *slot = Some(Pending { expect, tx });
        trace!("Claimed {:?}", kind);
        Ok(rx)
    }

    pub fn is_active(&self, kind: CommandKind) -> bool {
        self.slot(kind).lock().is_some()
    }

    /// Drop the pending entry without delivering anything
    pub fn release(&self, kind: CommandKind) {
        if self.slot(kind).lock().take().is_some() {
            trace!("Released {:?}", kind);
        }
    }

    /// Free the slot of a command whose reply may still arrive
    pub fn abandon(&self, kind: CommandKind) {
        if self.slot(kind).lock().take().is_some() {
            self.owed[kind.index()].fetch_add(1, Ordering::SeqCst);
            trace!("Abandoned {:?}", kind);
        }
    }

    /// Consume one straggler owed for `kind`
    ///
    /// Returns `false` when no abandoned command of this kind is outstanding.
    pub fn take_straggler(&self, kind: CommandKind) -> bool {
        self.owed[kind.index()]
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Decoding hints for the pending command, if any
    pub fn expectation(&self, kind: CommandKind) -> Option<Expectation> {
        self.slot(kind).lock().as_ref().map(|p| p.expect)
    }

    /// Deliver a result and free the slot
    ///
    /// Returns `false` when nothing was waiting for this kind.
    pub fn complete(&self, kind: CommandKind, result: ReplyResult) -> bool {
        match self.slot(kind).lock().take() {
            Some(pending) => {
                // The caller may have stopped listening; the slot is free either way
                let _ = pending.tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Fail every pending command, e.g. after the connection dropped
    pub fn fail_all(&self) {
        for kind in CommandKind::ALL {
            self.complete(kind, Err(RemoteError::Disconnected));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_reply(kind: CommandKind) -> ReplyResult {
        Ok(Reply {
            header: ReplyHeader::new(kind, 0, 0),
            body: ReplyBody::Empty,
        })
    }

    #[test]
    fn test_second_claim_is_rejected() {
        let slots = CommandSlots::new();
        let _rx = slots.claim(CommandKind::Download, Expectation::default()).unwrap();
        assert!(matches!(
            slots.claim(CommandKind::Download, Expectation::default()),
            Err(RemoteError::Busy(CommandKind::Download))
        ));
        // Other kinds are independent
        assert!(slots
            .claim(CommandKind::GetDeviceInfo, Expectation::default())
            .is_ok());
    }

    #[test]
    fn test_complete_frees_slot() {
        let slots = CommandSlots::new();
        let rx = slots
            .claim(CommandKind::StartPlayback, Expectation::default())
            .unwrap();
        assert!(slots.is_active(CommandKind::StartPlayback));

        assert!(slots.complete(CommandKind::StartPlayback, ok_reply(CommandKind::StartPlayback)));
        assert!(!slots.is_active(CommandKind::StartPlayback));
        assert!(rx.recv().unwrap().is_ok());

        assert!(!slots.complete(CommandKind::StartPlayback, ok_reply(CommandKind::StartPlayback)));
    }

    #[test]
    fn test_abandoned_reply_is_owed_once() {
        let slots = CommandSlots::new();
        assert!(!slots.take_straggler(CommandKind::StartPlayback));

        let _rx = slots
            .claim(CommandKind::StartPlayback, Expectation::default())
            .unwrap();
        slots.abandon(CommandKind::StartPlayback);
        assert!(!slots.is_active(CommandKind::StartPlayback));

        assert!(slots.take_straggler(CommandKind::StartPlayback));
        assert!(!slots.take_straggler(CommandKind::StartPlayback));

        // Abandoning an idle kind owes nothing
        slots.abandon(CommandKind::Download);
        assert!(!slots.take_straggler(CommandKind::Download));
    }

    #[test]
    fn test_fail_all_notifies_waiters() {
        let slots = CommandSlots::new();
        let rx = slots
            .claim(CommandKind::StartRecording, Expectation::default())
            .unwrap();
        slots.fail_all();
        assert!(matches!(rx.recv().unwrap(), Err(RemoteError::Disconnected)));
    }
}
