//! Messaging types for communicating with actors

use super::*;
use std::{any::Any, fmt, sync::Arc};

/// An opaque, owned message payload
///
/// Handlers downcast this to the concrete type they expect for the
/// message type they are registered under.
pub type Payload = Box<dyn Any + Send>;

/// The kind of a [Message](Message)
///
/// The first three kinds are interpreted by the runtime itself, only
/// [User](MsgKind::User) messages are dispatched purely by the receiver's
/// handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    /// Ask the runtime to spawn a new actor on behalf of the receiver
    ///
    /// The payload must be an `Arc<Role>`. The new actor is greeted with
    /// a hello message carrying the id of the actor this message was
    /// addressed to.
    Spawn,
    /// Mark the receiver as dead
    ///
    /// A dead actor accepts no further messages, but everything already
    /// in its mailbox is still dispatched before it finishes.
    GoDie,
    /// The first message every actor receives
    ///
    /// Carries the id of the spawning actor, if there was one.
    Hello,
    /// An application defined message type
    ///
    /// The value selects the handler slot in the receiver's [Role](crate::prelude::Role).
    User(usize),
}

impl fmt::Display for MsgKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MsgKind::Spawn => write!(f, "SPAWN"),
            MsgKind::GoDie => write!(f, "GODIE"),
            MsgKind::Hello => write!(f, "HELLO"),
            MsgKind::User(t) => write!(f, "USER({})", t),
        }
    }
}

/// A single message as it sits in a mailbox
pub struct Message {
    pub(crate) kind: MsgKind,
    pub(crate) payload: Option<Payload>,
}

impl Message {
    /// Creates a spawn request carrying the role for the new actor
    ///
    /// Send this to any actor to have the runtime spawn a child on its
    /// behalf. The child's hello message will name the receiver as its
    /// parent.
    pub fn spawn(role: Arc<Role>) -> Message {
        Message {
            kind: MsgKind::Spawn,
            payload: Some(Box::new(role)),
        }
    }

    /// Creates a death request
    ///
    /// Actors usually send this to themselves once their work is done.
    pub fn go_die() -> Message {
        Message {
            kind: MsgKind::GoDie,
            payload: None,
        }
    }

    /// Creates the greeting delivered to a newly spawned actor
    pub(crate) fn hello(parent: Option<ActorId>) -> Message {
        Message {
            kind: MsgKind::Hello,
            payload: parent.map(|id| Box::new(id) as Payload),
        }
    }

    /// Creates an application message of the given type with a payload
    pub fn user<T: Any + Send>(msg_type: usize, payload: T) -> Message {
        Message {
            kind: MsgKind::User(msg_type),
            payload: Some(Box::new(payload)),
        }
    }

    /// Creates an application message of the given type without a payload
    pub fn user_empty(msg_type: usize) -> Message {
        Message {
            kind: MsgKind::User(msg_type),
            payload: None,
        }
    }

    /// The kind of this message
    pub fn kind(&self) -> MsgKind {
        self.kind
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Message({}, payload={})",
            self.kind,
            if self.payload.is_some() { "yes" } else { "no" }
        )
    }
}
