//! Actor identities, roles and the per actor runtime cell

use super::*;
use std::{
    any::Any,
    fmt,
    sync::{Arc, Condvar, Mutex, MutexGuard},
};

mod mailbox;

use self::mailbox::Mailbox;

/// A unique handle for an actor within its [TroupeSystem](crate::prelude::TroupeSystem)
///
/// Ids are handed out densely starting from `0` in spawn order and are
/// never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(usize);

impl ActorId {
    /// Reconstructs an id from its raw value
    ///
    /// The result only names an existing actor if an actor with this
    /// id has actually been spawned.
    pub fn from_raw(id: usize) -> ActorId {
        ActorId(id)
    }

    /// The raw value of this id
    pub fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The type of all message handlers
///
/// Handlers get mutable access to the execution context of the actor
/// they run for, and ownership of the message payload, if any.
pub(crate) type HandlerFn = dyn Fn(&mut ActorContext, Option<Payload>) + Send + Sync;

/// The type actor state is stored as
///
/// Each actor owns at most one state box. Handlers install and inspect
/// it through [ActorContext](ActorContext).
pub type StateBox = Box<dyn Any + Send>;

/// An actor behaviour, that is a table of message handlers
///
/// Slot `0` is reserved for the hello handler that receives the first
/// message of every actor of this role. The remaining slots are selected
/// by the type value of [user messages](crate::prelude::Message::user).
/// Roles are immutable once built and may be shared by any number of
/// actors.
pub struct Role {
    handlers: Vec<Option<Box<HandlerFn>>>,
}

impl Role {
    /// Starts assembling a new role
    pub fn builder() -> RoleBuilder {
        RoleBuilder {
            handlers: Vec::new(),
        }
    }

    pub(crate) fn handler(&self, slot: usize) -> Option<&HandlerFn> {
        self.handlers.get(slot).and_then(|h| h.as_deref())
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Role({} handler slots)", self.handlers.len())
    }
}

/// A builder for [Role](Role)
///
/// Handler slots index a dense table, so message type values should be
/// kept small consecutive numbers.
pub struct RoleBuilder {
    handlers: Vec<Option<Box<HandlerFn>>>,
}

impl RoleBuilder {
    /// Installs the hello handler, which occupies slot `0`
    pub fn hello<F>(self, f: F) -> Self
    where
        F: Fn(&mut ActorContext, Option<Payload>) + Send + Sync + 'static,
    {
        self.set(0, f)
    }

    /// Installs a handler for the given message type
    pub fn handler<F>(self, msg_type: usize, f: F) -> Self
    where
        F: Fn(&mut ActorContext, Option<Payload>) + Send + Sync + 'static,
    {
        self.set(msg_type, f)
    }

    fn set<F>(mut self, slot: usize, f: F) -> Self
    where
        F: Fn(&mut ActorContext, Option<Payload>) + Send + Sync + 'static,
    {
        if self.handlers.len() <= slot {
            self.handlers.resize_with(slot + 1, || None);
        }
        self.handlers[slot] = Some(Box::new(f));
        self
    }

    /// Finalises the role
    pub fn build(self) -> Arc<Role> {
        Arc::new(Role {
            handlers: self.handlers,
        })
    }
}

/// The runtime cell of a single actor
///
/// The mutable parts live behind one mutex. The condition variable is
/// signalled whenever a pop frees up mailbox space, waking senders that
/// block on a full mailbox.
pub(crate) struct Actor {
    pub(crate) id: ActorId,
    pub(crate) role: Arc<Role>,
    pub(crate) logger: TroupeLogger,
    inner: Mutex<ActorInner>,
    pub(crate) space_available: Condvar,
}

pub(crate) struct ActorInner {
    /// Cleared by a GODIE message or a runtime shutdown, never set again
    pub(crate) alive: bool,
    /// True while the actor sits in the run queue or is being executed
    ///
    /// An actor is only enqueued when this flips from false to true, so
    /// it occupies at most one run queue slot at any time. Once an actor
    /// has finished the flag stays set so it can never be enqueued again.
    pub(crate) scheduled: bool,
    pub(crate) mailbox: Mailbox,
    pub(crate) state: Option<StateBox>,
}

impl Actor {
    pub(crate) fn new(id: ActorId, role: Arc<Role>, logger: TroupeLogger) -> Actor {
        Actor {
            id,
            role,
            logger,
            inner: Mutex::new(ActorInner {
                alive: true,
                scheduled: false,
                mailbox: Mailbox::with_capacity(MAILBOX_CAPACITY),
                state: None,
            }),
            space_available: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ActorInner> {
        self.inner
            .lock()
            .unwrap_or_else(|_| invariant_violated("actor mutex must not be poisoned"))
    }
}

/// The execution context handed to message handlers
///
/// It identifies the running actor, gives access to its private state
/// and logger, and lets the handler send messages. Sends from within a
/// handler go through the normal delivery path, so a send to an actor
/// with a full mailbox blocks the handler, including sends to the
/// running actor itself once its own mailbox is full.
pub struct ActorContext<'a> {
    id: ActorId,
    system: &'a TroupeSystem,
    state: &'a mut Option<StateBox>,
    logger: &'a TroupeLogger,
}

impl<'a> ActorContext<'a> {
    pub(crate) fn new(
        id: ActorId,
        system: &'a TroupeSystem,
        state: &'a mut Option<StateBox>,
        logger: &'a TroupeLogger,
    ) -> ActorContext<'a> {
        ActorContext {
            id,
            system,
            state,
            logger,
        }
    }

    /// The id of the actor this handler runs for
    pub fn self_id(&self) -> ActorId {
        self.id
    }

    /// Direct access to the actor's state slot
    pub fn state(&mut self) -> &mut Option<StateBox> {
        self.state
    }

    /// Replaces the actor's state
    pub fn set_state<T: Any + Send>(&mut self, value: T) {
        *self.state = Some(Box::new(value));
    }

    /// The actor's state downcast to a concrete type
    ///
    /// Returns `None` if no state is installed or it has a different type.
    pub fn state_as<T: Any>(&mut self) -> Option<&mut T> {
        self.state.as_mut().and_then(|s| s.downcast_mut::<T>())
    }

    /// Sends a message on behalf of this actor
    pub fn send(&self, target: ActorId, msg: Message) -> Result<(), TroupeError> {
        self.system.send(target, msg)
    }

    /// The system this actor runs in
    pub fn system(&self) -> &TroupeSystem {
        self.system
    }

    /// The actor's own logger
    pub fn log(&self) -> &TroupeLogger {
        self.logger
    }
}
