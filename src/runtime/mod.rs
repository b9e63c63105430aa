use super::*;

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Once,
    },
};

mod config;
mod scheduler;
mod shutdown;
mod system;

pub use config::*;
pub(crate) use scheduler::*;
pub(crate) use shutdown::*;
pub use system::*;

/// The number of worker threads driving every troupe system
pub const POOL_SIZE: usize = 3;

/// The capacity of every actor mailbox
///
/// A send to an actor whose mailbox holds this many undelivered messages
/// blocks until the actor pops some of them.
pub const MAILBOX_CAPACITY: usize = 2048;

/// The maximum number of actors a single system will ever spawn
pub const CAST_LIMIT: usize = 1_048_576;

static GLOBAL_RUNTIME_COUNT: AtomicUsize = AtomicUsize::new(0);

fn default_runtime_label() -> String {
    let runtime_count = GLOBAL_RUNTIME_COUNT.fetch_add(1, Ordering::SeqCst) + 1;
    format!("troupe-runtime-{}", runtime_count)
}

static mut DEFAULT_ROOT_LOGGER: Option<TroupeLogger> = None;
static DEFAULT_ROOT_LOGGER_INIT: Once = Once::new();

fn default_logger() -> &'static TroupeLogger {
    unsafe {
        DEFAULT_ROOT_LOGGER_INIT.call_once(|| {
            let decorator = slog_term::TermDecorator::new().stdout().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain).chan_size(1024).build().fuse();
            DEFAULT_ROOT_LOGGER = Some(slog::Logger::root_typed(
                Arc::new(drain),
                o!(
                "location" => slog::PushFnValue(|r: &slog::Record<'_>, ser: slog::PushFnValueSerializer<'_>| {
                    ser.emit(format_args!("{}:{}", r.file(), r.line()))
                })
                        ),
            ));
        });
        match DEFAULT_ROOT_LOGGER {
            Some(ref l) => l,
            None => panic!("Can't re-initialise global logger after it has been dropped!"),
        }
    }
}

/// Removes the global default logger
///
/// This causes the remaining messages to be flushed to the output.
///
/// This can't be undone (as in, calling `default_logger()` afterwards again will panic),
/// so make sure you use this only right before exiting the programme.
pub fn drop_default_logger() {
    unsafe {
        drop(DEFAULT_ROOT_LOGGER.take());
    }
}

/// A troupe system error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TroupeError {
    /// No actor with this id has been spawned
    UnknownActor(ActorId),
    /// The addressed actor is dead and accepts no further messages
    ActorDead(ActorId),
    /// The system no longer admits new actors
    ///
    /// Spawning stops once a shutdown has begun, once the system has
    /// terminated, and once [CAST_LIMIT](CAST_LIMIT) actors have been spawned.
    SpawnDenied,
    /// The system could not start one of its runtime threads
    ThreadSpawn(String),
}

impl fmt::Display for TroupeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TroupeError::UnknownActor(id) => write!(f, "no actor with id {} has been spawned", id),
            TroupeError::ActorDead(id) => {
                write!(f, "actor {} is dead and accepts no further messages", id)
            }
            TroupeError::SpawnDenied => write!(f, "the system no longer admits new actors"),
            TroupeError::ThreadSpawn(cause) => {
                write!(f, "a runtime thread could not be spawned: {}", cause)
            }
        }
    }
}

impl std::error::Error for TroupeError {}

pub(crate) fn invariant_violated(what: &str) -> ! {
    eprintln!(
        "Aborting process due to unrecoverable violated invariant: {}",
        what
    );
    std::process::abort()
}
