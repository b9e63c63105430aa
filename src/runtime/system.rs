use super::*;

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::{
    sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
    thread::JoinHandle,
};

/// A handle to an active troupe system
///
/// Handles are cheap to clone and safe to share across threads. The
/// system itself runs on [POOL_SIZE](POOL_SIZE) worker threads and keeps
/// going until every spawned actor has finished, that is died and had
/// its mailbox drained, or until a shutdown is initiated and the drain
/// completes.
#[derive(Clone)]
pub struct TroupeSystem {
    pub(crate) inner: Arc<TroupeRuntime>,
}

pub(crate) struct TroupeRuntime {
    label: String,
    logger: TroupeLogger,
    registry: RwLock<Registry>,
    queue_tx: Sender<WorkItem>,
    /// Kept so the run queue never disconnects while workers are up
    _queue_rx: Receiver<WorkItem>,
    workers: Mutex<Option<Vec<JoinHandle<()>>>>,
    interrupt: Mutex<Option<InterruptListener>>,
}

struct Registry {
    actors: Vec<Arc<Actor>>,
    spawning_allowed: bool,
    /// How many actors are dead with a drained mailbox
    ///
    /// Once this reaches the number of spawned actors the system has
    /// terminated and the workers are told to stop.
    dead_empty_count: usize,
}

/// Whether a system that spawned `spawned` actors admits another one
///
/// The gate closes when a shutdown begins and once
/// [CAST_LIMIT](CAST_LIMIT) actors have been spawned, it never reopens.
fn admits_spawn(spawning_allowed: bool, spawned: usize) -> bool {
    spawning_allowed && spawned < CAST_LIMIT
}

impl TroupeSystem {
    pub(crate) fn try_new(
        conf: TroupeConfig,
        first_role: Arc<Role>,
    ) -> Result<(TroupeSystem, ActorId), TroupeError> {
        let label = conf.label.clone();
        let logger = match conf.root_logger {
            Some(ref l) => l.new(o!("system" => label.clone())),
            None => default_logger().new(o!("system" => label.clone())),
        };
        if conf.handle_interrupt {
            block_interrupt_signal();
        }
        let (queue_tx, queue_rx) = unbounded();
        let runtime = TroupeRuntime {
            label,
            logger,
            registry: RwLock::new(Registry {
                actors: Vec::new(),
                spawning_allowed: true,
                dead_empty_count: 0,
            }),
            queue_tx,
            _queue_rx: queue_rx.clone(),
            workers: Mutex::new(None),
            interrupt: Mutex::new(None),
        };
        let system = TroupeSystem {
            inner: Arc::new(runtime),
        };
        // The first actor's hello sits in the run queue before any worker
        // starts, so nothing needs to be torn down if it cannot be spawned.
        let first = system.spawn(first_role)?;
        let workers = spawn_workers(&system, queue_rx)?;
        *system
            .inner
            .workers
            .lock()
            .unwrap_or_else(|_| invariant_violated("worker list mutex must not be poisoned")) =
            Some(workers);
        if conf.handle_interrupt {
            match InterruptListener::start(system.clone()) {
                Ok(listener) => {
                    *system.inner.interrupt.lock().unwrap_or_else(|_| {
                        invariant_violated("interrupt mutex must not be poisoned")
                    }) = Some(listener);
                }
                Err(e) => {
                    system.stop_workers_after_failed_start();
                    return Err(e);
                }
            }
        }
        info!(
            system.inner.logger,
            "Troupe system starting with {} workers", POOL_SIZE
        );
        Ok((system, first))
    }

    /// The name of this system
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The system's root logger
    pub fn logger(&self) -> &TroupeLogger {
        &self.inner.logger
    }

    /// Spawns a new actor with the given role
    ///
    /// The actor gets the next free id and is greeted with a hello
    /// message carrying no parent, as if it were a first actor. Fails
    /// with [SpawnDenied](TroupeError::SpawnDenied) once the system
    /// stopped admitting actors.
    pub fn spawn(&self, role: Arc<Role>) -> Result<ActorId, TroupeError> {
        self.spawn_with_parent(role, None)
    }

    pub(crate) fn spawn_with_parent(
        &self,
        role: Arc<Role>,
        parent: Option<ActorId>,
    ) -> Result<ActorId, TroupeError> {
        let id = {
            let mut registry = self.inner.registry_write();
            if !admits_spawn(registry.spawning_allowed, registry.actors.len()) {
                return Err(TroupeError::SpawnDenied);
            }
            let id = ActorId::from_raw(registry.actors.len());
            let logger = self.inner.logger.new(o!("aid" => id.raw()));
            registry.actors.push(Arc::new(Actor::new(id, role, logger)));
            id
        };
        debug!(self.inner.logger, "Spawned actor {}", id);
        self.send(id, Message::hello(parent))?;
        Ok(id)
    }

    /// Whether this id names an actor spawned by this system
    pub fn is_valid(&self, id: ActorId) -> bool {
        id.raw() < self.inner.registry_read().actors.len()
    }

    /// Delivers a message to the addressed actor's mailbox
    ///
    /// Blocks while the mailbox is full. Delivery order between two
    /// actors is the order of the sends, messages are never reordered
    /// or dropped once accepted. Fails if the id is unknown, or if the
    /// actor died before the message could be accepted.
    pub fn send(&self, target: ActorId, msg: Message) -> Result<(), TroupeError> {
        let actor = match self.inner.registry_read().actors.get(target.raw()) {
            Some(actor) => actor.clone(),
            None => return Err(TroupeError::UnknownActor(target)),
        };
        let mut inner = actor.lock();
        if !inner.alive {
            return Err(TroupeError::ActorDead(target));
        }
        while inner.mailbox.is_full() {
            inner = actor
                .space_available
                .wait(inner)
                .unwrap_or_else(|_| invariant_violated("actor mutex must not be poisoned"));
            if !inner.alive {
                return Err(TroupeError::ActorDead(target));
            }
        }
        let was_empty = inner.mailbox.is_empty();
        if inner.mailbox.push(msg).is_err() {
            invariant_violated("mailbox accepted no message despite free space");
        }
        if was_empty && !inner.scheduled {
            inner.scheduled = true;
            drop(inner);
            self.inner.enqueue(WorkItem::Run(target));
        }
        Ok(())
    }

    /// Initiates an orderly shutdown of the system
    ///
    /// Marks every actor dead and stops admitting new ones. Messages
    /// already accepted are still dispatched, so handlers get to run for
    /// the whole backlog, but nothing new is accepted. The workers stop
    /// once the drain is complete, which is what [join](TroupeSystem::join)
    /// waits for. Safe to call more than once and from any thread,
    /// including from inside a handler.
    pub fn initiate_shutdown(&self) {
        info!(self.inner.logger, "Shutting down troupe system");
        let actors = {
            let mut registry = self.inner.registry_write();
            registry.spawning_allowed = false;
            registry.actors.clone()
        };
        let mut newly_idle = 0usize;
        for actor in actors {
            let mut inner = actor.lock();
            if inner.alive {
                inner.alive = false;
                // An idle actor will never be run again, so no worker is
                // left to observe that it has finished.
                if !inner.scheduled {
                    newly_idle += 1;
                }
                drop(inner);
                actor.space_available.notify_all();
            }
        }
        if newly_idle > 0 {
            self.inner.record_finished(newly_idle);
        }
    }

    /// Waits for the system to terminate
    ///
    /// The actor id must belong to this system, it identifies which
    /// system an embedder with several of them is waiting on. Blocks
    /// until every actor has finished, then releases all actor storage,
    /// after which previously valid ids are reported as unknown. Any
    /// number of handles may join concurrently, each call returns only
    /// once the system has fully terminated.
    pub fn join(self, actor: ActorId) {
        if !self.is_valid(actor) {
            warn!(
                self.inner.logger,
                "Cannot join on actor {} which was never spawned", actor
            );
            return;
        }
        // The guard spans the pool join and the teardown, so concurrent
        // callers block here until termination is complete.
        let mut workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(|_| invariant_violated("worker list mutex must not be poisoned"));
        match workers.take() {
            Some(handles) => {
                for handle in handles {
                    if handle.join().is_err() {
                        error!(self.inner.logger, "A worker thread panicked");
                    }
                }
                self.inner.stop_interrupt_listener();
                {
                    let mut registry = self.inner.registry_write();
                    registry.actors.clear();
                    registry.dead_empty_count = 0;
                    registry.spawning_allowed = false;
                }
                info!(self.inner.logger, "Troupe system terminated");
            }
            None => {
                debug!(self.inner.logger, "Troupe system was already joined");
            }
        }
    }

    fn stop_workers_after_failed_start(&self) {
        for _ in 0..POOL_SIZE {
            self.inner.enqueue(WorkItem::Stop);
        }
        let workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(|_| invariant_violated("worker list mutex must not be poisoned"))
            .take();
        if let Some(handles) = workers {
            for handle in handles {
                let _ = handle.join();
            }
        }
    }
}

impl TroupeRuntime {
    fn registry_read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry
            .read()
            .unwrap_or_else(|_| invariant_violated("registry lock must not be poisoned"))
    }

    fn registry_write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry
            .write()
            .unwrap_or_else(|_| invariant_violated("registry lock must not be poisoned"))
    }

    pub(crate) fn actor(&self, id: ActorId) -> Option<Arc<Actor>> {
        self.registry_read().actors.get(id.raw()).cloned()
    }

    pub(crate) fn enqueue(&self, item: WorkItem) {
        if self.queue_tx.send(item).is_err() {
            invariant_violated("the run queue must outlive the workers");
        }
    }

    /// Accounts for actors that are dead with a drained mailbox
    ///
    /// Exactly one caller observes each actor finishing: the worker that
    /// drained it, or the shutdown scan for actors that were idle when
    /// they were marked dead. The final call stops the worker pool.
    pub(crate) fn record_finished(&self, n: usize) {
        let mut registry = self.registry_write();
        registry.dead_empty_count += n;
        if registry.dead_empty_count > registry.actors.len() {
            invariant_violated("more actors finished than were spawned");
        }
        if registry.dead_empty_count == registry.actors.len() {
            registry.spawning_allowed = false;
            info!(
                self.logger,
                "All {} actors finished, stopping workers", registry.dead_empty_count
            );
            for _ in 0..POOL_SIZE {
                self.enqueue(WorkItem::Stop);
            }
        }
    }

    fn stop_interrupt_listener(&self) {
        let listener = self
            .interrupt
            .lock()
            .unwrap_or_else(|_| invariant_violated("interrupt mutex must not be poisoned"))
            .take();
        if let Some(listener) = listener {
            listener.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_gate_closes_at_the_cast_limit() {
        assert!(admits_spawn(true, 0));
        assert!(admits_spawn(true, CAST_LIMIT - 1));
        assert!(!admits_spawn(true, CAST_LIMIT));
    }

    #[test]
    fn spawn_gate_stays_closed_after_shutdown() {
        assert!(!admits_spawn(false, 0));
        assert!(!admits_spawn(false, CAST_LIMIT - 1));
    }
}
