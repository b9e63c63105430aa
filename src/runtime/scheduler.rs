use super::*;

use crossbeam_channel::Receiver;
use std::{any::Any, panic, thread, thread::JoinHandle};

/// A unit of work in the shared run queue
pub(crate) enum WorkItem {
    /// Run a single message turn for this actor
    Run(ActorId),
    /// Terminate the worker that receives it
    Stop,
}

/// What a worker concludes about an actor at the end of a turn
enum SchedulingDecision {
    /// Mail remains, go to the back of the run queue
    Schedule,
    /// Mailbox drained but the actor lives, the next sender reschedules it
    NoWork,
    /// Dead with a drained mailbox, this actor never runs again
    Finished,
}

pub(crate) fn spawn_workers(
    system: &TroupeSystem,
    queue: Receiver<WorkItem>,
) -> Result<Vec<JoinHandle<()>>, TroupeError> {
    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(POOL_SIZE);
    for wid in 0..POOL_SIZE {
        let worker_system = system.clone();
        let worker_queue = queue.clone();
        let logger = system.logger().new(o!("wid" => wid));
        let spawned = thread::Builder::new()
            .name(format!("troupe-worker-{}", wid))
            .spawn(move || worker_loop(worker_system, worker_queue, logger));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                for _ in 0..handles.len() {
                    system.inner.enqueue(WorkItem::Stop);
                }
                for handle in handles {
                    let _ = handle.join();
                }
                return Err(TroupeError::ThreadSpawn(e.to_string()));
            }
        }
    }
    Ok(handles)
}

fn worker_loop(system: TroupeSystem, queue: Receiver<WorkItem>, logger: TroupeLogger) {
    debug!(logger, "Worker starting");
    loop {
        match queue.recv() {
            Ok(WorkItem::Run(id)) => run_turn(&system, id),
            Ok(WorkItem::Stop) => break,
            Err(_) => invariant_violated("the run queue must outlive the workers"),
        }
    }
    debug!(logger, "Worker shutting down");
}

/// Pops and dispatches exactly one message for the actor
///
/// The actor mutex is only held around mailbox and state access, never
/// across the handler invocation, so handlers are free to send, even to
/// the actor they run for.
fn run_turn(system: &TroupeSystem, id: ActorId) {
    let actor = system
        .inner
        .actor(id)
        .unwrap_or_else(|| invariant_violated("a scheduled actor must be registered"));
    let (msg, mut state) = {
        let mut inner = actor.lock();
        let msg = inner
            .mailbox
            .pop()
            .unwrap_or_else(|| invariant_violated("a scheduled actor must have mail"));
        actor.space_available.notify_one();
        (msg, inner.state.take())
    };
    dispatch(system, &actor, msg, &mut state);
    let decision = {
        let mut inner = actor.lock();
        inner.state = state;
        if !inner.mailbox.is_empty() {
            SchedulingDecision::Schedule
        } else if inner.alive {
            inner.scheduled = false;
            SchedulingDecision::NoWork
        } else {
            SchedulingDecision::Finished
        }
    };
    match decision {
        SchedulingDecision::Schedule => system.inner.enqueue(WorkItem::Run(id)),
        SchedulingDecision::NoWork => (),
        SchedulingDecision::Finished => {
            debug!(actor.logger, "Actor {} finished", id);
            system.inner.record_finished(1);
        }
    }
}

fn dispatch(system: &TroupeSystem, actor: &Arc<Actor>, msg: Message, state: &mut Option<StateBox>) {
    match msg.kind {
        MsgKind::GoDie => {
            debug!(actor.logger, "Actor {} is dying", actor.id);
            kill(actor);
        }
        MsgKind::Spawn => match msg.payload.and_then(|p| p.downcast::<Arc<Role>>().ok()) {
            Some(role) => match system.spawn_with_parent(*role, Some(actor.id)) {
                Ok(child) => trace!(actor.logger, "Actor {} spawned child {}", actor.id, child),
                Err(e) => error!(actor.logger, "Could not spawn a child actor: {}", e),
            },
            None => error!(
                actor.logger,
                "Discarding a SPAWN message without a role payload"
            ),
        },
        MsgKind::Hello => run_handler(system, actor, 0, msg.payload, state),
        MsgKind::User(msg_type) => run_handler(system, actor, msg_type, msg.payload, state),
    }
}

fn run_handler(
    system: &TroupeSystem,
    actor: &Arc<Actor>,
    slot: usize,
    payload: Option<Payload>,
    state: &mut Option<StateBox>,
) {
    let handler = match actor.role.handler(slot) {
        Some(handler) => handler,
        None => {
            error!(
                actor.logger,
                "Discarding a message for slot {} which {:?} does not handle", slot, actor.role
            );
            return;
        }
    };
    let mut ctx = ActorContext::new(actor.id, system, state, &actor.logger);
    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| handler(&mut ctx, payload)));
    if let Err(e) = res {
        if let Some(error_msg) = e.downcast_ref::<&str>() {
            error!(actor.logger, "Handler panicked with: {:?}", error_msg);
        } else if let Some(error_msg) = e.downcast_ref::<String>() {
            error!(actor.logger, "Handler panicked with: {:?}", error_msg);
        } else {
            error!(
                actor.logger,
                "Handler panicked with a non-string message with type id={:?}",
                e.type_id()
            );
        }
        kill(actor);
    }
}

/// Marks the actor dead and wakes every sender blocked on its mailbox
///
/// The woken senders observe the death and fail their send. Whatever the
/// mailbox still holds keeps being dispatched until it is drained.
fn kill(actor: &Arc<Actor>) {
    let mut inner = actor.lock();
    inner.alive = false;
    drop(inner);
    actor.space_available.notify_all();
}
