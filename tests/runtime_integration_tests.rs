use crossbeam_channel::{unbounded, Receiver as Rcv, Sender};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use synchronoise::CountdownEvent;
use troupe::prelude::*;

const TIMEOUT: Duration = Duration::from_millis(5000);
const SETTLE: Duration = Duration::from_millis(300);

const MSG_PING: usize = 1;
const MSG_BOOM: usize = 2;

fn quiet_config(label: &str) -> TroupeConfig {
    let mut conf = TroupeConfig::new();
    conf.label(label).handle_interrupt(false);
    conf
}

fn expect_recv<T>(rx: &Rcv<T>, what: &str) -> T {
    match rx.recv_timeout(TIMEOUT) {
        Ok(v) => v,
        Err(_) => panic!("timeout waiting for {}", what),
    }
}

fn wait_zero(latch: &CountdownEvent) {
    let count = latch.wait_timeout(TIMEOUT);
    assert_eq!(count, 0, "Latch should have triggered by now!");
}

#[test]
fn messages_arrive_in_send_order() {
    let (tx, rx) = unbounded::<u64>();
    let role = Role::builder()
        .hello(|_ctx, _payload| ())
        .handler(MSG_PING, move |_ctx, payload| {
            let value = payload
                .and_then(|p| p.downcast::<u64>().ok())
                .expect("u64 payload");
            tx.send(*value).expect("observe");
        })
        .build();
    let (system, first) = quiet_config("troupe-fifo")
        .build(role)
        .expect("TroupeSystem");
    for i in 0..100u64 {
        system.send(first, Message::user(MSG_PING, i)).expect("send");
    }
    system.send(first, Message::go_die()).expect("go die");
    system.join(first);
    for i in 0..100u64 {
        assert_eq!(expect_recv(&rx, "the next value"), i);
    }
    assert!(rx.try_recv().is_err(), "no further values should arrive");
}

#[test]
fn turns_never_overlap() {
    const ROUNDS: usize = 200;
    let busy = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));
    let handled = Arc::new(AtomicUsize::new(0));
    let latch = Arc::new(CountdownEvent::new(1));
    let (busy2, overlapped2, handled2, latch2) = (
        busy.clone(),
        overlapped.clone(),
        handled.clone(),
        latch.clone(),
    );
    let role = Role::builder()
        .hello(|_ctx, _payload| ())
        .handler(MSG_PING, move |_ctx, _payload| {
            if busy2.fetch_add(1, Ordering::SeqCst) != 0 {
                overlapped2.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
            busy2.fetch_sub(1, Ordering::SeqCst);
            if handled2.fetch_add(1, Ordering::SeqCst) + 1 == ROUNDS {
                latch2.decrement().expect("Latch should have decremented!");
            }
        })
        .build();
    let (system, first) = quiet_config("troupe-one-turn")
        .build(role)
        .expect("TroupeSystem");
    for _ in 0..ROUNDS {
        system
            .send(first, Message::user_empty(MSG_PING))
            .expect("send");
    }
    wait_zero(&latch);
    assert!(
        !overlapped.load(Ordering::SeqCst),
        "two turns ran concurrently for the same actor"
    );
    system.send(first, Message::go_die()).expect("go die");
    system.join(first);
    assert_eq!(handled.load(Ordering::SeqCst), ROUNDS);
}

#[test]
fn full_mailboxes_block_senders() {
    let (entered_tx, entered_rx) = unbounded::<()>();
    let (release_tx, release_rx) = unbounded::<()>();
    let role = Role::builder()
        .hello(|_ctx, _payload| ())
        .handler(MSG_PING, move |_ctx, _payload| {
            entered_tx.send(()).expect("entered");
            release_rx.recv().expect("release");
        })
        .build();
    let (system, first) = quiet_config("troupe-backpressure")
        .build(role)
        .expect("TroupeSystem");
    system
        .send(first, Message::user_empty(MSG_PING))
        .expect("send");
    expect_recv(&entered_rx, "the first turn to start");
    // The running turn already popped its message, so this fills the
    // mailbox exactly and the next send has to wait.
    for _ in 0..MAILBOX_CAPACITY {
        system
            .send(first, Message::user_empty(MSG_PING))
            .expect("fill");
    }
    let done_a = Arc::new(AtomicBool::new(false));
    let done_b = Arc::new(AtomicBool::new(false));
    crossbeam_utils::thread::scope(|s| {
        let sys_a = system.clone();
        let flag_a = done_a.clone();
        s.spawn(move |_| {
            sys_a
                .send(first, Message::user_empty(MSG_PING))
                .expect("blocked send");
            flag_a.store(true, Ordering::SeqCst);
        });
        let sys_b = system.clone();
        let flag_b = done_b.clone();
        s.spawn(move |_| {
            sys_b
                .send(first, Message::user_empty(MSG_PING))
                .expect("blocked send");
            flag_b.store(true, Ordering::SeqCst);
        });
        thread::sleep(SETTLE);
        assert!(
            !done_a.load(Ordering::SeqCst) && !done_b.load(Ordering::SeqCst),
            "senders should be blocked on the full mailbox"
        );
        release_tx.send(()).expect("release");
        thread::sleep(SETTLE);
        let unblocked =
            done_a.load(Ordering::SeqCst) as usize + done_b.load(Ordering::SeqCst) as usize;
        assert_eq!(unblocked, 1, "one freed slot unblocks exactly one sender");
        for _ in 0..(MAILBOX_CAPACITY + 2) {
            release_tx.send(()).expect("release");
        }
    })
    .expect("scope");
    system.send(first, Message::go_die()).expect("go die");
    let observer = system.clone();
    system.join(first);
    assert!(!observer.is_valid(first));
}

#[test]
fn hello_always_arrives_first() {
    let (tx, rx) = unbounded::<String>();
    let hello_tx = tx.clone();
    let observed_role = Role::builder()
        .hello(move |_ctx, payload| {
            hello_tx
                .send(format!("hello:{}", payload.is_none()))
                .expect("observe");
        })
        .handler(MSG_PING, move |_ctx, _payload| {
            tx.send("ping".to_string()).expect("observe");
        })
        .build();
    let silent_role = Role::builder().hello(|_ctx, _payload| ()).build();
    let (system, first) = quiet_config("troupe-hello-first")
        .build(silent_role)
        .expect("TroupeSystem");
    let second = system.spawn(observed_role).expect("spawn");
    for _ in 0..3 {
        system
            .send(second, Message::user_empty(MSG_PING))
            .expect("send");
    }
    // The greeting was queued during the spawn, before any ping could be.
    assert_eq!(expect_recv(&rx, "a greeting"), "hello:true");
    for _ in 0..3 {
        assert_eq!(expect_recv(&rx, "a ping"), "ping");
    }
    system.send(first, Message::go_die()).expect("go die");
    system.send(second, Message::go_die()).expect("go die");
    system.join(first);
}

const CHAIN_LEN: usize = 5;

fn chain_role(tx: Sender<(usize, Option<usize>)>, count: Arc<AtomicUsize>) -> Arc<Role> {
    Role::builder()
        .hello(move |ctx, payload| {
            let parent = payload
                .and_then(|p| p.downcast::<ActorId>().ok())
                .map(|id| *id);
            tx.send((ctx.self_id().raw(), parent.map(|p| p.raw())))
                .expect("announce");
            let made = count.fetch_add(1, Ordering::SeqCst) + 1;
            if made < CHAIN_LEN {
                ctx.send(
                    ctx.self_id(),
                    Message::spawn(chain_role(tx.clone(), count.clone())),
                )
                .expect("spawn link");
            }
            ctx.send(ctx.self_id(), Message::go_die()).expect("go die");
        })
        .build()
}

#[test]
fn spawn_chain_links_parents() {
    let (tx, rx) = unbounded();
    let count = Arc::new(AtomicUsize::new(0));
    let (system, first) = quiet_config("troupe-chain")
        .build(chain_role(tx, count))
        .expect("TroupeSystem");
    assert_eq!(first.raw(), 0);
    for k in 0..CHAIN_LEN {
        let expected_parent = if k == 0 { None } else { Some(k - 1) };
        assert_eq!(
            expect_recv(&rx, "the next chain link"),
            (k, expected_parent)
        );
    }
    // Every link died after greeting, so the system winds down by itself.
    system.join(first);
    assert!(rx.try_recv().is_err());
}

#[test]
fn dead_actors_still_drain_their_backlog() {
    let (entered_tx, entered_rx) = unbounded::<()>();
    let (release_tx, release_rx) = unbounded::<()>();
    let handled = Arc::new(AtomicUsize::new(0));
    let handled2 = handled.clone();
    let role = Role::builder()
        .hello(|_ctx, _payload| ())
        .handler(MSG_PING, move |_ctx, _payload| {
            entered_tx.send(()).expect("entered");
            release_rx.recv().expect("release");
            handled2.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let (system, first) = quiet_config("troupe-dead-drain")
        .build(role)
        .expect("TroupeSystem");
    assert_eq!(
        system.send(ActorId::from_raw(99), Message::user_empty(MSG_PING)),
        Err(TroupeError::UnknownActor(ActorId::from_raw(99)))
    );
    system
        .send(first, Message::user_empty(MSG_PING))
        .expect("send");
    expect_recv(&entered_rx, "the first turn to start");
    system.send(first, Message::go_die()).expect("go die");
    for _ in 0..4 {
        system
            .send(first, Message::user_empty(MSG_PING))
            .expect("send behind the death request");
    }
    release_tx.send(()).expect("release");
    // The second turn dispatched the death request, the third is now
    // blocked in the handler, so the actor is dead with a backlog.
    expect_recv(&entered_rx, "the turn after the death request");
    assert_eq!(
        system.send(first, Message::user_empty(MSG_BOOM)),
        Err(TroupeError::ActorDead(first))
    );
    for _ in 0..4 {
        release_tx.send(()).expect("release");
    }
    system.join(first);
    assert_eq!(
        handled.load(Ordering::SeqCst),
        5,
        "every message accepted before death must still be dispatched"
    );
}

const RELAY_LEN: usize = 3;
const MSG_VALUE_REQUEST: usize = 3;
const MSG_VALUE: usize = 4;
const MSG_DONE: usize = 5;

struct RelayState {
    parent: Option<ActorId>,
    link: usize,
    value: u64,
}

fn relay_role(tx: Sender<u64>, links: Arc<AtomicUsize>) -> Arc<Role> {
    let hello_links = links.clone();
    let hello_tx = tx.clone();
    Role::builder()
        .hello(move |ctx, payload| {
            let parent = payload
                .and_then(|p| p.downcast::<ActorId>().ok())
                .map(|id| *id);
            let link = hello_links.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.set_state(RelayState {
                parent,
                link,
                value: 0,
            });
            match parent {
                // The root holds the seed and starts the chain itself.
                None => {
                    let st = ctx.state_as::<RelayState>().expect("state");
                    st.value = 7;
                    ctx.send(
                        ctx.self_id(),
                        Message::spawn(relay_role(hello_tx.clone(), hello_links.clone())),
                    )
                    .expect("spawn link");
                }
                Some(parent) => {
                    ctx.send(parent, Message::user(MSG_VALUE_REQUEST, ctx.self_id()))
                        .expect("request");
                }
            }
        })
        .handler(MSG_VALUE_REQUEST, |ctx, payload| {
            let requester = payload
                .and_then(|p| p.downcast::<ActorId>().ok())
                .map(|id| *id)
                .expect("requester");
            let value = ctx.state_as::<RelayState>().expect("state").value;
            ctx.send(requester, Message::user(MSG_VALUE, value + 1))
                .expect("reply");
        })
        .handler(MSG_VALUE, move |ctx, payload| {
            let value = payload
                .and_then(|p| p.downcast::<u64>().ok())
                .map(|v| *v)
                .expect("value");
            let (link, parent) = {
                let st = ctx.state_as::<RelayState>().expect("state");
                st.value = value;
                (st.link, st.parent)
            };
            tx.send(value).expect("observe");
            if link < RELAY_LEN {
                ctx.send(
                    ctx.self_id(),
                    Message::spawn(relay_role(tx.clone(), links.clone())),
                )
                .expect("spawn link");
            } else if let Some(parent) = parent {
                ctx.send(parent, Message::user_empty(MSG_DONE))
                    .expect("done");
                ctx.send(ctx.self_id(), Message::go_die()).expect("go die");
            }
        })
        .handler(MSG_DONE, |ctx, _payload| {
            let parent = ctx.state_as::<RelayState>().expect("state").parent;
            if let Some(parent) = parent {
                ctx.send(parent, Message::user_empty(MSG_DONE))
                    .expect("done");
            }
            ctx.send(ctx.self_id(), Message::go_die()).expect("go die");
        })
        .build()
}

#[test]
fn request_reply_across_a_spawned_chain() {
    let (tx, rx) = unbounded::<u64>();
    let links = Arc::new(AtomicUsize::new(0));
    let (system, first) = quiet_config("troupe-relay")
        .build(relay_role(tx, links))
        .expect("TroupeSystem");
    // Each spawned link asks its parent for the running value and gets
    // the incremented reply back.
    assert_eq!(expect_recv(&rx, "the second link's value"), 8);
    assert_eq!(expect_recv(&rx, "the third link's value"), 9);
    // Join only returns once the completion notice has travelled back up
    // and every link has died.
    system.join(first);
    assert!(rx.try_recv().is_err());
}

#[test]
fn godie_drains_the_backlog_first() {
    const BACKLOG: usize = 50;
    let handled = Arc::new(AtomicUsize::new(0));
    let handled2 = handled.clone();
    let role = Role::builder()
        .hello(|_ctx, _payload| ())
        .handler(MSG_PING, move |_ctx, _payload| {
            handled2.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let (system, first) = quiet_config("troupe-drain")
        .build(role)
        .expect("TroupeSystem");
    for _ in 0..BACKLOG {
        system
            .send(first, Message::user_empty(MSG_PING))
            .expect("send");
    }
    system.send(first, Message::go_die()).expect("go die");
    let observer = system.clone();
    system.join(first);
    assert_eq!(
        handled.load(Ordering::SeqCst),
        BACKLOG,
        "every message accepted before the death request must be dispatched"
    );
    assert!(!observer.is_valid(first));
    assert_eq!(
        observer.send(first, Message::user_empty(MSG_PING)),
        Err(TroupeError::UnknownActor(first))
    );
}

#[test]
fn shutdown_closes_the_system() {
    let role = Role::builder().hello(|_ctx, _payload| ()).build();
    let (system, first) = quiet_config("troupe-shutdown")
        .build(role.clone())
        .expect("TroupeSystem");
    let second = system.spawn(role.clone()).expect("spawn");
    // Joining on an id that names no actor must return instead of waiting.
    system.clone().join(ActorId::from_raw(777));
    system.initiate_shutdown();
    assert_eq!(system.spawn(role), Err(TroupeError::SpawnDenied));
    assert_eq!(
        system.send(second, Message::user_empty(MSG_PING)),
        Err(TroupeError::ActorDead(second))
    );
    system.join(first);
}

#[test]
fn concurrent_joins_wait_for_termination() {
    let (entered_tx, entered_rx) = unbounded::<()>();
    let (release_tx, release_rx) = unbounded::<()>();
    let role = Role::builder()
        .hello(|_ctx, _payload| ())
        .handler(MSG_PING, move |_ctx, _payload| {
            entered_tx.send(()).expect("entered");
            release_rx.recv().expect("release");
        })
        .build();
    let (system, first) = quiet_config("troupe-join-race")
        .build(role)
        .expect("TroupeSystem");
    system
        .send(first, Message::user_empty(MSG_PING))
        .expect("send");
    expect_recv(&entered_rx, "the turn to start");
    let (joined_tx, joined_rx) = unbounded::<()>();
    let sys_a = system.clone();
    let joined_a = joined_tx.clone();
    let a = thread::spawn(move || {
        sys_a.join(first);
        joined_a.send(()).expect("report");
    });
    let sys_b = system.clone();
    let b = thread::spawn(move || {
        sys_b.join(first);
        joined_tx.send(()).expect("report");
    });
    // With a turn parked in the handler the troupe is still live, so
    // neither join may return yet, whichever of them holds the handles.
    assert!(
        joined_rx.recv_timeout(SETTLE).is_err(),
        "a join returned while an actor was still running"
    );
    release_tx.send(()).expect("release");
    system.send(first, Message::go_die()).expect("go die");
    expect_recv(&joined_rx, "the first join to return");
    expect_recv(&joined_rx, "the second join to return");
    assert!(
        !system.is_valid(first),
        "the registry must be disposed once the joins returned"
    );
    a.join().expect("join thread");
    b.join().expect("join thread");
}

#[test]
fn panicking_handler_kills_only_its_actor() {
    let boom_role = Role::builder()
        .hello(|_ctx, _payload| ())
        .handler(MSG_BOOM, |_ctx, _payload| {
            panic!("boom");
        })
        .build();
    let latch = Arc::new(CountdownEvent::new(1));
    let latch2 = latch.clone();
    let ping_role = Role::builder()
        .hello(|_ctx, _payload| ())
        .handler(MSG_PING, move |_ctx, _payload| {
            latch2.decrement().expect("Latch should have decremented!");
        })
        .build();
    let (system, boomer) = quiet_config("troupe-panic")
        .build(boom_role)
        .expect("TroupeSystem");
    let pinger = system.spawn(ping_role).expect("spawn");
    system
        .send(boomer, Message::user_empty(MSG_BOOM))
        .expect("send");
    let mut dead = false;
    for _ in 0..500 {
        match system.send(boomer, Message::user_empty(MSG_BOOM)) {
            Err(TroupeError::ActorDead(_)) => {
                dead = true;
                break;
            }
            Ok(()) => thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("unexpected send error: {}", e),
        }
    }
    assert!(dead, "a panicking actor should be marked dead");
    system
        .send(pinger, Message::user_empty(MSG_PING))
        .expect("send");
    wait_zero(&latch);
    system.initiate_shutdown();
    system.join(boomer);
}

#[test]
fn troupe_terminates_once_every_actor_dies() {
    const TROUPE: usize = 24;
    const PINGS: usize = 40;
    let total = Arc::new(AtomicUsize::new(0));
    let total2 = total.clone();
    let role = Role::builder()
        .hello(|_ctx, _payload| ())
        .handler(MSG_PING, move |_ctx, _payload| {
            total2.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let (system, first) = quiet_config("troupe-termination")
        .build(role.clone())
        .expect("TroupeSystem");
    let mut ids = vec![first];
    for _ in 1..TROUPE {
        ids.push(system.spawn(role.clone()).expect("spawn"));
    }
    for id in &ids {
        for _ in 0..PINGS {
            system.send(*id, Message::user_empty(MSG_PING)).expect("send");
        }
    }
    for id in &ids {
        system.send(*id, Message::go_die()).expect("go die");
    }
    let observer = system.clone();
    system.join(first);
    assert_eq!(total.load(Ordering::SeqCst), TROUPE * PINGS);
    // Termination closed the spawn gate on its own.
    assert_eq!(observer.spawn(role), Err(TroupeError::SpawnDenied));
}
