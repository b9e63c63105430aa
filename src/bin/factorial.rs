use std::sync::Arc;
use troupe::prelude::*;

const MSG_INIT_REQUEST: usize = 1;
const MSG_INIT: usize = 2;
const MSG_FINISH: usize = 3;

/// Carries a partial product down the spawn chain
#[derive(Clone, Copy, Debug)]
struct Init {
    n: u64,
    fact: u64,
    target: u64,
}

struct FactState {
    parent: Option<ActorId>,
    n: u64,
    fact: u64,
    target: u64,
}

fn on_hello(ctx: &mut ActorContext, payload: Option<Payload>) {
    let parent = payload
        .and_then(|p| p.downcast::<ActorId>().ok())
        .map(|id| *id);
    ctx.set_state(FactState {
        parent,
        n: 0,
        fact: 1,
        target: 0,
    });
    // Spawned links ask their parent for the partial product, the first
    // actor instead waits for the embedder to send it.
    if let Some(parent) = parent {
        ctx.send(parent, Message::user(MSG_INIT_REQUEST, ctx.self_id()))
            .expect("init request");
    }
}

fn on_init_request(ctx: &mut ActorContext, payload: Option<Payload>) {
    let requester = payload
        .and_then(|p| p.downcast::<ActorId>().ok())
        .map(|id| *id)
        .expect("requester id");
    let st = ctx.state_as::<FactState>().expect("state");
    let next = Init {
        n: st.n + 1,
        fact: st.fact * (st.n + 1),
        target: st.target,
    };
    ctx.send(requester, Message::user(MSG_INIT, next))
        .expect("init");
}

fn on_init(ctx: &mut ActorContext, payload: Option<Payload>) {
    let init = payload
        .and_then(|p| p.downcast::<Init>().ok())
        .expect("init data");
    let st = ctx.state_as::<FactState>().expect("state");
    st.n = init.n;
    st.fact = init.fact;
    st.target = init.target;
    if init.n == init.target {
        println!("{}! = {}", init.target, init.fact);
        ctx.send(ctx.self_id(), Message::user_empty(MSG_FINISH))
            .expect("finish");
    } else {
        let role = fact_role();
        ctx.send(ctx.self_id(), Message::spawn(role)).expect("spawn");
    }
}

fn on_finish(ctx: &mut ActorContext, _payload: Option<Payload>) {
    let parent = ctx.state_as::<FactState>().expect("state").parent;
    if let Some(parent) = parent {
        ctx.send(parent, Message::user_empty(MSG_FINISH))
            .expect("finish");
    }
    ctx.send(ctx.self_id(), Message::go_die()).expect("go die");
}

fn fact_role() -> Arc<Role> {
    Role::builder()
        .hello(on_hello)
        .handler(MSG_INIT_REQUEST, on_init_request)
        .handler(MSG_INIT, on_init)
        .handler(MSG_FINISH, on_finish)
        .build()
}

fn main() {
    let target: u64 = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(10);
    if target > 20 {
        eprintln!("{}! does not fit into 64 bits", target);
        std::process::exit(1);
    }
    let mut conf = TroupeConfig::new();
    conf.label("factorial");
    let (system, first) = conf.build(fact_role()).expect("TroupeSystem");
    system
        .send(
            first,
            Message::user(
                MSG_INIT,
                Init {
                    n: 0,
                    fact: 1,
                    target,
                },
            ),
        )
        .expect("send");
    system.join(first);
}
