//! Troupe is a lightweight actor runtime: a fixed pool of worker threads
//! drives user-defined actors, each with a private mailbox, private state,
//! and a table of message handlers indexed by message type.
//!
//! Actors communicate exclusively by asynchronous message passing. Mailboxes
//! are bounded, so a sender to a full mailbox blocks until the receiver has
//! drained some of its backlog. The runtime detects on its own when every
//! actor has finished (requested its own death and drained its mailbox) and
//! stops the worker pool, which is what [join](TroupeSystem::join) waits for.
//! An interrupt signal triggers the same orderly drain.
//!
//! To get all troupe related things into scope import `use troupe::prelude::*;`
//! instead of `use troupe::*;`.
//!
//! # Example
//!
//! ```
//! use troupe::prelude::*;
//! use std::sync::Arc;
//! use synchronoise::CountdownEvent;
//!
//! const MSG_GREET: usize = 1;
//!
//! let latch = Arc::new(CountdownEvent::new(1));
//! let latch2 = latch.clone();
//! let role = Role::builder()
//!     .hello(|_ctx, _payload| ())
//!     .handler(MSG_GREET, move |ctx, payload| {
//!         if let Some(name) = payload.and_then(|p| p.downcast::<String>().ok()) {
//!             info!(ctx.log(), "Hello, {}!", name);
//!         }
//!         latch2.decrement().expect("count down");
//!         ctx.send(ctx.self_id(), Message::go_die()).expect("send");
//!     })
//!     .build();
//!
//! let mut conf = TroupeConfig::new();
//! conf.handle_interrupt(false);
//! let (system, first) = conf.build(role).expect("TroupeSystem");
//! system
//!     .send(first, Message::user(MSG_GREET, String::from("world")))
//!     .expect("send");
//! latch.wait();
//! system.join(first);
//! ```

use self::{actors::*, messaging::*, runtime::*};
use slog::{debug, error, info, o, trace, warn, Drain, Fuse, Logger};
use slog_async::Async;

mod actors;
mod messaging;
mod runtime;

/// To get all troupe related things into scope import `use troupe::prelude::*`.
pub mod prelude {
    pub use slog::{crit, debug, error, info, o, trace, warn, Drain, Fuse, Logger};

    pub use std::any::Any;

    pub use crate::{
        actors::{ActorContext, ActorId, Role, RoleBuilder, StateBox},
        messaging::{Message, MsgKind, Payload},
        runtime::{
            TroupeConfig,
            TroupeError,
            TroupeSystem,
            CAST_LIMIT,
            MAILBOX_CAPACITY,
            POOL_SIZE,
        },
    };

    pub use crate::TroupeLogger;
}

/// The logger type used throughout a troupe system
pub type TroupeLogger = Logger<std::sync::Arc<Fuse<Async>>>;
