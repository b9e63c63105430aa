use super::*;

/// A configuration builder for a troupe system
///
/// # Example
///
/// Set a custom label and start a system without the interrupt listener:
///
/// ```
/// use troupe::prelude::*;
///
/// let role = Role::builder()
///     .hello(|ctx, _payload| {
///         ctx.send(ctx.self_id(), Message::go_die()).expect("send");
///     })
///     .build();
///
/// let mut conf = TroupeConfig::new();
/// conf.label("my-troupe").handle_interrupt(false);
/// let (system, first) = conf.build(role).expect("TroupeSystem");
/// system.join(first);
/// ```
#[derive(Clone)]
pub struct TroupeConfig {
    pub(crate) label: String,
    pub(crate) root_logger: Option<TroupeLogger>,
    pub(crate) handle_interrupt: bool,
}

impl TroupeConfig {
    /// Creates a minimal config with default values
    pub fn new() -> TroupeConfig {
        TroupeConfig {
            label: default_runtime_label(),
            root_logger: None,
            handle_interrupt: true,
        }
    }

    /// Sets the name of the system to be created
    ///
    /// The label appears on every log line of the system's runtime threads.
    pub fn label<I>(&mut self, s: I) -> &mut Self
    where
        I: Into<String>,
    {
        self.label = s.into();
        self
    }

    /// Sets whether the system reacts to interrupt signals
    ///
    /// On by default. The system then dedicates a thread to waiting for
    /// `SIGINT` and answers the first signal by initiating an orderly
    /// shutdown, exactly as [initiate_shutdown](TroupeSystem::initiate_shutdown)
    /// does. To make that reliable the signal is blocked on the thread
    /// calling [build](TroupeConfig::build) and every thread it spawns
    /// afterwards, and it stays blocked after the system has terminated.
    ///
    /// Turn this off for embedded use, or when several systems share the
    /// process and something else owns signal handling.
    pub fn handle_interrupt(&mut self, handle: bool) -> &mut Self {
        self.handle_interrupt = handle;
        self
    }

    /// Sets the root logger for the system to be created
    ///
    /// When none is supplied, an asynchronous terminal logger is created
    /// instead.
    pub fn logger(&mut self, logger: TroupeLogger) -> &mut Self {
        self.root_logger = Some(logger);
        self
    }

    /// Finishes the config and starts a troupe system from it
    ///
    /// The first actor is spawned with the given role and greeted with a
    /// hello message carrying no parent, before any other actor exists.
    /// Returns the system together with the first actor's id.
    pub fn build(self, first_role: Arc<Role>) -> Result<(TroupeSystem, ActorId), TroupeError> {
        TroupeSystem::try_new(self, first_role)
    }
}

impl Default for TroupeConfig {
    fn default() -> Self {
        TroupeConfig::new()
    }
}
