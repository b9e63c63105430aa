use super::*;

use std::{
    os::unix::thread::JoinHandleExt,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    thread::JoinHandle,
};

/// Blocks `SIGINT` for the calling thread and every thread it spawns later
///
/// Must run before the runtime threads start, so that they inherit the
/// mask and the interrupt listener becomes the only thread the signal
/// can reach.
pub(crate) fn block_interrupt_signal() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        if libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) != 0 {
            invariant_violated("SIGINT could not be blocked");
        }
    }
}

/// A dedicated thread waiting for `SIGINT`
///
/// With the signal blocked on all other threads, `sigwait` here is its
/// only consumer, no asynchronous handler is ever installed. Every
/// delivery initiates an orderly system shutdown, which is idempotent,
/// so repeated interrupts are harmless.
pub(crate) struct InterruptListener {
    stop: Arc<AtomicBool>,
    pthread: libc::pthread_t,
    thread: JoinHandle<()>,
}

impl InterruptListener {
    pub(crate) fn start(system: TroupeSystem) -> Result<InterruptListener, TroupeError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let logger = system.logger().new(o!("thread" => "interrupt"));
        let thread = thread::Builder::new()
            .name("troupe-interrupt".to_string())
            .spawn(move || loop {
                wait_for_interrupt();
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                info!(logger, "Received an interrupt, shutting down");
                system.initiate_shutdown();
            })
            .map_err(|e| TroupeError::ThreadSpawn(e.to_string()))?;
        let pthread = thread.as_pthread_t();
        Ok(InterruptListener {
            stop,
            pthread,
            thread,
        })
    }

    /// Retires the listener after the system has terminated
    ///
    /// One last `SIGINT` is aimed directly at the listener thread to
    /// shake it out of `sigwait`, where it then observes the stop flag.
    pub(crate) fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        unsafe {
            libc::pthread_kill(self.pthread, libc::SIGINT);
        }
        let _ = self.thread.join();
    }
}

fn wait_for_interrupt() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        let mut sig: libc::c_int = 0;
        if libc::sigwait(&set, &mut sig) != 0 {
            invariant_violated("sigwait rejected a fixed signal set");
        }
    }
}
