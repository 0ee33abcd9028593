//! Shared control state between the control loop and external inputs.
//!
//! Remote command sources, the stop button and the snapshot trigger all write
//! here from their own threads; the control loop reads and clears. Every field
//! sits behind one mutex and each accessor holds it for a single read or
//! write only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct ChannelState {
    interactive: bool,
    command: String,
    stop: bool,
    snapshot: bool,
    motion_detection: bool,
}

/// Cloneable handle; clones share state.
#[derive(Clone, Debug)]
pub struct CommandChannel {
    state: Arc<Mutex<ChannelState>>,
    shutdown: Arc<AtomicBool>,
}

impl CommandChannel {
    pub fn new(motion_detection: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState {
                motion_detection,
                ..ChannelState::default()
            })),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_interactive(&self, active: bool) {
        self.lock().interactive = active;
    }

    pub fn is_interactive(&self) -> bool {
        self.lock().interactive
    }

    /// Queue a command line and assert interactive mode. A command not yet
    /// consumed is replaced.
    pub fn submit(&self, command: &str) {
        let mut state = self.lock();
        state.interactive = true;
        state.command = command.to_string();
    }

    /// Take the pending command line, leaving the inbox empty.
    pub fn take_command(&self) -> Option<String> {
        let command = std::mem::take(&mut self.lock().command);
        if command.trim().is_empty() {
            None
        } else {
            Some(command)
        }
    }

    pub fn request_stop(&self) {
        self.lock().stop = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().stop
    }

    /// Clear the stop signal; returns whether it was set.
    pub fn take_stop(&self) -> bool {
        std::mem::take(&mut self.lock().stop)
    }

    pub fn request_snapshot(&self) {
        self.lock().snapshot = true;
    }

    pub fn snapshot_requested(&self) -> bool {
        self.lock().snapshot
    }

    pub fn clear_snapshot(&self) {
        self.lock().snapshot = false;
    }

    pub fn set_motion_detection(&self, enabled: bool) {
        self.lock().motion_detection = enabled;
    }

    pub fn motion_detection_enabled(&self) -> bool {
        self.lock().motion_detection
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new(true)
    }
}
