use super::state::EngineCore;
use super::Message;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Run the engine loop until shutdown
///
/// Messages are handled strictly in arrival order; due timers run after the
/// message that woke the loop.
pub(crate) fn run(core: Arc<Mutex<EngineCore>>, rx: Receiver<Message>) {
    info!("Playback engine loop started");

    loop {
        let deadline = core.lock().timers.next_deadline();
        let message = match deadline {
            Some(deadline) => match rx.recv_deadline(deadline) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            },
        };

        let mut state = core.lock();
        match message {
            Some(Message::Command(command)) => command(&mut state),
            Some(Message::Player { id, signal }) => {
                debug!("Player signal {:?} from handle {}", signal, id);
                state.on_player_signal(id, signal);
            }
            Some(Message::Focus(change)) => state.on_focus_change(change),
            Some(Message::Shutdown) => {
                state.shutdown();
                break;
            }
            None => {}
        }

        for kind in state.timers.take_due(Instant::now()) {
            debug!("Timer {:?} fired", kind);
            state.on_timer(kind);
        }
    }

    info!("Playback engine loop exited");
}
