use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use rekon_core::Shutdown;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Watches the terminal for `q` or Ctrl-C and triggers shutdown.
pub struct InputHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl InputHandle {
    pub fn start(shutdown: Shutdown) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = thread::spawn(move || {
            if let Err(e) = enable_raw_mode() {
                warn!("Keypress handling disabled: {e}");
                return;
            }

            while !flag.load(Ordering::Relaxed) {
                match event::poll(POLL_INTERVAL) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        debug!("Stopped reading keys: {e}");
                        break;
                    }
                }

                if let Ok(Event::Key(key_event)) = event::read() {
                    let is_q = key_event.code == KeyCode::Char('q');
                    let is_ctrl_c = key_event.code == KeyCode::Char('c')
                        && key_event.modifiers.contains(KeyModifiers::CONTROL);

                    if (is_q || is_ctrl_c) && key_event.kind == KeyEventKind::Press {
                        warn!("Stopping all scans, please wait");
                        shutdown.trigger();
                        break;
                    }
                }
            }
            let _ = disable_raw_mode();
        });

        Self {
            stop,
            thread: Some(thread),
        }
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for InputHandle {
    fn drop(&mut self) {
        self.halt();
        let _ = disable_raw_mode();
    }
}
