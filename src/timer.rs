use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Tick,
}

/// Delivers one `TimerEvent::Tick` per interval until stopped. Stopping
/// wakes the thread immediately, and dropping the ticker stops it, so a
/// torn-down attempt never sees another tick.
pub struct Ticker {
    cancel: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<T>(interval: Duration, tx: mpsc::Sender<T>) -> Self
    where
        T: From<TimerEvent> + Send + 'static,
    {
        let (cancel, cancelled) = mpsc::channel::<()>();

        let handle = thread::spawn(move || loop {
            match cancelled.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if tx.send(T::from(TimerEvent::Tick)).is_err() {
                        break;
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel and ends the wait.
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
