use std::sync::mpsc::{channel, Receiver, Sender};

use parking_lot::Mutex;
use rpa_core::{FinishResult, HostEvent, ScriptFinished, Severity};
use tracing::{error, info, warn};

/// Lifecycle notifications consumed by the host. Every method has a no-op
/// default so hosts implement only what they render.
pub trait EngineHost: Send + Sync {
    fn on_progress(&self, _message: &str, _severity: Severity) {}

    fn on_line_changed(&self, _line: usize) {}

    fn on_finished(&self, _finished: &ScriptFinished) {}
}

/// Headless default: forwards everything to `tracing`.
#[derive(Debug, Default)]
pub struct TracingHost;

impl EngineHost for TracingHost {
    fn on_progress(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(target: "rpa::progress", "{}", message),
            Severity::Warning => warn!(target: "rpa::progress", "{}", message),
            Severity::Error => error!(target: "rpa::progress", "{}", message),
        }
    }

    fn on_finished(&self, finished: &ScriptFinished) {
        match finished.result {
            FinishResult::Error => error!(
                script = %finished.script,
                elapsed_ms = finished.elapsed.as_millis() as u64,
                "script finished with error: {}",
                finished
                    .error
                    .as_ref()
                    .map(|error| error.message.as_str())
                    .unwrap_or("unknown")
            ),
            result => info!(
                script = %finished.script,
                elapsed_ms = finished.elapsed.as_millis() as u64,
                "script finished: {:?}",
                result
            ),
        }
    }
}

/// Queues every notification as a [`HostEvent`] for another thread.
#[derive(Debug)]
pub struct ChannelHost {
    sender: Mutex<Sender<HostEvent>>,
}

impl ChannelHost {
    pub fn new() -> (Self, Receiver<HostEvent>) {
        let (sender, receiver) = channel();
        (
            Self {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }

    fn emit(&self, event: HostEvent) {
        // The receiver going away only means nobody is listening any more.
        let _ = self.sender.lock().send(event);
    }
}

impl EngineHost for ChannelHost {
    fn on_progress(&self, message: &str, severity: Severity) {
        self.emit(HostEvent::Progress {
            message: message.to_string(),
            severity,
        });
    }

    fn on_line_changed(&self, line: usize) {
        self.emit(HostEvent::LineChanged { line });
    }

    fn on_finished(&self, finished: &ScriptFinished) {
        self.emit(HostEvent::Finished {
            finished: Box::new(finished.clone()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[test]
    fn channel_host_queues_events_in_order() {
        let (host, events) = ChannelHost::new();
        host.on_line_changed(3);
        host.on_progress("Running Line 3", Severity::Info);
        host.on_finished(&ScriptFinished {
            script: "main".to_string(),
            result: FinishResult::Successful,
            error: None,
            errors: Vec::new(),
            elapsed: Duration::from_millis(5),
            task_result: "done".to_string(),
            variables: BTreeMap::new(),
            arguments: BTreeMap::new(),
        });

        let received = events.try_iter().collect::<Vec<_>>();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], HostEvent::LineChanged { line: 3 });
        assert!(matches!(
            &received[1],
            HostEvent::Progress { severity: Severity::Info, .. }
        ));
        assert!(matches!(
            &received[2],
            HostEvent::Finished { finished } if finished.task_result == "done"
        ));
    }

    #[test]
    fn channel_host_survives_dropped_receiver() {
        let (host, events) = ChannelHost::new();
        drop(events);
        host.on_line_changed(1);
    }
}
