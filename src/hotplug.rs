//! Port hot-plug detection
//!
//! A [`PortWatcher`] periodically asks a [`PortScanner`] which ports exist
//! and reports the difference from the previous scan as [`PortEvent`]s on a
//! channel. The consumer applies them to its registries, usually through
//! [`MasterBus::handle_event`](crate::master_bus::MasterBus::handle_event).

use crate::midi::PortIdentity;
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info};
use std::collections::BTreeSet;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    /// A port went away
    Exit(PortIdentity),
    /// A port appeared, or reappeared
    Start(PortIdentity),
}

/// Source of the set of ports currently present.
pub trait PortScanner: Send + 'static {
    fn scan(&mut self) -> Vec<PortIdentity>;
}

/// Events turning `previous` into `current`: exits first, then starts, each
/// in identity order.
pub fn diff_ports(
    previous: &BTreeSet<PortIdentity>,
    current: &BTreeSet<PortIdentity>,
) -> Vec<PortEvent> {
    previous
        .difference(current)
        .map(|id| PortEvent::Exit(*id))
        .chain(current.difference(previous).map(|id| PortEvent::Start(*id)))
        .collect()
}

pub struct PortWatcher {
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PortWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop_tx: None,
            thread_handle: None,
        }
    }

    /// Starts scanning in a background thread. Ports present at the first
    /// scan are taken as known and produce no events.
    ///
    /// Calling `start` on a running watcher returns a receiver that never
    /// yields.
    pub fn start<S: PortScanner>(&mut self, mut scanner: S) -> Receiver<PortEvent> {
        let (event_tx, event_rx) = unbounded();
        if self.thread_handle.is_some() {
            return event_rx; // Already running
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let interval = self.interval;
        self.stop_tx = Some(stop_tx);
        self.thread_handle = Some(thread::spawn(move || {
            info!("port watcher started, scanning every {:?}", interval);
            let mut known: BTreeSet<PortIdentity> = scanner.scan().into_iter().collect();
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }

                let current: BTreeSet<PortIdentity> = scanner.scan().into_iter().collect();
                for event in diff_ports(&known, &current) {
                    debug!("port event {:?}", event);
                    if event_tx.send(event).is_err() {
                        info!("port event receiver dropped, stopping watcher");
                        return;
                    }
                }
                known = current;
            }
            info!("port watcher stopped");
        }));
        event_rx
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    pub fn stop(&mut self) {
        // Dropping the sender wakes the thread
        self.stop_tx.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PortWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::PortDirection;

    fn out(client: i32, port: i32) -> PortIdentity {
        PortIdentity::new(client, port, PortDirection::Output)
    }

    #[test]
    fn test_diff_reports_exits_before_starts() {
        let previous: BTreeSet<_> = [out(20, 0), out(24, 0)].into_iter().collect();
        let current: BTreeSet<_> = [out(24, 0), out(28, 0)].into_iter().collect();
        assert_eq!(
            diff_ports(&previous, &current),
            vec![PortEvent::Exit(out(20, 0)), PortEvent::Start(out(28, 0))]
        );
    }

    #[test]
    fn test_diff_of_equal_sets_is_empty() {
        let ports: BTreeSet<_> = [out(20, 0)].into_iter().collect();
        assert!(diff_ports(&ports, &ports).is_empty());
    }
}
