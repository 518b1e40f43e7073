use midibusrs::midi::{MockPort, PortDirection, PortIdentity};
use midibusrs::{MasterBus, PortEvent, PortHandle, PortScanner, PortSettings, PortWatcher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn out(client: i32, port: i32) -> PortIdentity {
    PortIdentity::new(client, port, PortDirection::Output)
}

/// Returns each scripted scan in turn, then repeats the last one.
struct ScriptedScanner {
    scans: Vec<Vec<PortIdentity>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedScanner {
    fn new(scans: Vec<Vec<PortIdentity>>) -> Self {
        Self {
            scans,
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

impl PortScanner for ScriptedScanner {
    fn scan(&mut self) -> Vec<PortIdentity> {
        let mut calls = self.calls.lock().unwrap();
        let index = (*calls).min(self.scans.len() - 1);
        *calls += 1;
        self.scans[index].clone()
    }
}

#[test]
fn test_watcher_reports_changes_after_baseline() {
    let scanner = ScriptedScanner::new(vec![
        vec![out(20, 0), out(24, 0)],
        vec![out(24, 0)],
        vec![out(24, 0), out(20, 0)],
    ]);
    let mut watcher = PortWatcher::new(Duration::from_millis(10));
    let events = watcher.start(scanner);
    assert!(watcher.is_running());

    assert_eq!(events.recv_timeout(WAIT).unwrap(), PortEvent::Exit(out(20, 0)));
    assert_eq!(events.recv_timeout(WAIT).unwrap(), PortEvent::Start(out(20, 0)));

    watcher.stop();
    assert!(!watcher.is_running());
    assert!(events.recv_timeout(WAIT).is_err());
}

#[test]
fn test_watcher_without_changes_is_quiet() {
    let scanner = ScriptedScanner::new(vec![vec![out(20, 0)]]);
    let calls = Arc::clone(&scanner.calls);
    let mut watcher = PortWatcher::new(Duration::from_millis(5));
    let events = watcher.start(scanner);

    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
    watcher.stop();
    assert!(*calls.lock().unwrap() > 1);
}

#[test]
fn test_watcher_events_drive_master_bus() {
    let _ = env_logger::builder().is_test(true).try_init();
    let master = MasterBus::new(PortSettings::default());
    master
        .add_port(Box::new(MockPort::output(20, 0, "synth")))
        .unwrap();
    master.initialize();

    let scanner = ScriptedScanner::new(vec![vec![out(20, 0)], vec![], vec![out(20, 0)]]);
    let mut watcher = PortWatcher::new(Duration::from_millis(10));
    let events = watcher.start(scanner);

    let exit = events.recv_timeout(WAIT).unwrap();
    master.handle_event(exit, |_| None);
    assert!(!master.outputs().is_active(0));

    let start = events.recv_timeout(WAIT).unwrap();
    let bus = master.handle_event(start, |identity| {
        let port = MockPort::output(identity.client, identity.port, "synth");
        Some(Box::new(port) as Box<dyn PortHandle>)
    });
    watcher.stop();

    assert_eq!(bus, Some(0));
    assert_eq!(master.outputs().len(), 1);
    assert!(master.outputs().is_active(0));
}
