//! Server Metrics
//!
//! Per-command success counters, an error counter and connection gauges,
//! all behind one `Mutex` so [`Metrics::snapshot`] is never torn.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Counters {
    commands: BTreeMap<String, u64>,
    errors: u64,
    active_clients: u64,
    connections_accepted: u64,
}

/// Shared metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<Counters>,
}

/// An owned copy of the counters at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Successful executions per upper-cased command name
    pub commands: BTreeMap<String, u64>,
    pub errors: u64,
    pub active_clients: u64,
    pub connections_accepted: u64,
}

impl MetricsSnapshot {
    /// Sum of all successful commands (errors excluded).
    pub fn total_commands(&self) -> u64 {
        self.commands.values().sum()
    }

    /// Count for one command name, case-insensitive.
    pub fn command(&self, name: &str) -> u64 {
        self.commands
            .get(&name.to_ascii_uppercase())
            .copied()
            .unwrap_or(0)
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts one successful execution of `command`.
    pub fn increment(&self, command: &str) {
        let name = command.to_ascii_uppercase();
        *self.lock().commands.entry(name).or_insert(0) += 1;
    }

    /// Counts one failed command. This is the only path into the error counter.
    pub fn increment_error(&self) {
        self.lock().errors += 1;
    }

    pub fn client_connected(&self) {
        let mut counters = self.lock();
        counters.active_clients += 1;
        counters.connections_accepted += 1;
    }

    pub fn client_disconnected(&self) {
        let mut counters = self.lock();
        counters.active_clients = counters.active_clients.saturating_sub(1);
    }

    /// Copies every counter under a single lock acquisition.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.lock();
        MetricsSnapshot {
            commands: counters.commands.clone(),
            errors: counters.errors,
            active_clients: counters.active_clients,
            connections_accepted: counters.connections_accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_increment_is_case_insensitive() {
        let metrics = Metrics::new();
        metrics.increment("get");
        metrics.increment("GET");
        metrics.increment("Set");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.command("GET"), 2);
        assert_eq!(snapshot.command("set"), 1);
        assert_eq!(snapshot.total_commands(), 3);
    }

    #[test]
    fn test_errors_excluded_from_total() {
        let metrics = Metrics::new();
        metrics.increment("PING");
        metrics.increment_error();
        metrics.increment_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.errors, 2);
        assert_eq!(snapshot.total_commands(), 1);
        assert!(!snapshot.commands.contains_key("ERROR"));
    }

    #[test]
    fn test_client_gauge() {
        let metrics = Metrics::new();
        metrics.client_connected();
        metrics.client_connected();
        metrics.client_disconnected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_clients, 1);
        assert_eq!(snapshot.connections_accepted, 2);

        metrics.client_disconnected();
        metrics.client_disconnected();
        assert_eq!(metrics.snapshot().active_clients, 0);
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.increment("SET");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().command("SET"), 8000);
    }
}
