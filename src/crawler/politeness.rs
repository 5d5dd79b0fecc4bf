use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Per-host fetch spacing. Each host owns a mutex and a last-access
/// stamp; a worker about to fetch acquires the host's mutex, sleeps out
/// whatever remains of the configured delay, stamps the clock, and
/// releases. Successive fetches to one host are therefore serialized and
/// spaced at least `delay` apart, while different hosts proceed in
/// parallel.
pub struct Politeness {
    delay: Duration,
    hosts: Mutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>,
}

impl Politeness {
    pub fn new(delay: Duration) -> Self {
        Politeness {
            delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Block until this host may be fetched again.
    pub fn wait(&self, host: &str) {
        let slot = {
            let mut hosts = self.hosts.lock().expect("politeness lock poisoned");
            hosts.entry(host.to_string()).or_default().clone()
        };

        let mut last_access = slot.lock().expect("host lock poisoned");
        if let Some(previous) = *last_access {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                thread::sleep(self.delay - elapsed);
            }
        }
        *last_access = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_host_fetches_are_spaced() {
        let delay = Duration::from_millis(60);
        let politeness = Arc::new(Politeness::new(delay));

        let mut stamps = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..2 {
            let politeness = politeness.clone();
            handles.push(thread::spawn(move || {
                politeness.wait("ics.uci.edu");
                Instant::now()
            }));
        }
        for handle in handles {
            stamps.push(handle.join().unwrap());
        }

        let gap = stamps[1].max(stamps[0]).duration_since(stamps[1].min(stamps[0]));
        // Small tolerance: the stamps are taken just after the slot updates.
        assert!(
            gap >= delay - Duration::from_millis(5),
            "same-host spacing was only {gap:?}"
        );
    }

    #[test]
    fn test_different_hosts_proceed_concurrently() {
        let delay = Duration::from_millis(200);
        let politeness = Arc::new(Politeness::new(delay));

        // Prime both hosts so a second wait would have to sleep.
        politeness.wait("ics.uci.edu");
        politeness.wait("cs.uci.edu");

        let start = Instant::now();
        let a = {
            let politeness = politeness.clone();
            thread::spawn(move || politeness.wait("ics.uci.edu"))
        };
        let b = {
            let politeness = politeness.clone();
            thread::spawn(move || politeness.wait("cs.uci.edu"))
        };
        a.join().unwrap();
        b.join().unwrap();

        // Both sleeps overlap; total wall time stays near one delay, not two.
        let elapsed = start.elapsed();
        assert!(
            elapsed < delay * 2,
            "host waits did not overlap: {elapsed:?}"
        );
    }

    #[test]
    fn test_first_fetch_does_not_wait() {
        let politeness = Politeness::new(Duration::from_secs(5));
        let start = Instant::now();
        politeness.wait("stat.uci.edu");
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
