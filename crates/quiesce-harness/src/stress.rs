//! Concurrent stress driver: N readers, one writer, one reclaimer.
//!
//! Readers bracket every lookup in a read section and hammer a bounded
//! keyspace; the writer toggles random keys, batching each unlinked node
//! for deferred reclamation. All randomness is a per-thread deterministic
//! LCG derived from the run seed, so a run is reproducible bit-for-bit in
//! its operation sequence (thread interleaving aside).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use quiesce_core::{Error, List, NodeBatch, Rcu, Reader, Toggle};

/// Default run seed.
const DEFAULT_SEED: u64 = 0xDEAD_BEEF;

/// How long to wait for the reclaimer to free the final batches after the
/// writer stops. Generous: with no readers left every tick drains a batch.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Configuration for one stress run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StressConfig {
    /// Number of concurrent reader threads.
    pub readers: usize,
    /// Total writer toggle operations.
    pub ops: u64,
    /// Keys are drawn from `[0, keyspace)`.
    pub keyspace: u32,
    /// Unlinked nodes per reclamation callback.
    pub batch: usize,
    /// Seed for the deterministic per-thread RNGs.
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            readers: 15,
            ops: 8_000_000,
            keyspace: 1024,
            batch: 1024,
            seed: DEFAULT_SEED,
        }
    }
}

/// Outcome of one stress run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressReport {
    pub readers: usize,
    pub ops: u64,
    pub inserts: u64,
    pub removes: u64,
    pub lookups: u64,
    pub lookup_hits: u64,
    pub batches: u64,
    pub freed: u64,
    /// Keys still on the list when the run ended.
    pub leftover_keys: u64,
    pub duration_ms: u64,
}

impl StressReport {
    /// Every node the writer unlinked was freed exactly once.
    #[must_use]
    pub fn fully_reclaimed(&self) -> bool {
        self.freed == self.removes
    }

    /// Insertions minus removals must equal what is still on the list.
    #[must_use]
    pub fn balanced(&self) -> bool {
        self.inserts - self.removes == self.leftover_keys
    }
}

/// Deterministic LCG step, one state word per thread.
fn next_u64(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state
}

/// Mix a thread index into the run seed so reader streams diverge.
fn thread_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Run the stress workload to completion and report.
///
/// The writer performs `ops` toggles, flushes its final partial batch,
/// stops the readers, then waits for the reclaimer to free every unlinked
/// node before shutting the controller down.
pub fn run_stress(config: &StressConfig) -> Result<StressReport, Error> {
    let start = Instant::now();
    let mut rcu = Rcu::new();
    let list = List::new();
    rcu.start_background()?;

    let freed = Arc::new(AtomicU64::new(0));
    let stop = AtomicBool::new(false);
    let lookups = AtomicU64::new(0);
    let lookup_hits = AtomicU64::new(0);

    let mut inserts = 0u64;
    let mut removes = 0u64;
    let mut batches = 0u64;

    std::thread::scope(|scope| -> Result<(), Error> {
        let rcu = &rcu;
        let list = &list;
        let stop = &stop;
        let lookups = &lookups;
        let lookup_hits = &lookup_hits;

        for index in 0..config.readers {
            let mut rng = thread_seed(config.seed, index);
            let keyspace = u64::from(config.keyspace);
            scope.spawn(move || {
                let reader = Arc::new(Reader::new());
                rcu.add_reader(&reader).expect("reader registration failed");
                let mut count = 0u64;
                let mut hits = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let key = (next_u64(&mut rng) % keyspace) as u32;
                    reader.lock();
                    if list.lookup(key) {
                        hits += 1;
                    }
                    reader.unlock();
                    count += 1;
                }
                rcu.remove_reader(&reader);
                lookups.fetch_add(count, Ordering::Relaxed);
                lookup_hits.fetch_add(hits, Ordering::Relaxed);
            });
        }

        // The writer runs on the scope's own thread. Readers are released
        // even when an enqueue fails, so the scope always joins.
        let mut writer = || -> Result<(), Error> {
            let mut rng = config.seed;
            let mut batch = NodeBatch::new(Arc::clone(&freed));
            for _ in 0..config.ops {
                let key = (next_u64(&mut rng) % u64::from(config.keyspace)) as u32;
                match list.toggle(key) {
                    Toggle::Inserted => inserts += 1,
                    Toggle::Removed(node) => {
                        removes += 1;
                        batch.push(node);
                        if batch.len() >= config.batch {
                            let full =
                                std::mem::replace(&mut batch, NodeBatch::new(Arc::clone(&freed)));
                            full.enqueue(rcu)?;
                            batches += 1;
                        }
                    }
                }
            }
            if !batch.is_empty() {
                batch.enqueue(rcu)?;
                batches += 1;
            }
            Ok(())
        };
        let outcome = writer();
        stop.store(true, Ordering::Relaxed);
        outcome
    })?;

    // Readers have deregistered; every pending batch must now drain.
    let drain_start = Instant::now();
    while freed.load(Ordering::Relaxed) < removes && drain_start.elapsed() < DRAIN_DEADLINE {
        std::thread::sleep(Duration::from_millis(1));
    }
    rcu.stop_background();

    Ok(StressReport {
        readers: config.readers,
        ops: config.ops,
        inserts,
        removes,
        lookups: lookups.load(Ordering::Relaxed),
        lookup_hits: lookup_hits.load(Ordering::Relaxed),
        batches,
        freed: freed.load(Ordering::Relaxed),
        leftover_keys: list.keys().len() as u64,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
