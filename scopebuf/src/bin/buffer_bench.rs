//! Cached buffer throughput and round-trip benchmark.
//!
//! Usage:
//!     cargo run --release --bin buffer_bench
//!
//! Environment variables:
//!     PRODUCERS=2       Producer threads for the throughput run (default: 2)
//!     CONSUMERS=2       Consumer threads for the throughput run (default: 2)
//!     CAPACITY=1024     Buffer capacity (default: 1024)
//!     ITERATIONS=1000000  Items per producer (default: 1_000_000)
//!     PRODUCER_CPU=0    Pin the round-trip initiator to CPU 0 (default: 0)
//!     CONSUMER_CPU=2    Pin the round-trip responder to CPU 2 (default: 2)

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use minstant::Instant;
use scopebuf::{CachedChannel, Timeout};

type Payload = u64;

/// Consumers give up after this long without data once producers finished.
const IDLE_TIMEOUT: Duration = Duration::from_millis(100);

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    let producer_cpu = env::var("PRODUCER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(0));
    let consumer_cpu = env::var("CONSUMER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(2));
    (producer_cpu, consumer_cpu)
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

/// Blocking producers, blocking consumers: nothing should be dropped.
fn bench_throughput(producers: usize, consumers: usize, capacity: usize, iterations: u64) {
    let buffer = Arc::new(CachedChannel::<Payload>::new(capacity, true));
    let done = Arc::new(AtomicBool::new(false));
    let received = Arc::new(AtomicU64::new(0));

    let start = Instant::now();

    let consumer_handles: Vec<_> = (0..consumers)
        .map(|_| {
            let buffer = Arc::clone(&buffer);
            let done = Arc::clone(&done);
            let received = Arc::clone(&received);
            thread::spawn(move || {
                let mut local = 0u64;
                loop {
                    match buffer.get_blocking(Timeout::Duration(IDLE_TIMEOUT), false) {
                        Ok(_) => local += 1,
                        Err(_) if done.load(Ordering::Acquire) => break,
                        Err(_) => {}
                    }
                }
                // The timeout that ended the loop may predate the last puts.
                local += buffer.drain().len() as u64;
                received.fetch_add(local, Ordering::Relaxed);
            })
        })
        .collect();

    let producer_handles: Vec<_> = (0..producers)
        .map(|_| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..iterations {
                    if buffer.put_blocking(i, Timeout::Infinite).is_err() {
                        panic!("infinite put returned early");
                    }
                }
            })
        })
        .collect();

    for handle in producer_handles {
        handle.join().unwrap();
    }
    done.store(true, Ordering::Release);
    for handle in consumer_handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let total = received.load(Ordering::Relaxed);
    assert_eq!(total, iterations * producers as u64, "items lost");
    assert_eq!(buffer.dropped(), 0);

    let ops_per_ms = u128::from(total) * 1_000_000 / elapsed.as_nanos().max(1);
    println!(
        "{producers}P/{consumers}C: {} ops/ms (wall time includes {}ms idle timeout)",
        ops_per_ms,
        IDLE_TIMEOUT.as_millis()
    );
}

/// Non-blocking producer against a polling consumer: measures drop rate.
fn bench_poll(capacity: usize, iterations: u64) {
    let buffer = Arc::new(CachedChannel::<Payload>::new(capacity, true));
    let done = Arc::new(AtomicBool::new(false));

    let poller = {
        let buffer = Arc::clone(&buffer);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut ticks = 0u64;
            while !done.load(Ordering::Acquire) {
                let _ = buffer.poll();
                ticks += 1;
                thread::sleep(Duration::from_micros(100));
            }
            ticks
        })
    };

    for i in 0..iterations {
        buffer.try_put(i);
    }
    done.store(true, Ordering::Release);
    let ticks = poller.join().unwrap();

    println!(
        "poll: {} puts, {} dropped, {} ticks, last cached {}",
        iterations,
        buffer.dropped(),
        ticks,
        buffer.cached()
    );
}

fn bench_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>, iterations: u64) {
    let forward = Arc::new(CachedChannel::<Payload>::new(1, false));
    let back = Arc::new(CachedChannel::<Payload>::new(1, false));

    let ready = Arc::new(AtomicBool::new(false));

    let responder = {
        let forward = Arc::clone(&forward);
        let back = Arc::clone(&back);
        let ready = Arc::clone(&ready);
        thread::spawn(move || {
            pin_to_cpu(consumer_cpu);
            ready.store(true, Ordering::Release);

            for _ in 0..iterations {
                let Ok(value) = forward.get_blocking(Timeout::Infinite, false) else {
                    panic!("infinite get returned early");
                };
                back.try_put(value);
            }
        })
    };

    while !ready.load(Ordering::Acquire) {
        std::hint::spin_loop();
    }
    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    for i in 0..iterations {
        forward.try_put(i);
        let echoed = back.get_blocking(Timeout::Infinite, false);
        assert_eq!(echoed, Ok(i));
    }
    let elapsed = start.elapsed();
    responder.join().unwrap();

    let rtt_ns = elapsed.as_nanos() / u128::from(iterations.max(1));
    println!("{rtt_ns} ns RTT");
}

fn main() {
    scopebuf::init_tracing();

    let producers = env_or("PRODUCERS", 2usize);
    let consumers = env_or("CONSUMERS", 2usize);
    let capacity = env_or("CAPACITY", 1024usize);
    let iterations = env_or("ITERATIONS", 1_000_000u64);
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();

    println!("scopebuf CachedChannel (capacity={capacity}, iters={iterations}):");
    bench_throughput(producers, consumers, capacity, iterations);
    bench_poll(capacity, iterations);
    bench_rtt(producer_cpu, consumer_cpu, iterations.min(100_000));
}
