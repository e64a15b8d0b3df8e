fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use flumen_core::queue::{spsc_ring, QueueError};
    use serde::Serialize;
    use std::path::PathBuf;
    use std::time::Instant;

    #[derive(Debug)]
    struct Args {
        capacity_kib: usize,
        payload: usize,
        slots: usize,
        iterations: usize,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize)]
    struct RunResult {
        iteration: usize,
        elapsed_ms: f64,
        throughput_mib_s: f64,
        slots_per_s: f64,
        producer_full_waits: u64,
        consumer_empty_waits: u64,
    }

    #[derive(Debug, Clone, Serialize)]
    struct Summary {
        capacity_bytes: usize,
        payload_bytes: usize,
        slots: usize,
        iterations: usize,
        p50_throughput_mib_s: f64,
        p95_throughput_mib_s: f64,
        avg_throughput_mib_s: f64,
        runs: Vec<RunResult>,
    }

    fn parse_args() -> Result<Args, String> {
        let mut capacity_kib: usize = 1024;
        let mut payload: usize = 1024;
        let mut slots: usize = 500_000;
        let mut iterations: usize = 3;
        let mut output: Option<PathBuf> = None;

        let mut it = std::env::args().skip(1).peekable();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--capacity-kib" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --capacity-kib".into());
                    };
                    capacity_kib = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --capacity-kib".to_string())?
                        .max(1);
                }
                "--payload" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --payload".into());
                    };
                    payload = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --payload".to_string())?;
                }
                "--slots" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --slots".into());
                    };
                    slots = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --slots".to_string())?
                        .max(1);
                }
                "--iterations" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --iterations".into());
                    };
                    iterations = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --iterations".to_string())?
                        .clamp(1, 10);
                }
                "--output" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --output".into());
                    };
                    output = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p flumen-core --release --bin benchmark -- \\
  [--capacity-kib <n>] [--payload <bytes>] [--slots <n>] [--iterations <n>] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        Ok(Args {
            capacity_kib,
            payload,
            slots,
            iterations,
            output,
        })
    }

    fn percentile(values: &[f64], p: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        if sorted.len() == 1 {
            return sorted[0];
        }
        let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    let args = parse_args()?;
    let capacity = args.capacity_kib * 1024;

    // A payload the ring can never admit would strand the consumer loop on
    // Empty, so refuse it before any thread is spawned.
    {
        let (mut tx, _rx) = spsc_ring(capacity);
        let ring_capacity = tx.capacity();
        if let Err(e) = tx.acquire(args.payload) {
            return Err(format!(
                "--payload {} does not fit a {ring_capacity}-byte ring: {e}",
                args.payload
            ));
        };
    }

    println!(
        "Running flumen queue benchmark: capacity={}KiB payload={}B slots={} (iterations={})",
        args.capacity_kib, args.payload, args.slots, args.iterations
    );

    let mut runs = Vec::new();
    for iteration in 1..=args.iterations {
        let (mut tx, mut rx) = spsc_ring(capacity);
        let payload = args.payload;
        let slots = args.slots;

        let started = Instant::now();
        let producer = std::thread::spawn(move || -> Result<u64, String> {
            let mut full_waits: u64 = 0;
            for n in 0..slots {
                loop {
                    match tx.acquire(payload) {
                        Ok(mut slot) => {
                            if let Some(first) = slot.first_mut() {
                                *first = n as u8;
                            }
                            slot.commit();
                            break;
                        }
                        Err(QueueError::Full) => {
                            full_waits += 1;
                            std::thread::yield_now();
                        }
                        Err(e) => return Err(format!("producer failed on slot {n}: {e}")),
                    }
                }
            }
            Ok(full_waits)
        });

        let mut empty_waits: u64 = 0;
        let mut received = 0usize;
        while received < args.slots {
            match rx.acquire() {
                Ok(slot) => {
                    if slot.len() != args.payload {
                        return Err(format!(
                            "slot {received}: expected {} bytes, got {}",
                            args.payload,
                            slot.len()
                        ));
                    }
                    if args.payload > 0 && slot[0] != received as u8 {
                        return Err(format!("slot {received}: payload corrupted"));
                    }
                    slot.commit();
                    received += 1;
                }
                Err(QueueError::Empty) => {
                    empty_waits += 1;
                    std::thread::yield_now();
                }
                Err(e) => return Err(format!("consumer failed on slot {received}: {e}")),
            }
        }

        let full_waits = producer
            .join()
            .map_err(|_| "producer thread panicked".to_string())??;
        let elapsed = started.elapsed();

        let total_bytes = (args.payload * args.slots) as f64;
        let elapsed_s = elapsed.as_secs_f64();
        let run = RunResult {
            iteration,
            elapsed_ms: elapsed_s * 1000.0,
            throughput_mib_s: total_bytes / (1024.0 * 1024.0) / elapsed_s,
            slots_per_s: args.slots as f64 / elapsed_s,
            producer_full_waits: full_waits,
            consumer_empty_waits: empty_waits,
        };
        println!(
            "[{iteration}/{iters}] {elapsed:.1} ms, {mib:.1} MiB/s, {sps:.0} slots/s",
            iters = args.iterations,
            elapsed = run.elapsed_ms,
            mib = run.throughput_mib_s,
            sps = run.slots_per_s
        );
        runs.push(run);
    }

    let throughputs = runs.iter().map(|r| r.throughput_mib_s).collect::<Vec<_>>();
    let summary = Summary {
        capacity_bytes: capacity,
        payload_bytes: args.payload,
        slots: args.slots,
        iterations: args.iterations,
        p50_throughput_mib_s: percentile(&throughputs, 0.50),
        p95_throughput_mib_s: percentile(&throughputs, 0.95),
        avg_throughput_mib_s: throughputs.iter().sum::<f64>() / throughputs.len() as f64,
        runs,
    };

    println!(
        "Done. p50={:.1} MiB/s p95={:.1} MiB/s avg={:.1} MiB/s",
        summary.p50_throughput_mib_s, summary.p95_throughput_mib_s, summary.avg_throughput_mib_s
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote benchmark report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
