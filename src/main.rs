//! `lfdeque` — lock-free two-ended deque research harness.
//!
//! Selects a rideable deque (`of-deque`/`mm-deque`), drives it through one
//! of the tests in [`lfdeque::verify`] for a fixed duration across N threads,
//! and reports throughput/verification results either as a log line or, with
//! `--json`, a single [`lfdeque::verify::TestReport`] object on stdout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use lfdeque::config::{AccessType, Config, PartialConfig, Rideable, TestKind};
use lfdeque::core::container::Deque;
use lfdeque::core::mm_deque::MmDeque;
use lfdeque::core::of_deque::OfDeque;
use lfdeque::verify::{potato, queue, stack, TestReport};

/// Lock-free two-ended deque research harness.
#[derive(Parser)]
#[command(name = "lfdeque")]
#[command(about = "Lock-free two-ended deque research harness")]
#[command(version)]
struct Cli {
    /// Deque implementation to drive.
    #[arg(long, value_enum)]
    rideable: Option<Rideable>,

    /// Which test to run.
    #[arg(long, value_enum)]
    test: Option<TestKind>,

    /// Worker thread count.
    #[arg(long)]
    threads: Option<usize>,

    /// Test duration, in seconds.
    #[arg(long)]
    seconds: Option<u64>,

    /// OFDeque buffer size (one of 512, 1024, 4096, 8192). Ignored for
    /// `mm-deque`.
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Enable the elimination back-off side channel on OFDeque.
    #[arg(long)]
    elimination: bool,

    /// Access pattern for the plain insert/remove throughput test.
    #[arg(long, value_enum)]
    access_type: Option<AccessType>,

    /// Optional TOML configuration file; CLI flags override its values.
    #[arg(long)]
    config: Option<String>,

    /// Log level passed to the `tracing` env filter.
    #[arg(long)]
    log_level: Option<String>,

    /// Print the `TestReport` as a single JSON object instead of a log line.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_partial(self) -> PartialConfig {
        PartialConfig {
            rideable: self.rideable,
            test: self.test,
            threads: self.threads,
            seconds: self.seconds,
            buffer_size: self.buffer_size,
            elimination: self.elimination.then_some(true),
            access_type: self.access_type,
            log_level: self.log_level,
            json: self.json.then_some(true),
        }
    }
}

const EMPTY: i32 = i32::MIN;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let bootstrap_log_level = cli.log_level.clone().unwrap_or_else(|| "info".to_string());
    let partial = cli.into_partial();

    // Tracing has to be live before config load/validate so a fatal
    // ConfigError actually reaches `error!` instead of a bare Err return.
    // The merged Config's own log_level isn't known yet, so bootstrap from
    // the raw CLI flag (or "info") and let it stand for the whole run.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(bootstrap_log_level.parse()?)
                .add_directive("lfdeque=info".parse()?),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let cfg = match Config::load(config_path.as_deref()).map(|c| c.merge(partial)) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "fatal configuration error while loading config file");
            return Err(err.into());
        }
    };
    if let Err(err) = cfg.validate() {
        error!(%err, "fatal configuration error, refusing to start");
        return Err(err.into());
    }

    info!("lfdeque");
    info!("├─ rideable: {:?}", cfg.rideable);
    info!("├─ test: {:?}", cfg.test);
    info!("├─ threads: {}", cfg.threads);
    info!("└─ seconds: {}", cfg.seconds);

    let report = run(&cfg);

    if cfg.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        info!(
            "insOps={} remOps={} remOpsEmpty={} notes={}",
            report.ins_ops, report.rem_ops, report.rem_ops_empty, report.notes
        );
    }

    if report.notes.starts_with("verify fail") {
        std::process::exit(1);
    }
    Ok(())
}

fn run(cfg: &Config) -> TestReport {
    match cfg.rideable {
        Rideable::OfDeque => run_on(build_of_deque(cfg), cfg),
        Rideable::MmDeque => run_on(Arc::new(MmDeque::new(EMPTY, cfg.threads)), cfg),
    }
}

fn build_of_deque(cfg: &Config) -> Arc<dyn Deque<Item = i32>> {
    match cfg.buffer_size {
        512 => Arc::new(OfDeque::<512>::new(EMPTY, cfg.threads, cfg.elimination)),
        4096 => Arc::new(OfDeque::<4096>::new(EMPTY, cfg.threads, cfg.elimination)),
        8192 => Arc::new(OfDeque::<8192>::new(EMPTY, cfg.threads, cfg.elimination)),
        _ => Arc::new(OfDeque::<1024>::new(EMPTY, cfg.threads, cfg.elimination)),
    }
}

fn run_on(deque: Arc<dyn Deque<Item = i32>>, cfg: &Config) -> TestReport {
    let duration = Duration::from_secs(cfg.seconds);
    match cfg.test {
        TestKind::QueueVerify => queue::run(&deque, cfg.threads, duration),
        TestKind::StackVerify => stack::run(&deque, cfg.threads, duration),
        TestKind::Potato => potato::run(&deque, cfg.threads, 0, Duration::from_millis(10), duration),
        TestKind::InsertRemove => insert_remove(&deque, cfg, duration),
    }
}

/// Plain throughput test: every thread pushes and pops according to
/// `cfg.access_type` for `duration`, with no ordering assertions.
fn insert_remove(deque: &Arc<dyn Deque<Item = i32>>, cfg: &Config, duration: Duration) -> TestReport {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    let access = cfg.access_type;
    let empty = deque.empty_sentinel();
    let deadline = Instant::now() + duration;
    let ins_each = vec![AtomicU64::new(0); cfg.threads];
    let rem_each = vec![AtomicU64::new(0); cfg.threads];
    let rem_empty_each = vec![AtomicU64::new(0); cfg.threads];

    std::thread::scope(|scope| {
        for tid in 0..cfg.threads {
            let deque = &**deque;
            let ins_each = &ins_each;
            let rem_each = &rem_each;
            let rem_empty_each = &rem_empty_each;
            scope.spawn(move || {
                let mut rng = lfdeque::core::rand::HarnessRng::new(tid as u64 + 1);
                let mut ins = 0u64;
                let mut rem = 0u64;
                let mut rem_empty = 0u64;
                while Instant::now() < deadline {
                    let push_right = match access {
                        AccessType::Queue => true,
                        AccessType::Stack => true,
                        AccessType::Random => rng.next_bounded(2) == 0,
                    };
                    let value = rng.next() as i32;
                    if push_right {
                        deque.right_push(value, tid);
                    } else {
                        deque.left_push(value, tid);
                    }
                    ins += 1;

                    let pop_left = match access {
                        AccessType::Queue => true,
                        AccessType::Stack => false,
                        AccessType::Random => rng.next_bounded(2) == 0,
                    };
                    let popped = if pop_left { deque.left_pop(tid) } else { deque.right_pop(tid) };
                    if popped == empty {
                        rem_empty += 1;
                    } else {
                        rem += 1;
                    }
                }
                ins_each[tid].store(ins, Ordering::Relaxed);
                rem_each[tid].store(rem, Ordering::Relaxed);
                rem_empty_each[tid].store(rem_empty, Ordering::Relaxed);
            });
        }
    });

    let load = |v: &[AtomicU64]| v.iter().map(|x| x.load(Ordering::Relaxed)).collect::<Vec<_>>();
    let mut report = TestReport::from_counts(load(&ins_each), load(&rem_each), load(&rem_empty_each));
    report.notes = "throughput run".to_string();
    report
}
