use std::env;
use std::hint::black_box;
use std::io;
use std::process;
use std::time::{Duration, Instant};

use hpc_correlate::generate::{Mode, generate};
use hpc_correlate::verify::{
    ALLOWED_ERROR, FREIVALDS_LIMIT, freivalds_error, max_abs_error,
};
use hpc_correlate::{
    CorrelateError, Correlator, Schedule, TilePlan, correlate_baseline, correlate_lanes,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_SEED: u64 = 0x1234_5678_9ABC_DEF0;
const FULL_CHECK_LIMIT: f64 = 1.0e8;
const FREIVALDS_ROUNDS: usize = 20;

#[derive(Clone, Copy, Debug)]
enum Bench {
    Baseline,
    Lanes4,
    Lanes8,
    Tiled4x10,
    Tiled8x10,
    Tiled8x16,
}

#[derive(Clone, Copy)]
struct Config {
    bench: Bench,
    rows: usize,
    cols: usize,
    iters: usize,
    seed: u64,
    mode: Mode,
    threads: usize,
    schedule: Schedule,
    verify: bool,
    report: bool,
}

fn main() {
    init_tracing();

    let config = match parse_args() {
        Ok(result) => result,
        Err(err) => {
            eprintln!("error: {err}");
            print_usage(&program_name());
            process::exit(2);
        }
    };

    if let Err(err) = run(config) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn parse_args() -> Result<Config, String> {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "perf_harness".to_string());

    let mut bench = None;
    let mut rows = None;
    let mut cols = None;
    let mut iters = None;
    let mut seed = DEFAULT_SEED;
    let mut mode = Mode::Uniform;
    let mut threads = 0;
    let mut schedule = Schedule::RoundRobin;
    let mut verify = false;
    let mut report = true;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bench" => {
                let name = args.next().ok_or("--bench requires a value")?;
                let parsed = parse_bench(&name).ok_or_else(|| format!("unknown bench: {name}"))?;
                bench = Some(parsed);
            }
            "--rows" => {
                let value = args.next().ok_or("--rows requires a value")?;
                rows = Some(parse_usize(&value, "--rows")?);
            }
            "--cols" => {
                let value = args.next().ok_or("--cols requires a value")?;
                cols = Some(parse_usize(&value, "--cols")?);
            }
            "--iters" => {
                let value = args.next().ok_or("--iters requires a value")?;
                iters = Some(parse_usize(&value, "--iters")?);
            }
            "--seed" => {
                let value = args.next().ok_or("--seed requires a value")?;
                seed = parse_u64(&value, "--seed")?;
            }
            "--mode" => {
                let value = args.next().ok_or("--mode requires a value")?;
                mode = Mode::parse(&value).ok_or_else(|| format!("unknown mode: {value}"))?;
            }
            "--threads" => {
                let value = args.next().ok_or("--threads requires a value")?;
                threads = parse_usize(&value, "--threads")?;
            }
            "--work-stealing" => schedule = Schedule::WorkStealing,
            "--round-robin" => schedule = Schedule::RoundRobin,
            "--verify" => verify = true,
            "--report" => report = true,
            "--no-report" => report = false,
            "--list" => {
                list_benches();
                process::exit(0);
            }
            "-h" | "--help" => {
                print_usage(&program);
                process::exit(0);
            }
            _ => return Err(format!("unknown argument: {arg}")),
        }
    }

    let bench = bench.ok_or("missing --bench")?;
    let rows = rows.unwrap_or_else(|| bench.default_rows());
    let cols = cols.unwrap_or(rows);
    let iters = iters.unwrap_or_else(|| bench.default_iters());

    Ok(Config {
        bench,
        rows,
        cols,
        iters,
        seed,
        mode,
        threads,
        schedule,
        verify,
        report,
    })
}

fn program_name() -> String {
    env::args()
        .next()
        .unwrap_or_else(|| "perf_harness".to_string())
}

fn print_usage(program: &str) {
    eprintln!(
        "\
Usage:
  {program} --bench <name> [--rows N] [--cols N] [--iters N] [--seed N] [--mode M]
            [--threads N] [--work-stealing] [--verify] [--no-report]
  {program} --list

Options:
  --bench <name>     Variant to run (see --list)
  --rows N           Matrix rows ny (bench-specific default)
  --cols N           Matrix columns nx (default: same as --rows)
  --iters N          Iterations (bench-specific default)
  --seed N           RNG seed (default: 0x123456789ABCDEF0)
  --mode M           Input shape: uniform, normal, subspace, measurement, special
  --threads N        Worker threads for tiled variants (0 = all cores)
  --work-stealing    Adaptive tile distribution instead of round-robin
  --round-robin      Static round-robin tile distribution (default)
  --verify           Check the result against an f64 reference after the run
  --report           Print throughput summary after the run (default)
  --no-report        Disable throughput summary
  --list             Show available benches

Set RUST_LOG=debug for engine diagnostics on stderr.
"
    );
}

fn list_benches() {
    for bench in Bench::ALL {
        println!("{}", bench.name());
    }
}

fn parse_bench(name: &str) -> Option<Bench> {
    Bench::ALL.into_iter().find(|bench| bench.name() == name)
}

impl Bench {
    const ALL: [Bench; 6] = [
        Bench::Baseline,
        Bench::Lanes4,
        Bench::Lanes8,
        Bench::Tiled4x10,
        Bench::Tiled8x10,
        Bench::Tiled8x16,
    ];

    fn default_rows(self) -> usize {
        match self {
            Bench::Baseline | Bench::Lanes4 | Bench::Lanes8 => 1000,
            Bench::Tiled4x10 | Bench::Tiled8x10 | Bench::Tiled8x16 => 4000,
        }
    }

    fn default_iters(self) -> usize {
        match self {
            Bench::Baseline | Bench::Lanes4 | Bench::Lanes8 => 3,
            Bench::Tiled4x10 | Bench::Tiled8x10 | Bench::Tiled8x16 => 5,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Bench::Baseline => "correlate_baseline",
            Bench::Lanes4 => "correlate_lanes4",
            Bench::Lanes8 => "correlate_lanes8",
            Bench::Tiled4x10 => "correlate_tiled_4x10",
            Bench::Tiled8x10 => "correlate_tiled_8x10",
            Bench::Tiled8x16 => "correlate_tiled_8x16",
        }
    }

    fn tile(self) -> Option<usize> {
        match self {
            Bench::Baseline | Bench::Lanes4 | Bench::Lanes8 => None,
            Bench::Tiled4x10 | Bench::Tiled8x10 => Some(10),
            Bench::Tiled8x16 => Some(16),
        }
    }

    fn call(
        self,
        config: &Config,
        data: &[f32],
        out: &mut [f32],
    ) -> Result<(), CorrelateError> {
        let (ny, nx) = (config.rows, config.cols);
        match self {
            Bench::Baseline => correlate_baseline(ny, nx, data, out),
            Bench::Lanes4 => correlate_lanes::<4>(ny, nx, data, out),
            Bench::Lanes8 => correlate_lanes::<8>(ny, nx, data, out),
            Bench::Tiled4x10 => Correlator::<4, 10>::default()
                .threads(config.threads)
                .schedule(config.schedule)
                .run(ny, nx, data, out),
            Bench::Tiled8x10 => Correlator::<8, 10>::default()
                .threads(config.threads)
                .schedule(config.schedule)
                .run(ny, nx, data, out),
            Bench::Tiled8x16 => Correlator::<8, 16>::default()
                .threads(config.threads)
                .schedule(config.schedule)
                .run(ny, nx, data, out),
        }
    }
}

fn parse_usize(value: &str, flag: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| format!("{flag} expects a non-negative integer"))
}

fn parse_u64(value: &str, flag: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("{flag} expects a non-negative integer"))
}

/// Input and output cell counts, or an error when either overflows.
fn matrix_cells(ny: usize, nx: usize) -> Result<(usize, usize), CorrelateError> {
    let overflow = || CorrelateError::DimensionOverflow { ny, nx };
    let cells_in = ny.checked_mul(nx).ok_or_else(overflow)?;
    let cells_out = ny.checked_mul(ny).ok_or_else(overflow)?;
    Ok((cells_in, cells_out))
}

fn run(config: Config) -> Result<(), CorrelateError> {
    let (ny, nx) = (config.rows, config.cols);
    let (_, cells_out) = matrix_cells(ny, nx)?;
    let data = generate(ny, nx, config.mode, config.seed);
    let mut out = vec![0.0f32; cells_out];

    if let Some(tile) = config.bench.tile() {
        let plan = TilePlan::new(ny, tile);
        debug!(
            tile,
            row_tiles = plan.row_tiles(),
            tiles = plan.tile_count(),
            "tile plan"
        );
    }

    let sample = (ny / 2) * ny + (ny / 2);
    let mut acc = 0.0f64;
    let start = Instant::now();
    for _ in 0..config.iters {
        config
            .bench
            .call(&config, black_box(&data), black_box(&mut out))?;
        if let Some(&v) = out.get(sample) {
            acc += v as f64;
        }
    }
    let elapsed = start.elapsed();
    black_box(acc);

    if config.report {
        print_report(&config, elapsed);
    }
    if config.verify {
        verify_result(&config, &data, &out);
    }
    Ok(())
}

fn verify_result(config: &Config, data: &[f32], out: &[f32]) {
    let (ny, nx) = (config.rows, config.cols);
    let work = nx as f64 * ny as f64 * ny as f64;
    if work < FULL_CHECK_LIMIT {
        let err = max_abs_error(ny, nx, data, out);
        let pass = err < ALLOWED_ERROR;
        info!(err, "full reference check");
        println!(
            "verify=full max_error={err:.3e} ratio={:.3} {}",
            err / ALLOWED_ERROR,
            if pass { "OK" } else { "ERR" }
        );
        if !pass {
            process::exit(1);
        }
    } else {
        let err = freivalds_error(ny, nx, data, out, FREIVALDS_ROUNDS, config.seed);
        let pass = err < FREIVALDS_LIMIT;
        info!(err, rounds = FREIVALDS_ROUNDS, "freivalds check");
        println!(
            "verify=freivalds max_error={err:.3e} ratio={:.3} {}",
            err / FREIVALDS_LIMIT,
            if pass { "OK" } else { "ERR" }
        );
        if !pass {
            process::exit(1);
        }
    }
}

fn print_report(config: &Config, elapsed: Duration) {
    let (ny, nx) = (config.rows as u128, config.cols as u128);
    let iters = config.iters as u128;
    let pairs = ny * (ny + 1) / 2 * iters;
    let products = pairs * nx;
    let bytes = (ny * nx * 4 + ny * ny * 4) * iters;

    let elapsed_s = elapsed.as_secs_f64();
    let pairs_per_s = pairs as f64 / elapsed_s;
    let products_per_s = products as f64 / elapsed_s;
    let ns_per_pair = (elapsed_s * 1.0e9) / pairs as f64;

    let mut lines = Vec::with_capacity(5);
    lines.push(format!(
        "bench={} rows={} cols={} iters={} mode={}",
        config.bench.name(),
        config.rows,
        config.cols,
        config.iters,
        config.mode.name()
    ));
    if config.bench.tile().is_some() {
        let threads = if config.threads == 0 {
            rayon::current_num_threads()
        } else {
            config.threads
        };
        lines.push(format!("threads={} schedule={:?}", threads, config.schedule));
    }
    lines.push(format!(
        "elapsed_s={:.6} ns_per_pair={:.3} throughput={}",
        elapsed_s,
        ns_per_pair,
        format_rate(pairs_per_s, "pair")
    ));
    lines.push(format!(
        "bytes={} byte_throughput={}",
        bytes,
        format_rate(bytes as f64 / elapsed_s, "B")
    ));
    lines.push(format!("gflops={}", format_rate(products_per_s * 2.0, "FLOP")));

    println!("{}", lines.join("\n"));
}

fn format_rate(rate: f64, unit: &str) -> String {
    let (value, prefix) = if rate >= 1.0e12 {
        (rate / 1.0e12, "T")
    } else if rate >= 1.0e9 {
        (rate / 1.0e9, "G")
    } else if rate >= 1.0e6 {
        (rate / 1.0e6, "M")
    } else if rate >= 1.0e3 {
        (rate / 1.0e3, "K")
    } else {
        (rate, "")
    };
    format!("{value:.3} {prefix}{unit}/s")
}
