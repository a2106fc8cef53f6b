use annealer::{AnnealError, DenseGraphAnnealer, OptimizeDirection};
use clap::Parser;
use device::Real;
use rng::RandomStream;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

/// Simulated quantum annealing over dense Ising problems
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Problem size (ignored with --demo)
    #[arg(long, default_value_t = 16)]
    n: usize,

    /// Anneal the built-in 4-node ring problem instead of a random one
    #[arg(long)]
    demo: bool,

    /// Number of trotter replicas
    #[arg(long, default_value_t = 8)]
    trotters: usize,

    /// RNG seed (full reproducibility)
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of annealing sweeps
    #[arg(long, default_value_t = 200)]
    steps: usize,

    /// Initial transverse field
    #[arg(long, default_value_t = 3.0)]
    g0: f64,

    /// Final transverse field
    #[arg(long, default_value_t = 0.01)]
    g_final: f64,

    /// Thermal parameter
    #[arg(long, default_value_t = 0.02)]
    kt: f64,

    /// Maximize the objective instead of minimizing it
    #[arg(long)]
    maximize: bool,

    /// Number of Rayon worker threads (0 = Rayon default)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Output CSV path
    #[arg(long, default_value = "anneal_trace.csv")]
    out: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if args.steps == 0 {
        eprintln!("steps must be > 0");
        std::process::exit(1);
    }
    if args.g0 <= 0.0 || args.g_final <= 0.0 || args.g_final > args.g0 {
        eprintln!("transverse field schedule requires 0 < g_final <= g0");
        std::process::exit(1);
    }
    if args.kt <= 0.0 {
        eprintln!("kt must be > 0");
        std::process::exit(1);
    }

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .expect("Failed to build Rayon thread pool");
    }

    let (w, n) = if args.demo {
        (ring_problem(), 4)
    } else {
        (random_symmetric(args.seed, args.n), args.n)
    };

    if let Err(err) = run(&args, &w, n) {
        eprintln!("anneal failed: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args, w: &[Real], n: usize) -> Result<(), AnnealError> {
    let direction = if args.maximize {
        OptimizeDirection::Maximize
    } else {
        OptimizeDirection::Minimize
    };

    let mut eng = DenseGraphAnnealer::new();
    eng.seed(args.seed);
    eng.set_problem(w, n, direction)?;
    eng.set_num_trotters(args.trotters)?;
    eng.init_anneal()?;
    eng.randomize_q()?;

    let ratio = if args.steps > 1 {
        (args.g_final / args.g0).powf(1.0 / (args.steps - 1) as f64)
    } else {
        1.0
    };

    // get_e reports the objective under W; fold it to a minimized score
    let sign = if args.maximize { -1.0 } else { 1.0 };

    let mut best = Real::INFINITY;
    let mut best_bits = Vec::new();
    let mut rows = Vec::with_capacity(args.steps);
    let mut g = args.g0;

    let start = Instant::now();
    for step in 0..args.steps {
        eng.anneal_one_step(g, args.kt)?;
        eng.calculate_e()?;

        let energies = eng.get_e()?;
        let (p, score) = energies
            .iter()
            .enumerate()
            .fold((0, Real::INFINITY), |acc, (i, &e)| {
                if sign * e < acc.1 {
                    (i, sign * e)
                } else {
                    acc
                }
            });
        if score < best {
            best = score;
            best_bits = eng.get_x()?.remove(p);
        }
        rows.push((step, g, sign * score, sign * best));
        g *= ratio;
    }
    let elapsed = start.elapsed().as_secs_f64();

    write_csv(&args.out, &rows);

    let (pn, pm) = eng.problem_size();
    println!(
        "Anneal: n={}, trotters={}, steps={} → {:.3} s",
        pn, pm, args.steps, elapsed
    );
    println!(
        "Best energy ({}) = {:.6}",
        if args.maximize { "max" } else { "min" },
        sign * best
    );
    println!(
        "Best bits = {}",
        best_bits
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join("")
    );
    Ok(())
}

/// Couplings of a 4-cycle with two degenerate zero-energy cuts.
fn ring_problem() -> Vec<Real> {
    vec![
        0.0, 1.0, 1.0, 0.0, //
        1.0, 0.0, 0.0, 1.0, //
        1.0, 0.0, 0.0, 1.0, //
        0.0, 1.0, 1.0, 0.0, //
    ]
}

fn random_symmetric(seed: u64, n: usize) -> Vec<Real> {
    let mut rs = RandomStream::new();
    rs.seed(seed);
    let raw: Vec<Real> = rs
        .next_floats(n * n)
        .expect("stream was just seeded")
        .into_iter()
        .map(|u| 2.0 * u - 1.0)
        .collect();

    let mut w = vec![0.0; n * n];
    for r in 0..n {
        for c in 0..n {
            w[r * n + c] = 0.5 * (raw[r * n + c] + raw[c * n + r]);
        }
    }
    w
}

fn write_csv(path: &str, rows: &[(usize, f64, f64, f64)]) {
    let file = File::create(path).expect("failed to create CSV file");
    let mut out = BufWriter::new(file);
    writeln!(out, "step,g,energy,best_energy").expect("failed to write header");
    for (step, g, e, best) in rows {
        writeln!(out, "{},{},{},{}", step, g, e, best).expect("failed to write row");
    }
}
