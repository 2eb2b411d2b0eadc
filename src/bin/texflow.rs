use std::time::Instant;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use texflow::{GpuContext, NumericGrid, RenderTargetSet, TexelFormat, reference_map};

#[derive(Parser, Debug)]
#[command(name = "texflow", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Iterate y = x + alpha*y over an NxN grid and report throughput.
    Map(MapArgs),
    /// Find the maximum of a 2^k x 2^k grid via tree reduction.
    Reduce(ReduceArgs),
    /// Upload a grid and read it straight back, verifying the copy.
    Roundtrip(RoundtripArgs),
    /// Print the adapter and its texture size limit.
    Limits,
}

#[derive(Parser, Debug)]
struct MapArgs {
    /// Problem size; rounded down to the nearest square.
    #[arg(long, default_value_t = 1_000_000)]
    n: u64,

    /// Number of map passes.
    #[arg(long, default_value_t = 100)]
    iterations: u32,

    /// The scalar coefficient.
    #[arg(long, default_value_t = 1.0 / 9.0)]
    alpha: f32,

    /// Also run the scalar CPU reference and report max/avg error.
    #[arg(long)]
    compare: bool,

    /// Print the full result vector (use with care for large N).
    #[arg(long)]
    show: bool,

    /// Texel format for the device buffers.
    #[arg(long, value_enum, default_value_t = FormatChoice::R32Float)]
    format: FormatChoice,
}

#[derive(Parser, Debug)]
struct ReduceArgs {
    /// Grid extent exponent: the grid is 2^k x 2^k.
    #[arg(long, default_value_t = 5)]
    k: u32,

    /// Print the generated grid.
    #[arg(long)]
    show: bool,
}

#[derive(Parser, Debug)]
struct RoundtripArgs {
    #[arg(long, default_value_t = 5)]
    width: u32,

    #[arg(long, default_value_t = 5)]
    height: u32,

    /// Print the uploaded and read-back values side by side.
    #[arg(long)]
    show: bool,

    /// Texel format for the device buffer.
    #[arg(long, value_enum, default_value_t = FormatChoice::R32Float)]
    format: FormatChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    R32Float,
    Rgba32Float,
}

impl From<FormatChoice> for TexelFormat {
    fn from(choice: FormatChoice) -> Self {
        match choice {
            FormatChoice::R32Float => TexelFormat::R32Float,
            FormatChoice::Rgba32Float => TexelFormat::Rgba32Float,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Map(args) => cmd_map(args),
        Command::Reduce(args) => cmd_reduce(args),
        Command::Roundtrip(args) => cmd_roundtrip(args),
        Command::Limits => cmd_limits(),
    }
}

fn cmd_map(args: MapArgs) -> anyhow::Result<()> {
    let format: TexelFormat = args.format.into();
    let extent = (args.n as f64).sqrt().floor() as u32;
    anyhow::ensure!(extent > 0, "problem size too small");
    let n = (extent as u64) * (extent as u64);
    println!(
        "N={n}, grid={extent}x{extent}, iterations={}, alpha={}",
        args.iterations, args.alpha
    );

    let mut rng = SplitMix::new(0);
    let channels = format.channels();
    let x = NumericGrid::from_fn(extent, extent, channels, |_, _, _| rng.next_f32())?;
    let y = NumericGrid::from_fn(extent, extent, channels, |_, _, _| rng.next_f32())?;

    let ctx = GpuContext::new_blocking().context("initialize gpu")?;
    ctx.finish()?;
    let start = Instant::now();
    let result = texflow::run_map(&ctx, &x, &y, args.alpha, args.iterations)?;
    let gpu_secs = start.elapsed().as_secs_f64();
    let flops = 2.0 * (result.len() as f64) * (args.iterations as f64);
    println!("GPU MFLOP/s: {:>12.0}", flops / (gpu_secs * 1e6));

    if args.compare {
        let start = Instant::now();
        let expected = reference_map(&x, &y, args.alpha, args.iterations);
        let cpu_secs = start.elapsed().as_secs_f64();
        println!("CPU MFLOP/s: {:>12.0}", flops / (cpu_secs * 1e6));

        let mut max_error = 0.0f64;
        let mut avg_error = 0.0f64;
        for (&got, &want) in result.as_slice().iter().zip(expected.as_slice()) {
            let diff = ((got - want) as f64).abs();
            max_error = max_error.max(diff);
            avg_error += diff;
        }
        avg_error /= result.len() as f64;
        println!("Max error:   {max_error:e}");
        println!("Avg error:   {avg_error:e}");

        if args.show {
            println!("GPU result\tCPU result\tdiff");
            for (&got, &want) in result.as_slice().iter().zip(expected.as_slice()) {
                println!("{got}\t{want}\t{}", got - want);
            }
        }
    } else if args.show {
        println!("GPU result:");
        for &v in result.as_slice() {
            println!("{v}");
        }
    }
    Ok(())
}

fn cmd_reduce(args: ReduceArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.k >= 1, "exponent must be at least 1");
    let extent = 1u32
        .checked_shl(args.k)
        .context("exponent out of range")?;
    println!("k={}, 2^k={extent}", args.k);

    let mut rng = SplitMix::new(0);
    let grid = NumericGrid::from_fn(extent, extent, 1, |_, _, _| {
        rng.next_f32() / (rng.next_f32() + 0.001)
    })?;

    if args.show {
        for y in 0..extent {
            let row: Vec<String> = (0..extent)
                .map(|x| format!("{:.3}", grid.get(x, y, 0)))
                .collect();
            println!("{}", row.join("\t"));
        }
    }

    let ctx = GpuContext::new_blocking().context("initialize gpu")?;
    let maximum = texflow::run_reduce(&ctx, &grid)?;
    println!("Maximum  = {maximum}");
    println!("Expected = {}", grid.max_value());
    Ok(())
}

fn cmd_roundtrip(args: RoundtripArgs) -> anyhow::Result<()> {
    let format: TexelFormat = args.format.into();
    let data = NumericGrid::from_fn(args.width, args.height, format.channels(), |x, y, c| {
        (y * args.width * format.channels() + x * format.channels() + c) as f32 + 1.0
    })?;

    let ctx = GpuContext::new_blocking().context("initialize gpu")?;
    let targets = RenderTargetSet::create(&ctx, format, args.width, args.height, &[Some(&data)])?;
    let result = targets.read_attachment(&ctx, 0, args.width, args.height)?;

    if args.show {
        println!("into GPU\tfrom GPU");
        for (&a, &b) in data.as_slice().iter().zip(result.as_slice()) {
            println!("{a}\t{b}");
        }
    }
    anyhow::ensure!(
        data.as_slice() == result.as_slice(),
        "round trip mismatch"
    );
    println!(
        "round trip OK ({}x{} {format}, {} floats)",
        args.width,
        args.height,
        result.len()
    );
    Ok(())
}

fn cmd_limits() -> anyhow::Result<()> {
    let ctx = GpuContext::new_blocking().context("initialize gpu")?;
    let info = ctx.adapter_info();
    println!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
    println!("max 2D texture dimension: {}", ctx.max_texture_dimension());
    Ok(())
}

/// Deterministic splitmix-style generator for reproducible demo data.
struct SplitMix {
    state: u64,
}

impl SplitMix {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1).
    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}
