use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use radarsim_core::constants::MAX_SCATTERER_TYPES;
use radarsim_core::{GateSpec, IqWriter, Pulse, PulseSink, RangeWeightTable, ScanPattern, SimResult, TableSet};
use radarsim_gpu::{GpuContext, GpuOptions, GpuSynthesizer};
use radarsim_reduce::{
    reference_pulse, PulseFrame, PulseSynthesizer, ReductionStrategy, SequentialSynthesizer,
    TiledSynthesizer, DEFAULT_LOCAL_MEM_BUDGET,
};
use radarsim_sim::{compare_pulses, peak_magnitude, rates, Session, SessionConfig, Tolerance};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Warm-up only runs for recordings longer than this many frames
const WARM_UP_THRESHOLD: u64 = 1200;

#[derive(Parser)]
#[command(name = "radarsim")]
#[command(about = "Synthetic radar IQ simulator")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Device {
    /// Two-pass reduction on the CPU
    Cpu,
    /// Sequential double loop, slow but exact
    Reference,
    /// wgpu compute kernels
    Gpu,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    RangeParallel,
    GroupParallel,
    Universal,
}

impl From<Strategy> for ReductionStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::RangeParallel => ReductionStrategy::RangeParallel,
            Strategy::GroupParallel => ReductionStrategy::GroupParallel,
            Strategy::Universal => ReductionStrategy::Universal,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a domain and emit pulses
    Run {
        /// Pulse synthesis back end
        #[arg(long, value_enum, default_value = "cpu")]
        device: Device,

        /// Pulses to emit
        #[arg(short, long, default_value = "5")]
        frames: u64,

        /// Precipitation scatterers per resolution volume
        #[arg(short = 'D', long)]
        density: Option<f64>,

        /// Warm-up steps before recording long runs
        #[arg(short, long, default_value = "2000")]
        warm_up: u64,

        /// Debris counts for types 1.. (repeat the flag)
        #[arg(short, long)]
        debris: Vec<usize>,

        /// Write the pulses to an IQ file
        #[arg(short, long)]
        output: bool,

        /// Beam elevation in degrees
        #[arg(short, long, default_value = "3.0")]
        elevation: f32,

        /// Scan pattern, e.g. "D:0,3,5/10,3,5"
        #[arg(long)]
        scan: Option<String>,

        /// JSON session configuration; flags override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Keep a second frame in flight while the previous one is read back
        #[arg(long)]
        pipelined: bool,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the pointing sequence of a scan pattern
    Scan {
        pattern: String,

        /// Pointings to print (default: one full cycle)
        #[arg(short, long)]
        count: Option<u64>,
    },

    /// Compare an accelerated pulse against the sequential reference
    ReduceTest {
        /// Synthetic scatterers
        #[arg(short = 'n', long, default_value = "100000")]
        entries: usize,

        #[arg(long, default_value = "16")]
        gates: u32,

        #[arg(long, default_value = "64")]
        group_size: u32,

        /// Timed repetitions of the accelerated pulse
        #[arg(long, default_value = "0")]
        iterations: u32,

        #[arg(long, value_enum)]
        strategy: Option<Strategy>,

        #[arg(long, value_enum, default_value = "gpu")]
        device: Device,

        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_level(cli.verbose).to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Run {
            device,
            frames,
            density,
            warm_up,
            debris,
            output,
            elevation,
            scan,
            config,
            pipelined,
            seed,
        } => {
            let mut config = match config {
                Some(path) => SessionConfig::load(&path).with_context(|| format!("loading {}", path.display()))?,
                None => SessionConfig::default(),
            };
            config.elevation = elevation;
            if scan.is_some() {
                config.scan = scan;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }

            config.trim_to_beam();

            if let Some(density) = density {
                config.population = config.population.with_density(&config.domain, density);
            }
            for (count, &n) in config.population.counts.iter_mut().skip(1).zip(&debris) {
                *count = n;
            }
            if debris.len() > MAX_SCATTERER_TYPES - 1 {
                warn!("Only {} debris types exist, ignoring the rest", MAX_SCATTERER_TYPES - 1);
            }
            config.population = config.population.revise_to_group_multiple(config.group_size as usize);

            run(config, device, frames, warm_up, output, pipelined)?;
        }

        Commands::Scan { pattern, count } => {
            for line in scan_listing(&pattern, count) {
                println!("{}", line);
            }
        }

        Commands::ReduceTest {
            entries,
            gates,
            group_size,
            iterations,
            strategy,
            device,
            seed,
        } => {
            reduce_test(entries, gates, group_size, iterations, strategy.map(Into::into), device, seed)?;
        }
    }

    Ok(())
}

fn verbosity_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Positions and one pointing cycle of a scan pattern; a malformed pattern
/// is reported and listed as empty, as `run` treats it
fn scan_listing(pattern: &str, count: Option<u64>) -> Vec<String> {
    let mut scan = ScanPattern::parse_or_empty(pattern);
    let mut lines = Vec::new();
    match scan.mode() {
        Some(mode) => lines.push(format!("Mode: {:?}", mode)),
        None => lines.push("Mode: none".to_string()),
    }
    for (i, p) in scan.positions().iter().enumerate() {
        lines.push(format!("  {:2}: az={:7.2}  el={:6.2}  x{}", i, p.azimuth, p.elevation, p.count));
    }

    let count = count.unwrap_or_else(|| scan.total_repeats());
    lines.push("\nSequence:".to_string());
    for i in 0..count {
        match scan.next() {
            Some((az, el)) => lines.push(format!("  {:4}: {:7.2} {:6.2}", i, az, el)),
            None => break,
        }
    }
    lines
}

fn tiled(group_size: u32, strategy: Option<ReductionStrategy>) -> TiledSynthesizer {
    let synth = TiledSynthesizer::new(group_size, DEFAULT_LOCAL_MEM_BUDGET);
    match strategy {
        Some(s) => synth.with_strategy(s),
        None => synth,
    }
}

fn gpu(group_size: u32, strategy: Option<ReductionStrategy>) -> Result<GpuSynthesizer> {
    let ctx = GpuContext::new(GpuOptions::default())?;
    info!("Using GPU adapter {}", ctx.adapter_name());
    let synth = GpuSynthesizer::with_group_size(ctx, group_size);
    Ok(match strategy {
        Some(s) => synth.with_strategy(s),
        None => synth,
    })
}

fn synthesizer(device: Device, group_size: u32) -> Result<Box<dyn PulseSynthesizer>> {
    Ok(match device {
        Device::Cpu => Box::new(tiled(group_size, None)),
        Device::Reference => Box::new(SequentialSynthesizer::new()),
        Device::Gpu => Box::new(gpu(group_size, None)?),
    })
}

fn progress_bar(len: u64, what: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({per_sec})")?
            .progress_chars("=>-"),
    );
    pb.set_message(what.to_string());
    Ok(pb)
}

/// `RADARSIM_OUTPUT_DIR`, else `~/Downloads`, else the working directory
fn output_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("RADARSIM_OUTPUT_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(home) = std::env::var_os("HOME") {
        let downloads = PathBuf::from(home).join("Downloads");
        if downloads.is_dir() {
            return downloads;
        }
    }
    PathBuf::from(".")
}

/// Tracks what went by when pulses are not written anywhere
#[derive(Default)]
struct PulseSummary {
    pulses: u64,
    peak_power: f64,
    last_time: f64,
}

impl PulseSink for PulseSummary {
    fn record(&mut self, pulse: &Pulse) -> SimResult<()> {
        self.pulses += 1;
        self.peak_power = self.peak_power.max(pulse.power());
        self.last_time = pulse.time;
        Ok(())
    }
}

fn run(config: SessionConfig, device: Device, frames: u64, warm_up: u64, output: bool, pipelined: bool) -> Result<()> {
    let synth = synthesizer(device, config.group_size)?;
    let run_prt = config.radar.prt_s as f64;
    let elevation = config.elevation;
    let mut session = Session::new(config, Box::new(TableSet::builtin()), synth)?;
    info!(
        "{} scatterers, {} gates, {} frames on {}",
        session.state().len(),
        session.gates().count,
        frames,
        session.synthesizer_name()
    );

    if frames > WARM_UP_THRESHOLD && warm_up > 0 {
        session.set_prt(rates::WARM_UP_PRT);
        let pb = progress_bar(warm_up, "warm-up")?;
        for _ in 0..warm_up {
            session.warm_up(1)?;
            pb.inc(1);
        }
        pb.finish_with_message("warm-up complete");
        session.set_prt(run_prt);
    }

    let pb = progress_bar(frames, "pulses")?;
    let start = Instant::now();

    if output {
        let unix = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let path = output_dir().join(format!("sim-{}-E{:04.1}.iq", unix, elevation));
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = IqWriter::create(BufWriter::new(file), &session.run_header())?;
        session.run(frames, pipelined, &mut writer, |_| pb.inc(1))?;
        pb.finish_with_message("pulses written");
        let written = writer.pulses_written();
        writer.finish()?;
        info!("Wrote {} pulses to {}", written, path.display());
    } else {
        let mut summary = PulseSummary::default();
        session.run(frames, pipelined, &mut summary, |_| pb.inc(1))?;
        pb.finish_with_message("done");
        info!(
            "{} pulses up to t={:.3} s, peak power {:.3e}",
            summary.pulses, summary.last_time, summary.peak_power
        );
    }

    let elapsed = start.elapsed().as_secs_f64();
    info!("{:.1} pulses/s", frames as f64 / elapsed.max(1e-9));
    Ok(())
}

fn reduce_test(
    entries: usize,
    gate_count: u32,
    group_size: u32,
    iterations: u32,
    strategy: Option<ReductionStrategy>,
    device: Device,
    seed: u64,
) -> Result<()> {
    let gates = GateSpec::new(1_000.0, 15.0, gate_count)?;
    let weights = RangeWeightTable::triangle(gates.range_delta)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let far = gates.gate_center(gates.count - 1).max(gates.range_start + 1.0);
    let signal: Vec<[f32; 4]> = (0..entries)
        .map(|_| [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)])
        .collect();
    let attenuation: Vec<[f32; 4]> = (0..entries)
        .map(|_| [rng.gen_range(gates.range_start..far), 1.0, 0.0, 0.0])
        .collect();
    let frame = PulseFrame::new(&signal, &attenuation, gates, &weights)?;

    let mut synth: Box<dyn PulseSynthesizer> = match device {
        Device::Cpu => {
            let synth = tiled(group_size, strategy);
            println!("{}", synth.plan(&frame)?);
            Box::new(synth)
        }
        Device::Gpu => {
            let synth = gpu(group_size, strategy)?;
            println!("{}", synth.plan(&frame)?);
            Box::new(synth)
        }
        Device::Reference => Box::new(SequentialSynthesizer::new()),
    };

    let start = Instant::now();
    let reference = reference_pulse(&frame);
    let reference_time = start.elapsed();

    let start = Instant::now();
    let candidate = synth.synthesize(&frame)?;
    let candidate_time = start.elapsed();

    println!("\n{:>4}  {:>14} {:>14}   {:>14} {:>14}   {:>10}", "gate", "ref I", "ref Q", "cand I", "cand Q", "delta");
    for (k, (r, c)) in reference.iter().zip(&candidate).enumerate() {
        let delta = r.iter().zip(c).map(|(a, b)| (a - b).abs()).fold(0f32, f32::max);
        println!("{:4}  {:14.6} {:14.6}   {:14.6} {:14.6}   {:10.3e}", k, r[0], r[1], c[0], c[1], delta);
    }

    let report = compare_pulses(&reference, &candidate, Tolerance::default())?;
    println!(
        "\nMean error {:.3e}, max error {:.3e} (against peak {:.3e})",
        report.mean_error,
        report.max_error,
        peak_magnitude(&reference)
    );
    println!("Reference {:?}, {} {:?}", reference_time, synth.name(), candidate_time);

    if iterations > 0 {
        let start = Instant::now();
        for _ in 0..iterations {
            synth.synthesize(&frame)?;
        }
        let per = start.elapsed() / iterations;
        println!("{} iterations: {:?} per pulse", iterations, per);
    }

    if !report.within_tolerance() {
        if let Some(worst) = report.worst() {
            anyhow::bail!(
                "Gate {} component {} diverges: {} vs {} (error {:.3e})",
                worst.gate,
                worst.component,
                worst.reference,
                worst.candidate,
                worst.error
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(verbosity_level(0), Level::INFO);
        assert_eq!(verbosity_level(1), Level::DEBUG);
        assert_eq!(verbosity_level(5), Level::TRACE);
        assert!(EnvFilter::try_new(verbosity_level(1).to_string()).is_ok());
    }

    #[test]
    fn test_scan_listing_cycle() {
        let lines = scan_listing("D:0,3,2/10,3,1", None);
        assert_eq!(lines[0], "Mode: Dwell");
        // Two positions, the header, then three pointings
        assert_eq!(lines.len(), 1 + 2 + 1 + 3);
        assert!(lines[4].ends_with("0.00   3.00"));
        assert!(lines[6].ends_with("10.00   3.00"));
    }

    #[test]
    fn test_scan_listing_bad_pattern_is_empty() {
        for bad in ["Z:1,2,3", "D:1,x,3", "D"] {
            let lines = scan_listing(bad, Some(5));
            assert_eq!(lines, vec!["Mode: none".to_string(), "\nSequence:".to_string()], "{}", bad);
        }
    }
}
