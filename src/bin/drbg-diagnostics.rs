// SPDX-License-Identifier: MIT

//! Sample a generator and report chi-square, runs and
//! Kolmogorov-Smirnov statistics over its output.
use chacha_drbg::{
    chacha::{DEFAULT_RESEED_INTERVAL, DEFAULT_RESEED_INTERVAL_BYTES},
    diagnostics::Report,
    Error, SharedDrbg,
};
use clap::Parser;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "drbg-diagnostics")]
#[command(about = "Statistical diagnostics for chacha-drbg output")]
#[command(version)]
struct Cli {
    /// Number of output bytes to sample
    #[arg(long, default_value_t = 200_000)]
    bytes: usize,

    /// Reseed after this many output bytes (raised to at least 65536)
    #[arg(long, default_value_t = DEFAULT_RESEED_INTERVAL_BYTES)]
    reseed_interval_bytes: u64,

    /// Reseed after this many seconds
    #[arg(long, default_value_t = DEFAULT_RESEED_INTERVAL.as_secs_f64())]
    reseed_interval_secs: f64,

    /// Extra seed material mixed into the initial state
    #[arg(long)]
    extra_seed: Option<String>,

    /// Draw the sample one byte per request instead of in one fill
    #[arg(long)]
    bytewise: bool,
}

fn sample(cli: &Cli) -> Result<Vec<u8>, Error> {
    let rng = SharedDrbg::new(
        cli.reseed_interval_bytes,
        cli.reseed_interval_secs,
        cli.extra_seed.as_deref().map(str::as_bytes),
    )?;
    log::info!("sampling {} bytes", cli.bytes);
    if cli.bytewise {
        let mut samples = Vec::with_capacity(cli.bytes);
        for _ in 0..cli.bytes {
            samples.extend(rng.next_bytes(1)?);
        }
        return Ok(samples);
    }
    let mut samples = vec![0u8; cli.bytes];
    rng.fill_bytes(&mut samples)?;
    Ok(samples)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let samples = match sample(&cli) {
        Ok(samples) => samples,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };
    let report = Report::from_bytes(&samples);
    println!("chacha-drbg statistical diagnostics");
    println!("{report}");
    if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
