//! spindle-demo - a walkthrough of spinners, progress, nesting and failure
//!
//! Run with `RUST_LOG=debug` to see the registry's session bookkeeping
//! printed above the spinner line.

use std::io::Write;
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use spindle::{ProgressSpinner, Registry, Spinner};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spindle-demo")]
#[command(version, about = "Walk through spindle's terminal spinners")]
struct Cli {
    /// Scenario to run
    #[arg(long, value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    /// Pace multiplier; 2.0 halves every pause
    #[arg(long, env = "SPINDLE_DEMO_SPEED", default_value_t = 1.0, value_parser = parse_speed)]
    speed: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Download counter from 0% to 100%
    Progress,
    /// Output interleaved with a spinner, plus a nested spinner
    Training,
    /// Two nested spinners with interim messages
    Nested,
    /// Async work that can be interrupted with Ctrl-C
    Fetch,
    /// A spinner whose work fails
    Failure,
    /// Everything above, in order
    All,
}

fn parse_speed(raw: &str) -> Result<f64, String> {
    let speed: f64 = raw.parse().map_err(|_| format!("not a number: {raw}"))?;
    if speed.is_finite() && speed > 0.0 {
        Ok(speed)
    } else {
        Err("speed must be a positive number".to_string())
    }
}

#[derive(Clone, Copy, Debug)]
struct Pace(f64);

impl Pace {
    fn scaled(self, secs: f64) -> Duration {
        Duration::from_secs_f64(secs / self.0)
    }

    fn pause(self, secs: f64) {
        thread::sleep(self.scaled(secs));
    }
}

fn progress(pace: Pace) -> Result<()> {
    ProgressSpinner::new("Downloading MNIST").run(|spin| -> Result<()> {
        pace.pause(1.0);
        spin.update(0, Some(100))?;
        for _ in 0..100 {
            pace.pause(0.05);
            spin.update(1, Some(100))?;
        }
        Ok(())
    })
}

fn training(pace: Pace) -> Result<()> {
    Spinner::new("Training").run(|spin| -> Result<()> {
        spin.display("A very long line that the spinner has to carry along")?;
        pace.pause(2.0);
        writeln!(spindle::stderr(), "epoch 1: loss went up, writing this to stderr")?;
        pace.pause(2.0);
        writeln!(spindle::stdout(), "Whatever.")?;
        pace.pause(2.0);
        writeln!(spindle::stderr(), "epoch 2: another line for stderr")?;
        writeln!(spindle::stdout(), "This never gets old.")?;
        pace.pause(2.0);

        Spinner::new("Below Training").run(|_| -> Result<()> {
            pace.pause(2.0);
            writeln!(spindle::stdout(), "Nested output works too!")?;
            pace.pause(1.0);
            Ok(())
        })
    })
}

fn nested(pace: Pace) -> Result<()> {
    Spinner::new("Preparing samples").run(|_| -> Result<()> {
        pace.pause(1.0);
        Spinner::new("Loading batch").run(|batch| -> Result<()> {
            for idx in 1..=3 {
                batch.display(format!("Loading batch {idx}/3..."))?;
                pace.pause(0.5);
            }
            Ok(())
        })?;
        info!("batches loaded");
        pace.pause(1.0);
        Ok(())
    })
}

async fn fetch(pace: Pace) -> Result<()> {
    Spinner::new("Fetching shards")
        .run_async(|handle| async move {
            for shard in 1..=3 {
                handle.display(format!("Fetching shard {shard}/3..."))?;
                tokio::time::sleep(pace.scaled(0.7)).await;
            }
            Ok::<_, anyhow::Error>(())
        })
        .await
}

fn failure(pace: Pace) -> Result<()> {
    Spinner::new("Loading TensorFlow").run(|_| -> Result<()> {
        pace.pause(2.0);
        bail!("TensorFlow exploded!")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log lines go through the registry so they never tear a spinner
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(Registry::global().clone())
        .init();

    let scenarios = match cli.scenario {
        Scenario::All => vec![
            Scenario::Progress,
            Scenario::Training,
            Scenario::Nested,
            Scenario::Fetch,
            Scenario::Failure,
        ],
        one => vec![one],
    };

    let pace = Pace(cli.speed);
    for scenario in scenarios {
        info!(?scenario, "starting scenario");
        let work: fn(Pace) -> Result<()> = match scenario {
            Scenario::Progress => progress,
            Scenario::Training => training,
            Scenario::Nested => nested,
            Scenario::Failure => failure,
            Scenario::Fetch => {
                fetch(pace).await?;
                continue;
            }
            // Expanded above
            Scenario::All => continue,
        };
        tokio::task::spawn_blocking(move || work(pace)).await??;
    }
    Ok(())
}
