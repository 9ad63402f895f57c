use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meltdown_core::config::Settings;
use meltdown_core::pipeline::{RunOptions, Services};

#[derive(Debug, Parser)]
#[command(name = "meltdown_worker")]
struct Args {
    /// Post replies and publish the snapshot. Without it the run is a dry run.
    #[arg(long)]
    live: bool,

    /// Export the recorded rows to CSV after the run.
    #[arg(long)]
    machine_learning: bool,

    /// Seed for the synthetic scores and phrase choice (dry runs become reproducible).
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn options(&self) -> RunOptions {
        RunOptions {
            testing: !self.live,
            machine_learning: self.machine_learning,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let opts = args.options();

    let services = Services::from_settings(&settings).await?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match services
        .run_once(&settings, opts, &mut rng, chrono::Utc::now())
        .await
    {
        Ok(Some(report)) => {
            for err in &report.recovered {
                sentry_anyhow::capture_anyhow(&anyhow::anyhow!("{err}"));
            }
            tracing::info!(
                testing = opts.testing,
                new_items = report.new_items,
                replies = report.replies.len(),
                recovered = report.recovered.len(),
                average = report.snapshot.average_score,
                trending = report.trending_toward_meltdown,
                "run finished"
            );
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "run aborted");
            Err(err)
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
