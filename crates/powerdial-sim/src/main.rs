//! Synthetic agent simulator for the power dialer.
//!
//! Spawns a fleet of pretend agents, each on its own task, and drives the
//! engine's event surface the way a telephony stack would: every number the
//! dialer initiates either fails (weighted by `--call-fail`) or connects;
//! one connected call wins the agent, its siblings fail, the call runs for
//! roughly `--call-length` seconds and then ends, which triggers the next
//! round of dialing. At the end of the run the per-agent call report is
//! printed from the persisted records.

use anyhow::Result;
use clap::Parser;
use powerdial_engine::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "powerdial-sim", about = "Drive synthetic agents against the power dialer")]
struct Args {
    /// Number of agents to run
    #[arg(short = 'n', long, default_value_t = 50)]
    num_agents: usize,

    /// Chance of a call failing, 0-100
    #[arg(short = 'f', long, default_value_t = 50)]
    call_fail: u32,

    /// Average call length in seconds
    #[arg(short = 'l', long, default_value_t = 10)]
    call_length: u64,

    /// Time to run the simulation, in seconds
    #[arg(short = 't', long, default_value_t = 300)]
    time_to_run: u64,

    /// Wipe the call record table first
    #[arg(short = 'c', long, default_value_t = false)]
    clean_start: bool,

    /// Emit the final report as JSON instead of plain text
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Call record database path
    #[arg(long)]
    database: Option<String>,
}

/// One pretend agent working the dialer.
struct SimAgent {
    agent_id: String,
    failure_rate: u32,
    call_length: u64,
    engine: Arc<DialerEngine>,
    running: Arc<AtomicBool>,
    rng: SmallRng,
}

impl SimAgent {
    fn login(&self) -> Vec<String> {
        let mut session = self.engine.session(&self.agent_id);
        session.on_agent_login();
        session.numbers
    }

    fn logout(&self) {
        let mut session = self.engine.session(&self.agent_id);
        session.on_agent_logout();
    }

    /// Roll the dice for each dialed number.
    fn split_outcomes(&mut self, numbers: Vec<String>) -> (Vec<String>, Vec<String>) {
        let mut connected = Vec::new();
        let mut failed = Vec::new();
        for number in numbers {
            if self.rng.gen_range(1..=100) <= self.failure_rate {
                failed.push(number);
            } else {
                connected.push(number);
            }
        }
        (connected, failed)
    }

    /// Report each failure; collect the replacement dials.
    fn fail_numbers(&self, failed: &[String]) -> Vec<String> {
        let mut replacements = Vec::new();
        for number in failed {
            let mut session = self.engine.session(&self.agent_id);
            session.on_call_failed(number);
            replacements.extend(session.numbers);
        }
        replacements
    }

    /// Connect the first number; its siblings lose the race and fail.
    fn take_call(&self, connected: &[String]) -> String {
        let number = connected[0].clone();
        let mut session = self.engine.session(&self.agent_id);
        session.on_call_started(&number);
        for sibling in &connected[1..] {
            let mut session = self.engine.session(&self.agent_id);
            session.on_call_failed(sibling);
        }
        number
    }

    fn end_call(&self, number: &str) -> Vec<String> {
        let mut session = self.engine.session(&self.agent_id);
        session.on_call_ended(number);
        session.numbers
    }

    async fn run(mut self) {
        info!("{} logging in", self.agent_id);
        let numbers = self.login();
        let mut total = numbers.len();
        let mut total_failed = 0usize;
        let (mut connected, mut failed) = self.split_outcomes(numbers);

        while self.running.load(Ordering::Relaxed) {
            total_failed += failed.len();
            let mut new_calls = self.fail_numbers(&failed);
            total += new_calls.len();

            if !connected.is_empty() {
                info!("{} moving onto a call", self.agent_id);
                // Whatever was just dialed fails underneath the connect
                total_failed += new_calls.len();
                self.fail_numbers(&new_calls);
                let number = self.take_call(&connected);

                let length = self.call_length as f64 * self.rng.gen_range(0.9..=1.25);
                let length = Duration::from_secs_f64(length);
                info!("{} call length will be {:.1}s", self.agent_id, length.as_secs_f64());
                tokio::time::sleep(length).await;

                new_calls = self.end_call(&number);
                total += new_calls.len();
            }
            (connected, failed) = self.split_outcomes(new_calls);
        }

        info!(
            "{}: total calls {}, failure rate {:.2}",
            self.agent_id,
            total,
            total_failed as f64 / total.max(1) as f64
        );
        self.logout();
        info!("{} done", self.agent_id);
    }
}

fn default_database_path() -> String {
    std::env::temp_dir()
        .join("powerdialer.db")
        .to_string_lossy()
        .into_owned()
}

async fn report(engine: &DialerEngine, json: bool) -> Result<()> {
    let rows = engine.record_store().agent_report().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in rows {
        println!(
            "Agent: {:10} # Calls: {:3}, Avg Call Time: {:5.2}s",
            row.agent_id, row.calls, row.avg_call_seconds
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let database = args.database.clone().unwrap_or_else(default_database_path);
    let config = DialerConfig::default().with_database_path(database.as_str());
    let engine = Arc::new(DialerEngine::new(config).await?);

    if args.clean_start {
        engine.record_store().clear().await?;
    }

    println!(
        "Starting {} agents for {} seconds",
        args.num_agents, args.time_to_run
    );

    let running = Arc::new(AtomicBool::new(true));
    let mut handles = Vec::new();
    for i in 1..=args.num_agents {
        let agent = SimAgent {
            agent_id: format!("agent_{i:04}"),
            failure_rate: args.call_fail,
            call_length: args.call_length,
            engine: Arc::clone(&engine),
            running: Arc::clone(&running),
            rng: SmallRng::from_entropy(),
        };
        handles.push(tokio::spawn(agent.run()));
    }

    tokio::time::sleep(Duration::from_secs(args.time_to_run)).await;
    running.store(false, Ordering::Relaxed);
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Agent task failed: {}", e);
        }
    }

    // Drain the completion queue so the report sees every record
    engine.shutdown().await;
    report(&engine, args.json).await?;
    Ok(())
}
