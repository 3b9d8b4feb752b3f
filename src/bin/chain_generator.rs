//! Offline Crash hash-chain generation job.
//!
//! Run once before any round is played: generates the backward hash chain
//! into RocksDB and prints the terminating hash, which must be published
//! before the seeding event. Safe to re-run after an abort; generation
//! resumes from the last durable checkpoint.

use clap::Parser;
use tracing::info;
use veriplay::{generate_seed, verify_chain_sample, CrashConfig, RocksStore};

#[derive(Parser, Debug)]
#[command(name = "veriplay-chaingen")]
#[command(about = "Generate or audit the Crash hash chain", long_about = None)]
struct Args {
    /// Chain database directory
    #[arg(long, default_value = "./DB/crash_chain")]
    db_path: String,

    /// Number of chain entries to generate
    #[arg(long, default_value = "10000000")]
    length: u64,

    /// Entries per write batch
    #[arg(long, default_value = "5000")]
    batch_size: usize,

    /// Pause between batches in milliseconds (0 = no throttle)
    #[arg(long, default_value = "0")]
    write_throttle_ms: u64,

    /// Chain secret as hex; generated from the OS RNG when omitted.
    /// A resumed run must pass the same secret as the original run.
    #[arg(long)]
    secret: Option<String>,

    /// Instead of generating, spot-check this many links of an existing chain
    #[arg(long)]
    audit_samples: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let store = RocksStore::open(&args.db_path)?;

    if let Some(samples) = args.audit_samples {
        let audit = verify_chain_sample(&store, samples)?;
        println!("🔗 Checked {} links, {} failures", audit.checked_links, audit.link_failures.len());
        for failure in &audit.link_failures {
            println!(
                "   ❌ index {}: SHA256(seed) = {}, stored predecessor = {}",
                failure.index, failure.computed, failure.stored
            );
        }
        if !audit.is_valid() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let secret = args.secret.unwrap_or_else(generate_seed);
    let config = CrashConfig {
        chain_length: args.length,
        batch_size: args.batch_size,
        write_throttle_ms: args.write_throttle_ms,
        house_edge: 0.01,
    };

    info!(length = args.length, batch_size = args.batch_size, "generating chain");
    let meta = veriplay::generate_chain(&store, &secret, &config)?;

    println!("✅ Chain generated: {} entries", meta.length);
    println!("   Terminating hash (publish before play): {}", meta.terminating_hash);
    println!("   Keep the secret offline until the reveal event.");
    Ok(())
}
