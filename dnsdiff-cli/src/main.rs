//! Command-line front end for `dnsdiff`.
//!
//! Reads a server list from a YAML file, resolves the given domain against
//! every server concurrently, and prints one line per server in input
//! order. All the DNS work lives in the `dnsdiff` library; this binary is
//! argument parsing, file loading, and table rendering.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use dnsdiff::resolve;

#[derive(Parser)]
#[command(name = "dnsdiff")]
#[command(version)]
#[command(
    about = "Resolve a domain against multiple DNS servers and compare the answers",
    long_about = "Sends the same A-record query to every DNS server in the hosts file \
concurrently and prints each server's answer and response time. Servers that \
disagree with the rest are worth a closer look: divergent answers are the \
usual sign of DNS hijacking or cache poisoning."
)]
struct Cli {
    /// Domain name to resolve
    domain: String,

    /// YAML file with the server list (`hosts: ["8.8.8.8", ...]`)
    #[arg(short = 'f', long, value_name = "FILE")]
    hosts: PathBuf,
}

/// Schema of the hosts file.
#[derive(Debug, Deserialize)]
struct HostsFile {
    hosts: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.hosts)
        .with_context(|| format!("could not read hosts file {}", cli.hosts.display()))?;
    let hosts: HostsFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("could not parse hosts file {}", cli.hosts.display()))?;

    let results = resolve(&cli.domain, &hosts.hosts).await;

    println!("DNS results for {}:", cli.domain);
    for result in &results {
        match &result.outcome {
            Ok(ip) => println!(
                "{:<24} {:<16} {:>8} ms",
                result.server,
                ip.to_string(),
                result.elapsed.as_millis()
            ),
            Err(e) => println!("{:<24} error: {}", result.server, e),
        }
    }

    Ok(())
}
