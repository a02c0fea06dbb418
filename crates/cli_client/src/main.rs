//! Command-line client for the Quadsum server
//! Logs in, streams the given vectors and prints one sum per vector.

use anyhow::{Context, Result};
use clap::Parser;
use quadsum_core::{ComputeClient, LoginOutcome};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quadsum-client", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Server address
    #[arg(short, long)]
    connect: SocketAddr,
    #[arg(short, long)]
    user: String,
    #[arg(short, long)]
    password: String,
    /// Comma-separated i32 elements, repeat for more vectors ("" for empty)
    #[arg(short, long = "vector", allow_hyphen_values = true)]
    vectors: Vec<String>,
    /// Deadline in seconds for every receive/send (0 disables)
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

fn parse_vector(spec: &str) -> Result<Vec<i32>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i32>().with_context(|| format!("invalid element {:?}", s)))
        .collect()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let vectors = args
        .vectors
        .iter()
        .map(|spec| parse_vector(spec))
        .collect::<Result<Vec<_>>>()?;
    let timeout = (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs));

    tracing::debug!("Connecting to {}", args.connect);
    let stream = TcpStream::connect(args.connect)
        .await
        .with_context(|| format!("connect {}", args.connect))?;
    let mut client = ComputeClient::new(stream, timeout);

    let outcome = client.login(&args.user, &args.password).await?;
    tracing::debug!("Login as {}: {:?}", args.user, outcome);
    match outcome {
        LoginOutcome::Accepted => println!("Authenticated as {}", args.user),
        LoginOutcome::UnknownUser => {
            eprintln!("Server does not know user {}", args.user);
            return Ok(ExitCode::from(1));
        }
        LoginOutcome::WrongSecret => {
            eprintln!("Wrong password for {}", args.user);
            return Ok(ExitCode::from(1));
        }
    }

    tracing::info!("Sending {} vectors", vectors.len());
    client.begin_batch(vectors.len() as u32).await?;
    for (i, vector) in vectors.iter().enumerate() {
        let sum = client
            .compute(vector)
            .await
            .with_context(|| format!("vector {}", i))?;
        println!("vector[{}] = {}", i, sum);
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_vector("-1, 4 ,-9").unwrap(), vec![-1, 4, -9]);
        assert!(parse_vector("").unwrap().is_empty());
        assert!(parse_vector("1,x").is_err());
        assert!(parse_vector("2147483648").is_err());
    }

    #[test]
    fn test_args_accept_negative_vectors() {
        let args = Args::try_parse_from([
            "quadsum-client", "-c", "127.0.0.1:9000", "-u", "alice", "-p", "secret123",
            "-v", "-1,2", "--vector", "3",
        ])
        .unwrap();
        assert_eq!(args.vectors, vec!["-1,2".to_string(), "3".to_string()]);
    }
}
