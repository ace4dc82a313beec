//! Httptap CLI: fetch a URL through the instrumented client and print the
//! captured exchange

use std::process;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use http_body_util::BodyExt;
use tracing_subscriber::EnvFilter;

use httptap::{CapturedClient, Interceptor, Record};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("httptap v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: httptap <url> [method] [body]");
        eprintln!();
        eprintln!("Sends one request and prints the record captured off the wire.");
        process::exit(1);
    }

    let url = args[1].clone();
    let method = args.get(2).cloned().unwrap_or_else(|| "GET".to_string());
    let body = args.get(3).cloned().unwrap_or_default();

    let interceptor = Interceptor::new();
    interceptor.enable();

    let (tx, rx) = mpsc::channel::<Record>();
    interceptor.subscribe(move |record| {
        tx.send(record.clone())?;
        Ok(())
    });

    let client = CapturedClient::https(interceptor)?;
    let response = client.send(&method, &url, &[], body).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    println!("{} ({} bytes)", status, bytes.len());

    let record = rx
        .recv_timeout(Duration::from_secs(5))
        .context("no record was captured for the exchange")?;
    print_record(&record);

    Ok(())
}

fn print_record(record: &Record) {
    println!();
    println!(
        "{} {}://{}{}",
        record.request.method, record.request.scheme, record.request.host, record.request.path
    );
    for (name, value) in &record.request.headers {
        println!("  {name}: {value}");
    }
    println!(
        "  [request body: {} bytes in {} chunk(s)]",
        record.request_body_bytes().len(),
        record.request_body.len()
    );
    println!();
    println!("{} {}", record.response.status, record.response.status_message);
    for (name, value) in &record.response.headers {
        println!("  {name}: {value}");
    }
    println!(
        "  [response body: {} bytes in {} chunk(s)]",
        record.response_body_bytes().len(),
        record.response_body.len()
    );
}
