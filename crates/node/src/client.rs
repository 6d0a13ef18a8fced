//! Plain wire-protocol clients behind the `load` and `query` subcommands.
//!
//! Both connect to a single ring member and speak the line protocol
//! directly; routing to the owning member happens inside the ring.

use std::path::Path;

use anyhow::Context;
use ringlet_core::dht::RingId;
use ringlet_core::message;
use ringlet_core::net::Conn;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

async fn connect(address: &str, port: u16) -> anyhow::Result<Conn> {
    let position = RingId::of(&format!("{address}:{port}"));
    println!(
        "Connecting to node {address}, port {port}, position {} ({position})",
        position.to_hex()
    );
    Conn::open(address, port)
        .await
        .with_context(|| format!("cannot connect to {address}:{port}"))
}

/// Bulk-load `key:value` lines from `path` into the ring member at
/// `address:port`, printing every reply.
///
/// Blank lines are skipped silently; lines without a `:` separator are
/// skipped with a warning.
pub async fn load_file(address: &str, port: u16, path: &Path) -> anyhow::Result<()> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let mut conn = connect(address, port).await?;

    println!("starting to load data from {}", path.display());
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            tracing::warn!("skipping line without a key:value separator: {line}");
            continue;
        };
        let reply = conn.call(&message::put_value(key, value)).await?;
        println!("{reply}");
    }
    println!("loaded data into the ring");
    Ok(())
}

/// Interactive lookup loop against the ring member at `address:port`.
///
/// One key per console line; stops at `quit` or end of input.
pub async fn query_loop(address: &str, port: u16) -> anyhow::Result<()> {
    let mut conn = connect(address, port).await?;
    let mut console = BufReader::new(tokio::io::stdin()).lines();

    println!("Please enter your search key (or type \"quit\" to leave):");
    while let Some(line) = console.next_line().await? {
        let key = line.trim();
        if key == "quit" {
            break;
        }
        if !key.is_empty() {
            let reply = conn.call(&message::find_value(key)).await?;
            println!("Received: {reply}");
        }
        println!("Please enter your search key (or type \"quit\" to leave):");
    }
    Ok(())
}
