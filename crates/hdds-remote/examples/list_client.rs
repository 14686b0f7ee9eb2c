// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic

/// Remote List Example for HDDS Remote
///
/// Demonstrates:
/// - Connecting a Session to a running `hdds-remote-server`
/// - Creating a remote List through the factory
/// - Mutating it through its proxy
/// - Sharing the server's `counter` instance
///
/// Start the server first:
///
/// ```bash
/// cargo run -p hdds-remote --bin hdds-remote-server
/// cargo run -p hdds-remote --example list_client -- localhost 5000
/// ```
use hdds_remote::{ClientConfig, RemoteValue, Session, Value, DEFAULT_PORT};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };

    println!("=== HDDS Remote List Example ===\n");

    let session = Session::connect(ClientConfig::new(host, port))?;
    println!("[OK] Connected to {}", session.peer_addr());
    println!("[OK] Server types: {}", session.list_types()?.join(", "));

    // Create a list on the remote server
    let list = session.factory("List")?;
    println!("[OK] Created {:?}", list);

    for item in [
        RemoteValue::from(1.1),
        RemoteValue::from("1.1"),
        RemoteValue::from(1),
        Value::List(vec![]),
        Value::Map(vec![]),
    ] {
        list.call("append", &[item])?;
    }
    println!("{}", list.to_text()?);

    println!("\n--- Shared Counter ---");
    let counter = session.instance("counter")?;
    let value = counter.call("increment", &[])?;
    println!("counter = {:?} (shared by every client)", value);

    println!("\n[OK] Done, {} proxy(ies) live", session.proxy_count());
    Ok(())
}
