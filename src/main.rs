use std::sync::Arc;

use bmsbridge::{bridge, BmsClient, Multiplexer};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

/// Query a JBD-style BLE BMS, or bridge it onto a TCP port.
///
/// Without PORT the telemetry is queried once, printed and the process
/// exits. With PORT a TCP server is started instead: clients send raw
/// command bytes and receive the raw response frames.
#[derive(Parser, Debug)]
#[command(name = "bmsbridge", version, about)]
struct Args {
    /// BLE address (or advertised name) of the BMS
    device: String,

    /// TCP listen port for bridge mode
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let client = BmsClient::new(&args.device).await?;

    match args.port {
        Some(port) => {
            let listener = TcpListener::bind(("0.0.0.0", port)).await?;
            info!(
                "BMS server for {} is listening on 0.0.0.0:{port}",
                args.device
            );
            let mux = Arc::new(Multiplexer::new(client.session()));
            bridge::serve(listener, mux).await?;
        }
        None => {
            let telemetry = client.fetch_telemetry().await?;
            for (name, value) in telemetry.fields() {
                println!("{name}: {value}");
            }
            client.stop().await?;
        }
    }

    Ok(())
}
