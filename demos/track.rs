use clap::Parser;

use futures::StreamExt;
use gpsd_location::client::{Endpoint, GpsdClient};

#[derive(Debug, Parser)]
#[command(version, about = "Print every position fix reported by GPSD", long_about = None)]
struct Args {
    /// GPSD address, `host` or `host:port`
    #[arg(default_value = "localhost:2947")]
    endpoint: Endpoint,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let client = match GpsdClient::connect(&args.endpoint).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Connection failed: {e}");
            return;
        }
    };

    let mut fixes = client.fixes();
    while let Some(result) = fixes.next().await {
        match result {
            Ok(fix) => println!(
                "{} lat {:10.6} lon {:11.6} alt {:7.1} m",
                fix.timestamp(),
                fix.latitude(),
                fix.longitude(),
                fix.altitude_meters()
            ),
            Err(e) => {
                eprintln!("Error receiving fix: {e}");
                return;
            }
        }
    }
}
