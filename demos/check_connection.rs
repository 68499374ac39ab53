use clap::Parser;
use gpsd_location::{
    client::{Endpoint, Mode, SessionConfig, blocking::Session},
    sink::LatestFix,
};

#[derive(Debug, Parser)]
#[command(version, about = "Check a GPSD server by acquiring one position fix", long_about = None)]
struct Args {
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,
    #[arg(short, long, default_value = "2947")]
    port: u16,
    #[arg(short, long, default_value = "single-fix")]
    mode: Mode,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = SessionConfig::new(Endpoint::new(args.host, args.port), args.mode);
    let mut session = Session::new(config);
    let mut latest = LatestFix::new();

    match session.run(&mut latest) {
        Ok(Some(fix)) => {
            println!("Latitude:  {:.6}", fix.latitude());
            println!("Longitude: {:.6}", fix.longitude());
            println!("Altitude:  {:.1} m", fix.altitude_meters());
            println!("Time:      {}", fix.timestamp());
        }
        Ok(None) => println!("Stopped before a fix was acquired"),
        Err(e) => {
            eprintln!("{}", latest.status_message().unwrap_or_default());
            eprintln!("Session ended in {:?}: {e}", session.state());
            std::process::exit(1);
        }
    }
}
