use clap::Parser;
use photomesh::{reconstruct, ReconstructionConfig, RemoteConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Reconstruct a colored surface mesh from a directory of overlapping
/// photographs.
#[derive(Parser)]
#[command(name = "photomesh", version, about)]
struct Args {
    /// Directory holding the input images (jpg/jpeg/png/webp).
    image_dir: PathBuf,

    /// Output path for the binary glTF artifact.
    output: PathBuf,

    /// Remote reconstruction service base URL (switches to delegation mode
    /// together with --remote-token).
    #[arg(long)]
    remote_base_url: Option<String>,

    /// Bearer token for the remote service.
    #[arg(long)]
    remote_token: Option<String>,

    /// Seconds between remote status polls.
    #[arg(long)]
    remote_poll_interval: Option<f64>,

    /// Overall remote polling deadline in seconds.
    #[arg(long)]
    remote_max_poll: Option<u64>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut config = ReconstructionConfig::from_env();
    if let (Some(base_url), Some(token)) = (&args.remote_base_url, &args.remote_token) {
        config.remote = Some(RemoteConfig::new(base_url.clone(), token.clone()));
    }
    if let Some(remote) = &mut config.remote {
        if let Some(secs) = args.remote_poll_interval {
            remote.poll_interval = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = args.remote_max_poll {
            remote.max_poll = Duration::from_secs(secs);
        }
    }

    if let Err(err) = reconstruct(&args.image_dir, &args.output, &config) {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
