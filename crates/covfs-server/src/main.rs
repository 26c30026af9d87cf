use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// `covfs-server <source_root> <overlay_root>` — anything else is a usage
/// error (spec §6 "Command-line").
struct Cli {
    source_root: PathBuf,
    overlay_root: PathBuf,
}

impl Cli {
    fn parse(mut args: impl Iterator<Item = String>) -> Option<Self> {
        args.next(); // argv[0]
        let source_root = args.next()?;
        let overlay_root = args.next()?;
        if args.next().is_some() {
            return None;
        }
        Some(Cli {
            source_root: PathBuf::from(source_root),
            overlay_root: PathBuf::from(overlay_root),
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("covfs=info")),
        )
        .init();

    let cli = match Cli::parse(std::env::args()) {
        Some(cli) => cli,
        None => {
            eprintln!("usage: covfs-server <source_root> <overlay_root>");
            std::process::exit(255);
        }
    };

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "covfs-server exited with an error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // The network file-access protocol is an out-of-scope collaborator
    // (spec §1); this binary's job ends at constructing the repository and
    // keeping the process alive for whatever dispatcher sits on top of it.
    let _repository = covfs_engine::Repository::new(cli.source_root, cli.overlay_root).await?;

    tracing::info!("covfs-server ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> impl Iterator<Item = String> {
        v.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_exactly_two_positional_args() {
        let cli = Cli::parse(args(&["covfs-server", "/src", "/overlay"])).unwrap();
        assert_eq!(cli.source_root, PathBuf::from("/src"));
        assert_eq!(cli.overlay_root, PathBuf::from("/overlay"));
    }

    #[test]
    fn rejects_too_few_args() {
        assert!(Cli::parse(args(&["covfs-server", "/src"])).is_none());
    }

    #[test]
    fn rejects_too_many_args() {
        assert!(Cli::parse(args(&["covfs-server", "/src", "/overlay", "extra"])).is_none());
    }
}
