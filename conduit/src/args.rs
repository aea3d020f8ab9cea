use std::path::PathBuf;

use clap::Parser;

/// Conduit streaming translation proxy
#[derive(Debug, Parser)]
#[command(name = "conduit", about = "Anthropic Messages front end for chat, responses and agent upstreams")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "conduit.toml", env = "CONDUIT_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "CONDUIT_LISTEN")]
    pub listen: Option<std::net::SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_local_config_file() {
        let args = Args::try_parse_from(["conduit"]).unwrap();

        assert_eq!(args.config, PathBuf::from("conduit.toml"));
        assert!(args.listen.is_none());
    }

    #[test]
    fn listen_override_parses_socket_address() {
        let args = Args::try_parse_from(["conduit", "-c", "/etc/conduit.toml", "--listen", "0.0.0.0:9000"]).unwrap();

        assert_eq!(args.config, PathBuf::from("/etc/conduit.toml"));
        assert_eq!(args.listen, Some("0.0.0.0:9000".parse().unwrap()));
    }
}
