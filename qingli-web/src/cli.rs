use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "qingli",
    version,
    about = "Removes stalled downloads from a Sonarr queue"
)]
pub struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "config/config.json")]
    pub config: PathBuf,

    #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    #[arg(
        long,
        default_value = "info",
        help = "Log level or filter directive (trace, debug, info, warn, error)"
    )]
    pub log_level: String,

    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    #[arg(long, help = "Log to the console only")]
    pub no_log_file: bool,

    #[arg(long, help = "Run the queue monitor without the web interface")]
    pub no_web: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_defaults() {
        let cli = Cli::try_parse_from(["qingli"]).expect("parse");
        assert_eq!(cli.config, PathBuf::from("config/config.json"));
        assert_eq!(cli.listen, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_dir, PathBuf::from("logs"));
        assert!(!cli.no_log_file);
        assert!(!cli.no_web);
    }

    #[test]
    fn test_cli_parses_short_flags() {
        let cli = Cli::try_parse_from(["qingli", "-c", "/etc/qingli.json", "-l", "0.0.0.0:8080"])
            .expect("parse");
        assert_eq!(cli.config, PathBuf::from("/etc/qingli.json"));
        assert_eq!(cli.listen.port(), 8080);
    }

    #[test]
    fn test_cli_parses_monitor_only() {
        let cli = Cli::try_parse_from(["qingli", "--no-web", "--no-log-file", "--log-level", "debug"])
            .expect("parse");
        assert!(cli.no_web);
        assert!(cli.no_log_file);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_cli_rejects_bad_listen_address() {
        assert!(Cli::try_parse_from(["qingli", "--listen", "nowhere"]).is_err());
    }
}
