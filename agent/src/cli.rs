//! Command line and environment options
//!
//! Every option can also come from an environment variable named after it in
//! upper snake case (`COUNT`, `WEBSOURCE_URL`, ...). Values given here take
//! precedence over the configuration file.

use crate::config::Config;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pinger-agent")]
#[command(version)]
#[command(about = "Reachability probe agent built on fping", long_about = None)]
pub struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long, env)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, env)]
    pub debug: bool,

    /// Only warnings and errors, no report on stdout
    #[arg(short, long, env)]
    pub quiet: bool,

    /// Keep running, one cycle every `pause` seconds
    #[arg(short, long, env)]
    pub daemon: bool,

    /// Agent name reported in ping_config
    #[arg(long, env)]
    pub name: Option<String>,

    /// Marker file for daemon mode (absolute path)
    #[arg(long, env)]
    pub pidfile: Option<String>,

    /// Write each report to this file (absolute path)
    #[arg(short, long, env)]
    pub output: Option<String>,

    /// Output file format: json or csv
    #[arg(long, env)]
    pub format: Option<String>,

    /// Seconds between cycles (0-3600)
    #[arg(long, env)]
    pub pause: Option<i64>,

    /// Milliseconds between packets (1-10000)
    #[arg(long, env)]
    pub interval: Option<i64>,

    /// Payload size in bytes (8-65488)
    #[arg(long, env)]
    pub size: Option<i64>,

    /// Packets per target (1-100)
    #[arg(long, env)]
    pub count: Option<i64>,

    /// Time to live (1-255)
    #[arg(long, env)]
    pub ttl: Option<i64>,

    /// Retries on total loss (0-10)
    #[arg(long, env)]
    pub retries: Option<i64>,

    /// Allow fragmentation: yes/no
    #[arg(long, env)]
    pub fragment: Option<String>,

    /// Per-packet timeout in milliseconds (10-10000)
    #[arg(long, env)]
    pub timeout: Option<i64>,

    /// Bind probes to this source address
    #[arg(long, env)]
    pub source_address: Option<String>,

    /// Remote target list URL
    #[arg(long, env)]
    pub websource_url: Option<String>,

    /// GET or POST
    #[arg(long, env)]
    pub websource_method: Option<String>,

    /// Extra headers: "Name: value|Other: value"
    #[arg(long, env)]
    pub websource_headers: Option<String>,

    /// Seconds the remote list is cached (60-3600)
    #[arg(long, env)]
    pub websource_interval: Option<i64>,

    /// Cache file for the remote list (absolute path)
    #[arg(long, env)]
    pub websource_cachefile: Option<String>,

    /// Collector URL receiving each report
    #[arg(long, env)]
    pub webhook_url: Option<String>,

    /// Extra headers: "Name: value|Other: value"
    #[arg(long, env)]
    pub webhook_headers: Option<String>,

    /// Cache file for the last successful delivery (absolute path)
    #[arg(long, env)]
    pub webhook_cachefile: Option<String>,

    /// fping binary
    #[arg(long, env)]
    pub fping: Option<String>,

    /// Target addresses or absolute paths to target-list files
    pub targets: Vec<String>,
}

impl Args {
    /// Configuration file (if any) with these options applied on top
    pub fn load_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let config = Config::load(path)?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            None => Config::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    /// Command line and environment override the file
    pub fn apply(self, config: &mut Config) {
        let general = &mut config.general;
        general.daemon |= self.daemon;
        general.quiet |= self.quiet;
        set(&mut general.name, self.name);
        set(&mut general.pidfile, self.pidfile);
        set(&mut general.output, self.output);
        set(&mut general.format, self.format);
        set(&mut general.pause, self.pause);
        set(&mut general.fping, self.fping);

        let probe = &mut config.probe;
        set(&mut probe.interval, self.interval);
        set(&mut probe.size, self.size);
        set(&mut probe.count, self.count);
        set(&mut probe.ttl, self.ttl);
        set(&mut probe.retries, self.retries);
        set(&mut probe.fragment, self.fragment);
        set(&mut probe.timeout, self.timeout);
        set(&mut probe.source_address, self.source_address);

        let websource = &mut config.websource;
        set(&mut websource.url, self.websource_url);
        set(&mut websource.method, self.websource_method);
        set(&mut websource.headers, self.websource_headers);
        set(&mut websource.interval, self.websource_interval);
        set(&mut websource.cachefile, self.websource_cachefile);

        let webhook = &mut config.webhook;
        set(&mut webhook.url, self.webhook_url);
        set(&mut webhook.headers, self.webhook_headers);
        set(&mut webhook.cachefile, self.webhook_cachefile);

        for target in &self.targets {
            config.add_positional(target);
        }
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *field = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsStr;
    use std::io::Write;

    #[test]
    fn test_env_names() {
        let command = Args::command();
        for (id, env) in [
            ("count", "COUNT"),
            ("source_address", "SOURCE_ADDRESS"),
            ("websource_url", "WEBSOURCE_URL"),
            ("websource_headers", "WEBSOURCE_HEADERS"),
            ("webhook_url", "WEBHOOK_URL"),
            ("webhook_cachefile", "WEBHOOK_CACHEFILE"),
        ] {
            let arg = command.get_arguments().find(|a| a.get_id().as_str() == id).unwrap();
            assert_eq!(arg.get_env(), Some(OsStr::new(env)), "{id}");
        }
    }

    #[test]
    fn test_env_and_cli_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[probe]
count = 3
size = 500
ttl = 32

[websource]
url = "http://file.example/targets"
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        // only test in this crate that touches these variables
        unsafe {
            std::env::set_var("COUNT", "7");
            std::env::set_var("WEBSOURCE_URL", "https://env.example/targets");
        }

        let from_env = Args::try_parse_from(["pinger-agent", "--config", path.as_str(), "--size", "64"])
            .unwrap()
            .load_config()
            .unwrap();
        let from_cli = Args::try_parse_from(["pinger-agent", "--config", path.as_str(), "--count", "9"])
            .unwrap()
            .load_config()
            .unwrap();

        unsafe {
            std::env::remove_var("COUNT");
            std::env::remove_var("WEBSOURCE_URL");
        }

        assert_eq!(from_env.probe.count, 7);
        assert_eq!(from_env.probe.size, 64);
        assert_eq!(from_env.probe.ttl, 32);
        assert_eq!(from_env.websource.url, "https://env.example/targets");
        assert_eq!(from_cli.probe.count, 9);
        assert_eq!(from_cli.probe.size, 500);
    }

    #[test]
    fn test_positionals_are_sorted() {
        let mut list = tempfile::NamedTempFile::new().unwrap();
        writeln!(list, "9.9.9.9").unwrap();
        let list_path = list.path().to_str().unwrap().to_string();

        let args = Args::try_parse_from(["pinger-agent", "8.8.8.8", list_path.as_str(), "junk", "2001:DB8::1"]).unwrap();
        let config = args.load_config().unwrap();

        assert_eq!(config.targets.addresses, vec!["8.8.8.8", "2001:DB8::1"]);
        assert_eq!(config.targets.files, vec![list_path]);
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from(["pinger-agent", "-d", "-q", "--fragment", "no"]).unwrap();
        let config = args.load_config().unwrap();
        assert!(config.general.daemon);
        assert!(config.general.quiet);
        assert_eq!(config.probe.fragment, "no");
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let args = Args::try_parse_from(["pinger-agent", "--config", "/nonexistent/pinger.toml"]).unwrap();
        assert!(args.load_config().is_err());
    }
}
