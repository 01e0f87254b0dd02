use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use super::app_config::LogLevel;

#[derive(Debug, Parser)]
#[command(
    name = "xavatar",
    version,
    about = "Serves XMPP vCard avatars over HTTP",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", env = "XAVATAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Component address on the XMPP network.
    #[arg(long, env = "XAVATAR_JID")]
    pub jid: Option<String>,

    /// Component shared secret.
    #[arg(long, env = "XAVATAR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// XMPP server host.
    #[arg(long, env = "XAVATAR_HOST")]
    pub host: Option<String>,

    /// XMPP server component port.
    #[arg(long, env = "XAVATAR_PORT")]
    pub port: Option<u16>,

    /// Avatar cache directory.
    #[arg(short, long, value_name = "PATH", env = "XAVATAR_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Assume image/png when an avatar has no MIME type.
    #[arg(long, env = "XAVATAR_GUESS_TYPE")]
    pub guess_type: Option<bool>,

    /// HTTP listen address.
    #[arg(short, long, value_name = "ADDR", env = "XAVATAR_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Age in seconds after which cached avatars are refreshed.
    #[arg(long)]
    pub max_age_secs: Option<u64>,

    /// Seconds to wait for a vCard reply.
    #[arg(long)]
    pub reply_timeout_secs: Option<u64>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Reconnect after the XMPP session drops.
    #[arg(long)]
    pub auto_reconnect: Option<bool>,

    /// Reconnection attempts before giving up.
    #[arg(long)]
    pub max_reconnect_attempts: Option<u32>,
}
