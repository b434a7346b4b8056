use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "taskwire",
    about = "live event stream client for multi-agent orchestration backends",
    version
)]
pub struct Args {
    /// Task id whose event channel to attach to
    #[arg(short, long)]
    pub task_id: String,

    /// Base HTTP(S) URL of the orchestration backend
    #[arg(short, long, default_value = "http://localhost:8000/")]
    pub url: String,

    /// Use the push-only SSE stream instead of the bidirectional WebSocket
    #[arg(long)]
    pub push_only: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9091")]
    pub metrics_port: u16,

    /// Reconnection delay in milliseconds
    #[arg(long, default_value = "3000")]
    pub reconnect_delay_ms: u64,

    /// Maximum number of reconnection attempts after an unclean close
    #[arg(long, default_value = "5")]
    pub max_reconnects: u32,

    /// Heartbeat ping interval in seconds (bidirectional channel only)
    #[arg(long, default_value = "30")]
    pub heartbeat_interval: u64,

    /// Output format: table, json, minimal
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - suppress connection status lines
    #[arg(long)]
    pub quiet: bool,
}
