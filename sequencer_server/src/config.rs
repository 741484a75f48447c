//! Process configuration, parsed from CLI flags or environment variables.

use std::path::PathBuf;

use clap::Parser;

/// Runs the collaborative step-sequencer session server.
#[derive(Debug, Parser)]
#[command(name = "sequencer-server")]
#[command(about = "Session actors and WebSocket collaboration backend for the step sequencer")]
#[command(version)]
pub struct Config {
    /// Address to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "SEQUENCER_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Directory the cold store persists session records under.
    #[arg(long, env = "SEQUENCER_DATA_DIR", default_value = "./data/sessions")]
    pub data_dir: PathBuf,

    /// Seconds of inactivity before an idle session actor flushes to cold
    /// storage and shuts down.
    #[arg(long, env = "SEQUENCER_IDLE_FLUSH_SECS", default_value_t = 300)]
    pub idle_flush_secs: u64,

    /// Maximum number of session records the cold store will hold before
    /// new writes are rejected with a quota error.
    #[arg(long, env = "SEQUENCER_MAX_SESSIONS", default_value_t = 10_000)]
    pub max_sessions: usize,
}

impl Config {
    pub fn from_env() -> Config {
        Config::parse()
    }
}
