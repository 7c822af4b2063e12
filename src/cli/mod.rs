//! CLI Module
//!
//! Command-line interface for the entrainment engine.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Entrain - binaural and isochronic entrainment engine
#[derive(Parser, Debug)]
#[command(name = "entrain")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where a protocol comes from
#[derive(Args, Debug, Clone)]
pub struct ProtocolSource {
    /// Built-in protocol id
    #[arg(short, long, conflicts_with = "file")]
    pub protocol: Option<String>,

    /// Protocol JSON file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Session duration in seconds (defaults to the protocol's own)
    #[arg(short, long)]
    pub duration: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the built-in protocols
    #[command(name = "protocols")]
    Protocols {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a protocol file
    #[command(name = "validate")]
    Validate {
        /// Path to the protocol JSON
        path: PathBuf,
    },

    /// Render a session offline to a WAV file
    #[command(name = "render")]
    Render {
        #[command(flatten)]
        source: ProtocolSource,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,

        /// Timbre preset
        #[arg(long)]
        preset: Option<String>,

        /// Ambient noise type (white, pink, brown)
        #[arg(long)]
        noise: Option<String>,

        /// Ambient noise volume
        #[arg(long, default_value_t = 0.2)]
        noise_volume: f32,

        /// Isochronic pulse intensity (enables the pulse)
        #[arg(long)]
        isochronic: Option<f32>,
    },

    /// Run a session on a simulated clock and print state as JSON lines
    #[command(name = "simulate")]
    Simulate {
        #[command(flatten)]
        source: ProtocolSource,

        /// Seconds between snapshots
        #[arg(short, long, default_value_t = 1.0)]
        step: f64,

        /// Directory receiving session records
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Manage the persistence spool
    #[command(name = "spool", subcommand)]
    Spool(SpoolCommands),

    /// Write the default configuration
    #[command(name = "init-config")]
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum SpoolCommands {
    /// List spooled records
    #[command(name = "list")]
    List {
        /// Spool directory
        #[arg(long)]
        spool: PathBuf,
    },

    /// Deliver spooled records to a store directory
    #[command(name = "retry")]
    Retry {
        /// Spool directory
        #[arg(long)]
        spool: PathBuf,

        /// Store directory
        #[arg(long)]
        store: PathBuf,
    },
}
