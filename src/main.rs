use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::io::Write;
use std::path::PathBuf;

use luapack::bundler::Bundler;
use luapack::config::Config;
use luapack::mangler::MangleMode;

#[derive(Parser)]
#[command(author, version, about = "Flattening module bundler for Lua", long_about = None)]
struct Cli {
    /// Entry point Lua script
    entry: PathBuf,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit minified output
    #[arg(long)]
    minify: bool,

    /// Shorten every top-level identifier (implies a minify-time pass)
    #[arg(long, conflicts_with = "automangle")]
    mangle: bool,

    /// Shorten only bundler-generated identifiers
    #[arg(long)]
    automangle: bool,

    /// Define a textual substitution, NAME=VALUE (repeatable)
    #[arg(short = 'd', long = "define", value_name = "NAME=VALUE")]
    define: Vec<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("starting luapack");

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.minify {
        config.minify = true;
    }
    if cli.mangle {
        config.mangle = MangleMode::Mangle;
    }
    if cli.automangle {
        config.mangle = MangleMode::Auto;
    }
    for pair in &cli.define {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid define '{}': expected NAME=VALUE", pair))?;
        config.define.insert(name.to_string(), value.to_string());
    }
    debug!("configuration: {:?}", config);

    let bundler = Bundler::new(config);
    match &cli.output {
        Some(output) => bundler.bundle_to_file(&cli.entry, output)?,
        None => {
            let bundled = bundler.bundle(&cli.entry)?;
            std::io::stdout().write_all(bundled.as_bytes())?;
        }
    }

    Ok(())
}
