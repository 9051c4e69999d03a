mod blade;
mod cache;
mod cli;
mod config;
mod dotenv;
mod engine;
mod error;
mod options;
mod paths;
mod render;
mod ui;
mod variables;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use colored::Colorize;
use config::Settings;
use engine::Whitespace;
use error::StencilError;
use log::debug;
use render::RenderRequest;
use ui::Console;

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = options::split_args(std::env::args_os());
    let cli = Cli::parse_from(args.known);

    init_logging(&cli);
    if cli.ansi {
        colored::control::set_override(true);
    } else if cli.no_ansi {
        colored::control::set_override(false);
    }
    let console = Console::new(cli.quiet, !cli.no_interaction);

    match cli.command {
        Command::Render(render_args) => {
            let options = options::parse_options(&args.dynamic)?;
            for (name, mode) in options.modes() {
                debug!("template option --{name} ({mode:?})");
            }

            let whitespace = if render_args.trim {
                Whitespace::TrimEnd
            } else {
                Whitespace::Preserve
            };
            let settings = Settings::from_env(&render_args.cache)
                .keep_cache(render_args.keep_cache)
                .whitespace(whitespace);
            debug!("compiled files directory: {}", settings.cache_path.display());

            let request = RenderRequest::from_args(&render_args, &options)?;
            render::run(&request, &settings.engine(), &console)?;
        }
        Command::Clear(cache) => {
            if let Some(token) = args.dynamic.first() {
                return Err(StencilError::InvalidOption(format!(
                    "The '{token}' option does not exist for the clear command."
                ))
                .into());
            }
            let settings = Settings::from_env(&cache);
            let removed = settings.compiled_dir().purge()?;
            debug!("removed {removed} compiled entries");
            console.success(format!(
                "Cleared compiled files directory {}",
                settings.cache_path.display()
            ));
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}
