use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Stencil CLI entrypoint.
///
/// Any `--option` not listed here is handed to the template as a variable.
#[derive(Parser, Debug)]
#[command(
    name = "stencil",
    version,
    about = "Render Blade-style templates from the command line",
    after_help = "Template variables are passed as extra options: --name=Bob --dogs=a --dogs=b --loud"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Force colored output.
    #[arg(long, global = true, conflicts_with = "no_ansi")]
    pub ansi: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_ansi: bool,

    /// Never prompt; questions are answered with "no".
    #[arg(short = 'n', long, global = true)]
    pub no_interaction: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a template file, or every file in a directory.
    Render(RenderArgs),
    /// Empty the compiled files directory.
    Clear(CacheArgs),
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Template file or directory to render.
    pub path: PathBuf,

    /// File or directory to save the output to.
    #[arg(
        long = "save-to",
        value_name = "PATH",
        visible_aliases = ["save-as", "save-directory", "save-dir"]
    )]
    pub save_to: Option<PathBuf>,

    /// Load variables from a JSON file (repeatable).
    #[arg(long = "from-json", value_name = "PATH")]
    pub from_json: Vec<PathBuf>,

    /// Load variables from a YAML file (repeatable).
    #[arg(long = "from-yaml", value_name = "PATH")]
    pub from_yaml: Vec<PathBuf>,

    /// Load variables from an env file (repeatable).
    #[arg(long = "from-env", value_name = "PATH")]
    pub from_env: Vec<PathBuf>,

    /// Overwrite existing files and skip the directory confirmation.
    #[arg(long)]
    pub force: bool,

    /// Print the rendered output instead of writing it.
    #[arg(long)]
    pub dry_run: bool,

    /// Ask this question before rendering and abort unless answered yes.
    #[arg(long, value_name = "MESSAGE")]
    pub confirm: Option<String>,

    /// Strip all trailing whitespace from the output.
    #[arg(long)]
    pub trim: bool,

    /// Keep compiled templates after the render.
    #[arg(long)]
    pub keep_cache: bool,

    #[command(flatten)]
    pub cache: CacheArgs,
}

#[derive(Args, Debug, Default)]
pub struct CacheArgs {
    /// Directory for compiled templates [env: STENCIL_CACHE_PATH].
    #[arg(long, value_name = "PATH")]
    pub cache_path: Option<PathBuf>,

    /// Deprecated alias of --cache-path.
    #[arg(long, value_name = "PATH", hide = true)]
    pub compiled_path: Option<PathBuf>,
}
