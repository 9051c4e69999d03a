use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::{
    cli::RenderArgs,
    engine::{Engine, TemplateCompiler},
    error::{Result, StencilError},
    options::ParsedOptions,
    paths,
    ui::{self, Console},
    variables::{self, Sources, Variables},
};

/// A fully resolved `render` invocation.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: PathBuf,
    pub variables: Variables,
    pub save_to: Option<PathBuf>,
    pub force: bool,
    pub dry_run: bool,
    pub confirm: Option<String>,
}

impl RenderRequest {
    /// Validate the input path, then gather variables from every source.
    pub fn from_args(args: &RenderArgs, options: &ParsedOptions) -> Result<Self> {
        let source = paths::clean(&args.path);
        if !source.exists() {
            return Err(StencilError::FileNotFound(source));
        }

        let clean_all =
            |list: &[PathBuf]| -> Vec<PathBuf> { list.iter().map(|p| paths::clean(p)).collect() };
        let sources = Sources {
            yaml: clean_all(&args.from_yaml),
            json: clean_all(&args.from_json),
            env: clean_all(&args.from_env),
        };

        Ok(Self {
            source,
            variables: variables::gather(&sources, options)?,
            save_to: args.save_to.as_deref().map(paths::clean),
            force: args.force,
            dry_run: args.dry_run,
            confirm: args.confirm.clone(),
        })
    }
}

/// Run a render request and return the files written. Compiled templates are
/// cleaned up whether or not the render succeeded.
pub fn run<C: TemplateCompiler>(
    request: &RenderRequest,
    engine: &Engine<C>,
    console: &Console,
) -> Result<Vec<PathBuf>> {
    let result = execute(request, engine, console);
    let finished = engine.finish();
    let written = result?;
    finished?;
    Ok(written)
}

fn execute<C: TemplateCompiler>(
    request: &RenderRequest,
    engine: &Engine<C>,
    console: &Console,
) -> Result<Vec<PathBuf>> {
    if let Some(question) = &request.confirm {
        if !console.confirm(question)? {
            return Err(StencilError::Aborted("Render canceled.".to_string()));
        }
    }

    if request.dry_run {
        dry_run(request, engine, console)?;
        return Ok(Vec::new());
    }

    if request.source.is_dir() {
        render_directory(request, engine, console)
    } else {
        let target = paths::resolve_save_path(&request.source, request.save_to.as_deref())?;
        let written = render_file(engine, &request.source, &target, request, console)?;
        Ok(vec![written])
    }
}

fn dry_run<C: TemplateCompiler>(
    request: &RenderRequest,
    engine: &Engine<C>,
    console: &Console,
) -> Result<()> {
    if !request.source.is_dir() {
        let contents = engine.render(&request.source, &request.variables)?;
        console.dry_run(&request.source, &contents);
        return Ok(());
    }

    let files = discover(&request.source)?;
    let mut failed = 0;
    for file in &files {
        match engine.render(file, &request.variables) {
            Ok(contents) => console.dry_run(file, &contents),
            Err(err) => {
                failed += 1;
                report_failure(console, file, &err);
            }
        }
    }

    if failed > 0 {
        return Err(StencilError::BatchFailed {
            failed,
            total: files.len(),
        });
    }
    Ok(())
}

fn render_file<C: TemplateCompiler>(
    engine: &Engine<C>,
    source: &Path,
    target: &Path,
    request: &RenderRequest,
    console: &Console,
) -> Result<PathBuf> {
    paths::ensure_not_source(source, target)?;
    paths::ensure_can_write(target, request.force)?;

    let contents = engine.render(source, &request.variables)?;

    paths::prepare_parent(target)?;
    fs::write(target, contents).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            StencilError::PermissionDenied(target.to_path_buf())
        }
        _ => StencilError::io(format!("writing {}", target.display()), e),
    })?;

    info!("{} -> {}", source.display(), target.display());
    console.success(format!("Rendered {}", target.display()));
    Ok(target.to_path_buf())
}

fn render_directory<C: TemplateCompiler>(
    request: &RenderRequest,
    engine: &Engine<C>,
    console: &Console,
) -> Result<Vec<PathBuf>> {
    let save_dir = request
        .save_to
        .as_deref()
        .ok_or(StencilError::SaveDirectoryRequired)?;
    paths::ensure_distinct_directories(&request.source, save_dir)?;

    if !request.force {
        let question = format!(
            "Are you sure you want to render ALL files in the '{}' directory?",
            request.source.display()
        );
        if !console.confirm(&question)? {
            let reason = if console.is_interactive() {
                "Render canceled.".to_string()
            } else {
                "Rendering a whole directory needs confirmation, use --force to skip it."
                    .to_string()
            };
            return Err(StencilError::Aborted(reason));
        }
    }

    let files = discover(&request.source)?;
    debug!(
        "rendering {} files from {}",
        files.len(),
        request.source.display()
    );

    let mut written = Vec::new();
    let mut failed = 0;
    for file in &files {
        let outcome = paths::mirror_path(&request.source, file, save_dir)
            .and_then(|target| render_file(engine, file, &target, request, console));
        match outcome {
            Ok(path) => written.push(path),
            Err(err) => {
                failed += 1;
                report_failure(console, file, &err);
            }
        }
    }

    if failed > 0 {
        return Err(StencilError::BatchFailed {
            failed,
            total: files.len(),
        });
    }
    Ok(written)
}

fn report_failure(console: &Console, file: &Path, err: &StencilError) {
    console.failure(format!(
        "Failed to render {}: {}",
        file.display(),
        ui::error_chain(err)
    ));
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Every regular file below `root`, hidden entries skipped, in a stable order.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(|e| {
            StencilError::io(format!("walking {}", root.display()), e.into())
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
