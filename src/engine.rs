//! Rendering facade. Templates are translated to tera syntax, evaluated by
//! tera, then passed through the output stages.

use std::{
    error::Error as _,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use log::{debug, trace};
use regex::Regex;
use tera::{Context as TeraContext, Tera};

use crate::{
    blade,
    cache::CompiledDir,
    error::{Result, StencilError},
    paths,
    variables::{Variables, flag_name},
};

static UNDEFINED_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Variable `([^`]+)` not found in context(?: while rendering '([^']*)')?")
        .expect("undefined variable pattern is valid")
});

/// A template file and its raw contents.
#[derive(Debug, Clone)]
pub struct Template {
    path: PathBuf,
    source: String,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(StencilError::FileNotFound(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)
            .map_err(|e| StencilError::io(format!("reading {}", path.display()), e))?;
        Ok(Self {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Turns a template plus variables into rendered text.
pub trait TemplateCompiler {
    fn compile(&self, template: &Template, vars: &Variables) -> Result<String>;

    /// Release any scratch state once rendering is over.
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Post-processing applied to compiled output.
pub trait OutputStage {
    fn apply(&self, template: &Template, output: String) -> String;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Whitespace {
    /// Leave the output as rendered, except that its trailing line breaks
    /// follow the template's own.
    #[default]
    Preserve,
    /// Drop all trailing whitespace.
    TrimEnd,
}

fn is_line_break(c: char) -> bool {
    c == '\n' || c == '\r'
}

impl OutputStage for Whitespace {
    fn apply(&self, template: &Template, output: String) -> String {
        match self {
            Whitespace::Preserve => {
                let source = template.source();
                let ending = &source[source.trim_end_matches(is_line_break).len()..];
                let mut out = output.trim_end_matches(is_line_break).to_string();
                out.push_str(ending);
                out
            }
            Whitespace::TrimEnd => output.trim_end().to_string(),
        }
    }
}

/// Translated sources for one render plus what they read in conditions.
#[derive(Debug, Default)]
struct Compilation {
    templates: Vec<(String, String)>,
    /// `(template name, variable)` pairs from `@if`-style conditions.
    conditions: Vec<(String, String)>,
    exempt: Vec<String>,
}

impl Compilation {
    /// tera reads an undefined name in a condition as false; report it
    /// instead, the way an echo of the same name would be.
    fn ensure_conditions_defined(&self, vars: &Variables) -> Result<()> {
        let missing = self
            .conditions
            .iter()
            .find(|(_, name)| vars.get(name).is_none() && !self.exempt.contains(name));
        match missing {
            Some((file, name)) => Err(StencilError::UndefinedVariable {
                name: name.clone(),
                flag: flag_name(name),
                file: file.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Compiler backed by tera. Every call re-reads and re-translates its inputs.
#[derive(Debug)]
pub struct TeraCompiler {
    compiled: CompiledDir,
}

impl TeraCompiler {
    pub fn new(compiled: CompiledDir) -> Self {
        Self { compiled }
    }

    /// Translate `source` and everything it includes. Include paths are
    /// relative to `root`, the directory of the template being rendered.
    fn register(
        &self,
        root: &Path,
        name: &str,
        path: &Path,
        source: &str,
        chain: &mut Vec<PathBuf>,
        compilation: &mut Compilation,
    ) -> Result<()> {
        let translation = blade::translate(source).map_err(|e| StencilError::Compile {
            file: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.compiled.write(path, &translation.source)?;
        compilation.templates.push((name.to_string(), translation.source));
        compilation.conditions.extend(
            translation
                .conditions
                .into_iter()
                .map(|var| (name.to_string(), var)),
        );
        compilation.exempt.extend(translation.exempt);

        chain.push(path.to_path_buf());
        for include in &translation.includes {
            let include_path = root.join(include);
            if !include_path.is_file() {
                return Err(StencilError::FileNotFound(include_path));
            }
            if !paths::is_within(&include_path, root)? {
                return Err(StencilError::Compile {
                    file: path.to_path_buf(),
                    message: format!("included file '{include}' is outside {}", root.display()),
                });
            }
            for ancestor in chain.iter() {
                if paths::same_path(ancestor, &include_path)? {
                    return Err(StencilError::Compile {
                        file: path.to_path_buf(),
                        message: format!("include cycle detected at '{include}'"),
                    });
                }
            }
            if compilation
                .templates
                .iter()
                .any(|(registered, _)| registered == include)
            {
                continue;
            }

            trace!("including {}", include_path.display());
            let included = fs::read_to_string(&include_path)
                .map_err(|e| StencilError::io(format!("reading {}", include_path.display()), e))?;
            self.register(root, include, &include_path, &included, chain, compilation)?;
        }
        chain.pop();
        Ok(())
    }
}

impl TemplateCompiler for TeraCompiler {
    fn compile(&self, template: &Template, vars: &Variables) -> Result<String> {
        let path = paths::absolute(template.path())?;
        let root = path.parent().unwrap_or_else(|| Path::new("/")).to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "template".to_string());

        let mut compilation = Compilation::default();
        self.register(
            &root,
            &name,
            &path,
            template.source(),
            &mut Vec::new(),
            &mut compilation,
        )?;
        debug!(
            "registered {} template(s) for {}",
            compilation.templates.len(),
            path.display()
        );

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        let sources = compilation
            .templates
            .iter()
            .map(|(name, source)| (name.as_str(), source.as_str()));
        tera.add_raw_templates(sources)
            .map_err(|e| compile_error(&path, &e))?;

        let ctx = TeraContext::from_serialize(vars).map_err(|e| compile_error(&path, &e))?;
        let output = tera
            .render(&name, &ctx)
            .map_err(|e| render_error(&path, &e))?;
        compilation.ensure_conditions_defined(vars)?;
        Ok(output)
    }

    fn finish(&self) -> Result<()> {
        self.compiled.finish()
    }
}

fn error_chain(err: &tera::Error) -> Vec<String> {
    let mut messages = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        messages.push(inner.to_string());
        source = inner.source();
    }
    messages
}

fn compile_error(path: &Path, err: &tera::Error) -> StencilError {
    StencilError::Compile {
        file: path.to_path_buf(),
        message: error_chain(err).join(": "),
    }
}

/// Map tera's missing variable error onto `UndefinedVariable`; anything else
/// is a compile error.
fn render_error(path: &Path, err: &tera::Error) -> StencilError {
    let messages = error_chain(err);
    for message in &messages {
        let Some(caps) = UNDEFINED_VARIABLE.captures(message) else {
            continue;
        };
        let name = caps[1].to_string();
        let root = name
            .split(|c: char| c == '.' || c == '[')
            .next()
            .unwrap_or(name.as_str())
            .to_string();
        let file = caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| path.display().to_string());
        return StencilError::UndefinedVariable {
            flag: flag_name(&root),
            name,
            file,
        };
    }
    StencilError::Compile {
        file: path.to_path_buf(),
        message: messages.join(": "),
    }
}

/// Compiler plus output pipeline.
pub struct Engine<C = TeraCompiler> {
    compiler: C,
    stages: Vec<Box<dyn OutputStage>>,
}

impl<C: TemplateCompiler> Engine<C> {
    pub fn new(compiler: C) -> Self {
        Self {
            compiler,
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: impl OutputStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn render(&self, path: &Path, vars: &Variables) -> Result<String> {
        let template = Template::load(path)?;
        debug!("rendering {}", path.display());
        let output = self.compiler.compile(&template, vars)?;
        Ok(self
            .stages
            .iter()
            .fold(output, |out, stage| stage.apply(&template, out)))
    }

    pub fn finish(&self) -> Result<()> {
        self.compiler.finish()
    }
}
