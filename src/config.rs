use std::{env, path::PathBuf};

use log::warn;

use crate::{
    cache::CompiledDir,
    cli::CacheArgs,
    engine::{Engine, TeraCompiler, Whitespace},
    paths,
};

pub const CACHE_PATH_ENV: &str = "STENCIL_CACHE_PATH";
pub const LEGACY_CACHE_PATH_ENV: &str = "STENCIL_COMPILED_PATH";
pub const KEEP_CACHE_ENV: &str = "STENCIL_KEEP_CACHE";

/// Everything the render pipeline needs to know about its environment,
/// resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub cache_path: PathBuf,
    pub keep_cache: bool,
    pub whitespace: Whitespace,
}

impl Settings {
    pub fn from_env(cache: &CacheArgs) -> Self {
        Self::resolve(cache, |key| env::var(key).ok())
    }

    /// Cache path precedence: `--cache-path`, `--compiled-path`,
    /// `STENCIL_CACHE_PATH`, `STENCIL_COMPILED_PATH`, then the platform cache
    /// directory.
    pub fn resolve(cache: &CacheArgs, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let from_env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        let cache_path = if let Some(path) = &cache.cache_path {
            path.clone()
        } else if let Some(path) = &cache.compiled_path {
            warn!("--compiled-path is deprecated and will be removed, use --cache-path");
            path.clone()
        } else if let Some(path) = from_env(CACHE_PATH_ENV) {
            path
        } else if let Some(path) = from_env(LEGACY_CACHE_PATH_ENV) {
            warn!("{LEGACY_CACHE_PATH_ENV} is deprecated and will be removed, use {CACHE_PATH_ENV}");
            path
        } else {
            default_cache_path()
        };

        let keep_cache = lookup(KEEP_CACHE_ENV)
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        Self {
            cache_path: paths::clean(&cache_path),
            keep_cache,
            whitespace: Whitespace::default(),
        }
    }

    pub fn keep_cache(mut self, keep: bool) -> Self {
        self.keep_cache |= keep;
        self
    }

    pub fn whitespace(mut self, whitespace: Whitespace) -> Self {
        self.whitespace = whitespace;
        self
    }

    pub fn compiled_dir(&self) -> CompiledDir {
        CompiledDir::new(&self.cache_path, self.keep_cache)
    }

    pub fn engine(&self) -> Engine {
        Engine::new(TeraCompiler::new(self.compiled_dir())).with_stage(self.whitespace)
    }
}

fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("stencil")
        .join("compiled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, path::Path};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn cli_path_beats_environment() {
        let args = CacheArgs {
            cache_path: Some(PathBuf::from("/tmp/cli")),
            compiled_path: Some(PathBuf::from("/tmp/legacy-cli")),
        };
        let settings = Settings::resolve(&args, lookup(&[(CACHE_PATH_ENV, "/tmp/env")]));
        assert_eq!(settings.cache_path, PathBuf::from("/tmp/cli"));
    }

    #[test]
    fn legacy_flag_and_env_still_work() {
        let args = CacheArgs {
            cache_path: None,
            compiled_path: Some(PathBuf::from("/tmp/legacy-cli")),
        };
        let settings = Settings::resolve(&args, lookup(&[]));
        assert_eq!(settings.cache_path, PathBuf::from("/tmp/legacy-cli"));

        let settings = Settings::resolve(
            &CacheArgs::default(),
            lookup(&[
                (LEGACY_CACHE_PATH_ENV, "/tmp/legacy-env"),
                (CACHE_PATH_ENV, "/tmp/env"),
            ]),
        );
        assert_eq!(settings.cache_path, PathBuf::from("/tmp/env"));

        let settings = Settings::resolve(
            &CacheArgs::default(),
            lookup(&[(LEGACY_CACHE_PATH_ENV, "/tmp/legacy-env")]),
        );
        assert_eq!(settings.cache_path, PathBuf::from("/tmp/legacy-env"));
    }

    #[test]
    fn falls_back_to_platform_cache() {
        let settings = Settings::resolve(&CacheArgs::default(), lookup(&[(CACHE_PATH_ENV, " ")]));
        assert!(settings.cache_path.ends_with(Path::new("stencil").join("compiled")));
        assert!(!settings.keep_cache);
    }

    #[test]
    fn keep_cache_from_env_or_flag() {
        let settings = Settings::resolve(&CacheArgs::default(), lookup(&[(KEEP_CACHE_ENV, "TRUE")]));
        assert!(settings.keep_cache);

        let settings = Settings::resolve(&CacheArgs::default(), lookup(&[])).keep_cache(true);
        assert!(settings.keep_cache);
    }
}
