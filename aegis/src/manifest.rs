#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use aegis_core::CompilerConfig;
use miette::Diagnostic;
use thiserror::Error;

pub const MANIFEST_NAME: &str = "aegis.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("manifest error: {message}")]
#[diagnostic(code(aegis::manifest))]
pub struct ManifestError {
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedManifest {
    pub manifest_path: Option<PathBuf>,
    pub project_root: PathBuf,

    pub name: Option<String>,

    /// Source files or directories, resolved against `project_root`.
    pub sources: Vec<PathBuf>,

    pub max_depth: Option<usize>,

    /// Extra foreign signatures, e.g. `sleep = "fn(int) -> bool"`.
    pub foreign: BTreeMap<String, String>,
}

impl ResolvedManifest {
    pub fn empty(project_root: PathBuf) -> Self {
        Self {
            project_root,
            ..Self::default()
        }
    }

    /// Standard foreign table plus the manifest's declarations. `max_depth`
    /// from the command line wins over the manifest.
    pub fn compiler_config(&self, max_depth: Option<usize>) -> Result<CompilerConfig, ManifestError> {
        let mut config = CompilerConfig::default();
        if let Some(depth) = max_depth.or(self.max_depth) {
            config = config.with_max_depth(depth);
        }
        for (name, sig) in &self.foreign {
            config = config.declare_foreign(name, sig).map_err(|e| ManifestError {
                message: e.to_string(),
            })?;
        }
        Ok(config)
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    project: Option<Project>,

    #[serde(default)]
    compiler: Option<Compiler>,

    #[serde(default)]
    foreign: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Project {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Compiler {
    #[serde(default)]
    max_depth: Option<usize>,
}

pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    let base = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };
    // `main.ae` has an empty parent; walk up from the working directory.
    let base = if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    };
    let mut cur = std::path::absolute(&base).unwrap_or(base);

    loop {
        let candidate = cur.join(MANIFEST_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        match cur.parent() {
            Some(p) => cur = p.to_path_buf(),
            None => return None,
        }
    }
}

pub fn load_resolved_manifest(start: &Path) -> Result<ResolvedManifest, ManifestError> {
    let project_root = if start.is_file() {
        start.parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    } else {
        start.to_path_buf()
    };

    let Some(manifest_path) = find_manifest(&project_root) else {
        return Ok(ResolvedManifest::empty(project_root));
    };

    let manifest_dir = manifest_path
        .parent()
        .ok_or_else(|| ManifestError {
            message: "manifest has no parent directory".to_string(),
        })?
        .to_path_buf();

    let raw = fs::read_to_string(&manifest_path).map_err(|e| ManifestError {
        message: format!("failed to read {}: {e}", manifest_path.display()),
    })?;

    let parsed: Manifest = toml::from_str(&raw).map_err(|e| ManifestError {
        message: format!("failed to parse {}: {e}", manifest_path.display()),
    })?;

    let mut out = ResolvedManifest {
        manifest_path: Some(manifest_path),
        project_root: manifest_dir.clone(),
        foreign: parsed.foreign,
        ..ResolvedManifest::default()
    };

    if let Some(project) = parsed.project {
        out.name = project.name;
        for s in project.sources {
            out.sources.push(resolve_path(&manifest_dir, &s));
        }
        out.sources = dedup_paths(out.sources);
    }

    if let Some(compiler) = parsed.compiler {
        if compiler.max_depth == Some(0) {
            return Err(ManifestError {
                message: "`compiler.max_depth` must be at least 1".to_string(),
            });
        }
        out.max_depth = compiler.max_depth;
    }

    Ok(out)
}

fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let pb = PathBuf::from(p);
    if pb.is_absolute() {
        pb
    } else {
        base.join(pb)
    }
}

fn dedup_paths(v: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out = Vec::with_capacity(v.len());
    let mut seen = std::collections::HashSet::new();
    for p in v {
        if seen.insert(normalize_for_dedup(&p)) {
            out.push(p);
        }
    }
    out
}

fn normalize_for_dedup(p: &Path) -> PathBuf {
    // Paths that do not exist yet are compared as written.
    p.canonicalize().unwrap_or_else(|_| p.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, text: &str) {
        fs::write(dir.join(MANIFEST_NAME), text).unwrap();
    }

    #[test]
    fn missing_manifest_resolves_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let m = load_resolved_manifest(dir.path()).unwrap();
        assert!(m.manifest_path.is_none());
        assert!(m.sources.is_empty());
        let config = m.compiler_config(None).unwrap();
        assert_eq!(config.max_depth, aegis_parse::DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn manifest_sections_reach_the_compiler_config() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "[project]\nname = \"demo\"\nsources = [\"src\", \"src\"]\n\n[compiler]\nmax_depth = 32\n\n[foreign]\nsleep = \"fn(int) -> bool\"\n",
        );
        let m = load_resolved_manifest(dir.path()).unwrap();
        assert_eq!(m.name.as_deref(), Some("demo"));
        assert_eq!(m.sources, [dir.path().join("src")]);

        let config = m.compiler_config(None).unwrap();
        assert_eq!(config.max_depth, 32);
        assert!(config.foreign.get("sleep").is_some());
        assert!(config.foreign.get("print").is_some());

        assert_eq!(m.compiler_config(Some(8)).unwrap().max_depth, 8);
    }

    #[test]
    fn bad_foreign_signatures_are_manifest_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "[foreign]\nsleep = \"fn(Widget) -> bool\"\n");
        let m = load_resolved_manifest(dir.path()).unwrap();
        let err = m.compiler_config(None).unwrap_err();
        assert!(err.message.contains("sleep"), "{}", err.message);
    }

    #[test]
    fn unknown_sections_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "[linker]\npaths = []\n");
        assert!(load_resolved_manifest(dir.path()).is_err());
    }
}
