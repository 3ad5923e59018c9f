//! Local environment loading.
//!
//! Layers, lowest to highest precedence:
//!
//! 1. `.env`
//! 2. `.env.<environment>`
//! 3. `.env.local`
//! 4. process variables
//!
//! Missing files are skipped silently. Blank lines, `#` comments and lines
//! without `=` are skipped without failing the load. Values are taken
//! literally (no `$VAR` expansion) and matching surrounding quotes are
//! stripped. Loading never fails: the worst case is an empty map.

use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Local configuration split into its file and process layers.
///
/// The split is kept so remote values can be slotted between the two when merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalLayers {
    /// All `.env*` files, already layered.
    pub files: HashMap<String, String>,
    /// Process-level variables.
    pub process: HashMap<String, String>,
}

impl LocalLayers {
    /// Files overlaid with process variables.
    pub fn flatten(&self) -> HashMap<String, String> {
        let mut values = self.files.clone();
        values.extend(self.process.iter().map(|(k, v)| (k.clone(), v.clone())));
        values
    }
}

/// Source of local configuration.
pub trait LocalSource: Send + Sync {
    fn load(&self) -> LocalLayers;

    fn name(&self) -> &str {
        "local"
    }
}

#[derive(Debug, Clone)]
enum ProcessVars {
    Inherit,
    Fixed(HashMap<String, String>),
}

/// Loads `.env` files from a directory plus the process environment.
#[derive(Debug, Clone)]
pub struct LocalEnvironmentLoader {
    dir: PathBuf,
    environment: String,
    process: ProcessVars,
}

impl LocalEnvironmentLoader {
    pub fn new(dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            environment: environment.into(),
            process: ProcessVars::Inherit,
        }
    }

    /// Use a fixed process layer instead of reading the real process environment.
    pub fn with_process_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.process = ProcessVars::Fixed(vars);
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Candidate files in increasing precedence.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.dir.join(".env")];

        let env = self.environment.trim();
        if is_safe_environment_name(env) {
            paths.push(self.dir.join(format!(".env.{}", env)));
        } else if !env.is_empty() {
            warn!(
                environment = %env,
                "Ignoring environment-specific file for unsafe environment name"
            );
        }

        paths.push(self.dir.join(".env.local"));
        paths
    }

    fn process_layer(&self) -> HashMap<String, String> {
        match &self.process {
            ProcessVars::Fixed(vars) => vars.clone(),
            ProcessVars::Inherit => std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }
}

impl LocalSource for LocalEnvironmentLoader {
    fn load(&self) -> LocalLayers {
        let mut files = HashMap::new();
        for path in self.file_paths() {
            files.extend(read_env_file(&path));
        }

        let process = self.process_layer();
        debug!(
            dir = %self.dir.display(),
            environment = %self.environment,
            file_keys = files.len(),
            process_keys = process.len(),
            "Loaded local environment"
        );

        LocalLayers { files, process }
    }

    fn name(&self) -> &str {
        "dotenv"
    }
}

fn is_safe_environment_name(env: &str) -> bool {
    !env.is_empty() && !env.contains(['/', '\\']) && !env.contains("..")
}

/// Read one `.env` file. Unreadable files count as empty.
fn read_env_file(path: &Path) -> HashMap<String, String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == IoErrorKind::NotFound => {
            trace!(path = %path.display(), "No env file");
            return HashMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read env file, skipping");
            return HashMap::new();
        }
    };

    let mut values = HashMap::new();
    let mut skipped = 0usize;
    for line in contents.lines() {
        match parse_line(line) {
            Some((key, value)) => {
                values.insert(key.to_string(), value.to_string());
            }
            None if is_ignorable(line) => {}
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(path = %path.display(), skipped, "Skipped malformed env file lines");
    }
    values
}

fn is_ignorable(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

/// `KEY=value`. The value is taken verbatim after the first `=`, with no
/// variable expansion; one pair of matching surrounding quotes is removed.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    if is_ignorable(line) {
        return None;
    }

    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    Some((key, strip_quotes(value.trim())))
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(&open @ (b'"' | b'\'')), Some(&close)) if bytes.len() >= 2 && open == close => {
            &value[1..value.len() - 1]
        }
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn loader(dir: &Path, env: &str) -> LocalEnvironmentLoader {
        LocalEnvironmentLoader::new(dir, env).with_process_vars(HashMap::new())
    }

    #[test]
    fn test_missing_directory_yields_empty_layers() {
        let layers = loader(Path::new("/nonexistent/cfgsync"), "development").load();
        assert!(layers.files.is_empty());
        assert!(layers.process.is_empty());
    }

    #[test]
    fn test_file_precedence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "A=base\nB=base\nC=base\n").unwrap();
        fs::write(dir.path().join(".env.staging"), "B=staging\nC=staging\n").unwrap();
        fs::write(dir.path().join(".env.local"), "C=local\n").unwrap();
        fs::write(dir.path().join(".env.production"), "A=production\n").unwrap();

        let layers = loader(dir.path(), "staging").load();
        assert_eq!(layers.files["A"], "base");
        assert_eq!(layers.files["B"], "staging");
        assert_eq!(layers.files["C"], "local");
    }

    #[test]
    fn test_skips_comments_blank_and_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".env"),
            "# comment\n\nGOOD=1\nNO_EQUALS_SIGN\nDOUBLE=\"quoted value\"\nSINGLE='single'\nAFTER=2\n",
        )
        .unwrap();

        let files = loader(dir.path(), "development").load().files;
        assert_eq!(files["GOOD"], "1");
        assert_eq!(files["DOUBLE"], "quoted value");
        assert_eq!(files["SINGLE"], "single");
        assert_eq!(files["AFTER"], "2");
        assert!(!files.contains_key("NO_EQUALS_SIGN"));
        assert_eq!(files.len(), 4);
    }

    #[test]
    fn test_values_are_taken_literally() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".env"),
            concat!(
                "PASSWORD=abc$def\n",
                "SPACED=hello world\n",
                "PADDED = value \n",
                "URL=postgres://u:p@h/db?sslmode=require\n",
                "DQ=\"x$HOME y\"\n",
                "EMPTY=\n",
                "Q=\"\"\n",
            ),
        )
        .unwrap();

        let files = loader(dir.path(), "development").load().files;
        assert_eq!(files["PASSWORD"], "abc$def");
        assert_eq!(files["SPACED"], "hello world");
        assert_eq!(files["PADDED"], "value");
        assert_eq!(files["URL"], "postgres://u:p@h/db?sslmode=require");
        assert_eq!(files["DQ"], "x$HOME y");
        assert_eq!(files["EMPTY"], "");
        assert_eq!(files["Q"], "");
    }

    #[test]
    fn test_unterminated_quote_does_not_swallow_following_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "UNTERM=\"open\nMIXED='a\"\nNEXT=after\n").unwrap();

        let files = loader(dir.path(), "development").load().files;
        assert_eq!(files["UNTERM"], "\"open");
        assert_eq!(files["MIXED"], "'a\"");
        assert_eq!(files["NEXT"], "after");
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  # A=1"), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("=orphan"), None);
        assert_eq!(parse_line("NO_EQUALS"), None);
        assert_eq!(parse_line("K='x'"), Some(("K", "x")));
        assert_eq!(parse_line("K=\""), Some(("K", "\"")));
    }

    #[test]
    fn test_process_layer_wins_when_flattened() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "A=file\nB=file\n").unwrap();

        let layers = LocalEnvironmentLoader::new(dir.path(), "development")
            .with_process_vars(HashMap::from([("A".to_string(), "process".to_string())]))
            .load();

        let flat = layers.flatten();
        assert_eq!(flat["A"], "process");
        assert_eq!(flat["B"], "file");
    }

    #[test]
    fn test_unsafe_environment_name_is_ignored() {
        let loader = loader(Path::new("/tmp"), "../etc");
        let paths = loader.file_paths();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with(".env"));
        assert!(paths[1].ends_with(".env.local"));
    }

    #[test]
    fn test_inherits_real_process_environment() {
        let layers = LocalEnvironmentLoader::new("/nonexistent/cfgsync", "development").load();
        // PATH is present in any realistic test environment
        assert_eq!(layers.process.get("PATH").cloned(), std::env::var("PATH").ok());
    }
}
