//! # Typed Build Variables
//!
//! A [`CMakeVar`] describes one CMake cache variable: its name, the kind of value it
//! holds, and the prefix used when it is passed on the CMake command line. Packages
//! declare descriptors as constants and assign [`Value`]s to them during configuration.
//!
//! Rendering is a two-step process. [`CMakeVar::canonicalize`] coerces an arbitrary
//! value into the canonical form for the kind (absolute paths, resolved executables,
//! cleaned-up lists) or rejects it, and [`CMakeVar::render`] turns the canonical value
//! into the exact text CMake expects (`ON`/`OFF`, joined lists, and so on).

use crate::core::error::{ConfigureError, ConfigureResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// The semantic kind of a build variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// Rendered as `ON`/`OFF`.
    Bool,
    Int,
    /// Free text, passed through unchanged.
    String,
    /// Made absolute, with `~` expanded.
    Path,
    /// A list rendered with spaces, e.g. compiler flags.
    List,
    /// A CMake list rendered with semicolons.
    SemicolonList,
    /// A program name or path, resolved on the search path.
    Executable,
}

impl VarKind {
    pub fn is_list(self) -> bool {
        matches!(self, Self::List | Self::SemicolonList)
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::String => "String",
            Self::Path => "Path",
            Self::List => "List",
            Self::SemicolonList => "SemicolonList",
            Self::Executable => "Executable",
        };
        f.write_str(name)
    }
}

/// A typed value, as parsed from the command line or produced by a package.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    Path(PathBuf),
    List(Vec<String>),
}

impl Value {
    /// Whether the value counts as "on" when it gates a package.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Str(s) => !s.is_empty(),
            Self::Path(p) => !p.as_os_str().is_empty(),
            Self::List(items) => !items.is_empty(),
        }
    }

    /// Returns the contained text for string-like values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Path(p) => p.to_str(),
            _ => None,
        }
    }

    /// Returns the list items, or a single-item list for scalar values.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Str(s) => f.write_str(s),
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::List(items) => f.write_str(&items.join(" ")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<PathBuf> for Value {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for Value {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Parses the textual boolean forms accepted for `Bool` variables.
pub fn parse_cmake_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "t" | "1" => Some(true),
        "off" | "false" | "no" | "f" | "0" | "" => Some(false),
        _ => None,
    }
}

/// Descriptor of a single CMake cache variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CMakeVar {
    pub name: &'static str,
    pub kind: VarKind,
    /// Command-line prefix, `-D` for ordinary cache variables.
    pub prefix: &'static str,
}

impl CMakeVar {
    pub const fn new(name: &'static str, kind: VarKind) -> Self {
        Self {
            name,
            kind,
            prefix: "-D",
        }
    }

    /// Same variable, passed with a different command-line prefix (e.g. `-G`).
    pub const fn with_prefix(self, prefix: &'static str) -> Self {
        Self { prefix, ..self }
    }

    fn mismatch(&self, value: &Value, reason: impl Into<String>) -> ConfigureError {
        ConfigureError::TypeMismatch {
            var: self.name.to_string(),
            kind: self.kind,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Coerces `value` into the canonical value for this variable's kind.
    ///
    /// Returns `Ok(None)` when the value means "no value": a `*-NOTFOUND` path or
    /// executable, or a list that is empty once blank items are dropped.
    pub fn canonicalize(&self, value: &Value) -> ConfigureResult<Option<Value>> {
        match self.kind {
            VarKind::Bool => self.canonical_bool(value).map(Some),
            VarKind::Int => self.canonical_int(value).map(Some),
            VarKind::String => match value {
                Value::Str(_) | Value::Path(_) => Ok(Some(Value::Str(value.to_string()))),
                _ => Err(self.mismatch(value, "expected text")),
            },
            VarKind::Path => self.canonical_path(value),
            VarKind::Executable => self.canonical_executable(value),
            VarKind::List | VarKind::SemicolonList => self.canonical_list(value),
        }
    }

    fn canonical_bool(&self, value: &Value) -> ConfigureResult<Value> {
        match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Int(_) => Err(self.mismatch(value, "integer booleans must be 0 or 1")),
            Value::Str(s) => parse_cmake_bool(s)
                .map(Value::Bool)
                .ok_or_else(|| self.mismatch(value, "not a recognised boolean")),
            _ => Err(self.mismatch(value, "expected a boolean")),
        }
    }

    fn canonical_int(&self, value: &Value) -> ConfigureResult<Value> {
        match value {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.mismatch(value, "not an integer")),
            _ => Err(self.mismatch(value, "expected an integer")),
        }
    }

    fn path_text<'v>(&self, value: &'v Value) -> ConfigureResult<&'v str> {
        match value {
            Value::Str(s) => Ok(s),
            Value::Path(p) => p
                .to_str()
                .ok_or_else(|| self.mismatch(value, "path is not valid UTF-8")),
            _ => Err(self.mismatch(value, "expected a path")),
        }
    }

    fn canonical_path(&self, value: &Value) -> ConfigureResult<Option<Value>> {
        let text = self.path_text(value)?;
        if is_notfound(text) {
            return Ok(None);
        }
        Ok(Some(Value::Path(absolutize(text)?)))
    }

    fn canonical_executable(&self, value: &Value) -> ConfigureResult<Option<Value>> {
        let text = self.path_text(value)?;
        if is_notfound(text) {
            return Ok(None);
        }
        let candidate = PathBuf::from(shellexpand::tilde(text).as_ref());
        if candidate.is_dir() {
            return Err(self.mismatch(value, "got a directory as an executable"));
        }
        if candidate.exists() {
            return Ok(Some(Value::Path(absolutize(text)?)));
        }
        which::which(&candidate)
            .map(|found| Some(Value::Path(found)))
            .map_err(|_| ConfigureError::ExecutableNotFound {
                var: self.name.to_string(),
                program: text.to_string(),
            })
    }

    fn canonical_list(&self, value: &Value) -> ConfigureResult<Option<Value>> {
        let raw: Vec<String> = match value {
            Value::List(items) => items.clone(),
            Value::Str(s) if self.kind == VarKind::SemicolonList => {
                split_unescaped(s, ';')
            }
            Value::Str(s) => s.split_whitespace().map(str::to_string).collect(),
            _ => return Err(self.mismatch(value, "expected a list")),
        };

        let mut items = Vec::with_capacity(raw.len());
        for item in raw {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let embedded = match self.kind {
                VarKind::SemicolonList => has_unescaped(item, |c| c == ';'),
                _ => has_unescaped(item, char::is_whitespace),
            };
            if embedded {
                return Err(self.mismatch(
                    value,
                    format!("list item '{}' contains an unescaped delimiter", item),
                ));
            }
            items.push(item.to_string());
        }

        if items.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::List(items)))
        }
    }

    /// Renders `value` as the text CMake expects for this variable.
    ///
    /// A value that canonicalizes to "no value" renders as the empty string.
    pub fn render(&self, value: &Value) -> ConfigureResult<String> {
        Ok(self
            .canonicalize(value)?
            .map(|canonical| self.render_canonical(&canonical))
            .unwrap_or_default())
    }

    fn render_canonical(&self, canonical: &Value) -> String {
        match (self.kind, canonical) {
            (VarKind::Bool, Value::Bool(b)) => if *b { "ON" } else { "OFF" }.to_string(),
            (VarKind::SemicolonList, Value::List(items)) => items.join(";"),
            (_, other) => other.to_string(),
        }
    }

    /// The CMake cache type string for this variable holding `value`.
    pub fn type_str(&self, value: Option<&Value>) -> &'static str {
        match self.kind {
            VarKind::Bool => "BOOL",
            VarKind::Executable => "FILEPATH",
            VarKind::Path => match value {
                Some(Value::Path(p)) if p.is_dir() => "PATH",
                Some(Value::Path(p)) if p.exists() => "FILEPATH",
                _ => "PATH",
            },
            VarKind::Int | VarKind::String | VarKind::List | VarKind::SemicolonList => "STRING",
        }
    }

    /// Builds the command-line form of this variable, e.g. `-DFOO:BOOL=ON`.
    ///
    /// Returns `Ok(None)` when the value canonicalizes to "no value". Variables with a
    /// prefix other than `-D` are emitted as `{prefix}{value}` (e.g. `-GNinja`).
    pub fn to_command_line(&self, value: &Value, quote: bool) -> ConfigureResult<Option<String>> {
        let Some(canonical) = self.canonicalize(value)? else {
            return Ok(None);
        };
        let mut rendered = self.render_canonical(&canonical);
        if quote {
            rendered = shell_quote(&rendered);
        }
        if self.prefix != "-D" {
            return Ok(Some(format!("{}{}", self.prefix, rendered)));
        }
        Ok(Some(format!(
            "{}{}:{}={}",
            self.prefix,
            self.name,
            self.type_str(Some(&canonical)),
            rendered
        )))
    }
}

impl fmt::Display for CMakeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Quotes `text` for a POSIX shell, leaving it untouched when no quoting is needed.
pub fn shell_quote(text: &str) -> String {
    shlex::try_quote(text).map_or_else(|_| text.to_string(), |quoted| quoted.into_owned())
}

fn is_notfound(text: &str) -> bool {
    text.to_lowercase().contains("notfound")
}

fn absolutize(text: &str) -> ConfigureResult<PathBuf> {
    let expanded = shellexpand::tilde(text);
    let absolute = std::path::absolute(Path::new(expanded.as_ref()))?;
    Ok(dunce::simplified(&absolute).to_path_buf())
}

fn has_unescaped(item: &str, is_delim: impl Fn(char) -> bool) -> bool {
    let mut escaped = false;
    for c in item.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if is_delim(c) {
            return true;
        }
    }
    false
}

fn split_unescaped(text: &str, delim: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            current.push(c);
        } else if c == '\\' {
            escaped = true;
            current.push(c);
        } else if c == delim {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    const FLAG: CMakeVar = CMakeVar::new("ENABLE_FOO", VarKind::Bool);
    const JOBS: CMakeVar = CMakeVar::new("NUM_JOBS", VarKind::Int);
    const FLAGS: CMakeVar = CMakeVar::new("CMAKE_C_FLAGS", VarKind::List);
    const ARCHES: CMakeVar = CMakeVar::new("CMAKE_CUDA_ARCHITECTURES", VarKind::SemicolonList);
    const PREFIX: CMakeVar = CMakeVar::new("CMAKE_INSTALL_PREFIX", VarKind::Path);
    const COMPILER: CMakeVar = CMakeVar::new("CMAKE_C_COMPILER", VarKind::Executable);

    #[test]
    fn test_bool_renders_on_off() {
        assert_eq!(FLAG.render(&Value::Bool(true)).unwrap(), "ON");
        assert_eq!(FLAG.render(&Value::Bool(false)).unwrap(), "OFF");
        assert_eq!(FLAG.render(&Value::from("Yes")).unwrap(), "ON");
        assert_eq!(FLAG.render(&Value::from(" off ")).unwrap(), "OFF");
        assert_eq!(FLAG.render(&Value::Int(1)).unwrap(), "ON");
    }

    #[test]
    fn test_bool_rejects_incompatible_values() {
        let err = FLAG.render(&Value::List(vec!["a".into()])).unwrap_err();
        assert!(matches!(err, ConfigureError::TypeMismatch { .. }));

        let err = FLAG.render(&Value::from("maybe")).unwrap_err();
        assert!(err.to_string().contains("ENABLE_FOO"));

        assert!(FLAG.render(&Value::Int(2)).is_err());
    }

    #[test]
    fn test_int_coercions() {
        assert_eq!(JOBS.render(&Value::from(" 8 ")).unwrap(), "8");
        assert_eq!(JOBS.render(&Value::Bool(true)).unwrap(), "1");
        assert!(JOBS.render(&Value::from("eight")).is_err());
    }

    #[test]
    fn test_list_kinds_join_with_their_delimiter() {
        let items = Value::List(vec!["-O2".into(), "  ".into(), "-g".into()]);
        assert_eq!(FLAGS.render(&items).unwrap(), "-O2 -g");

        let arches = Value::List(vec!["70".into(), "80".into(), "90".into()]);
        assert_eq!(ARCHES.render(&arches).unwrap(), "70;80;90");

        // Strings are split on the delimiter of the kind.
        assert_eq!(ARCHES.render(&Value::from("60;;75")).unwrap(), "60;75");
    }

    #[test]
    fn test_list_rejects_embedded_delimiter_unless_escaped() {
        let bad = Value::List(vec!["70;80".into()]);
        let err = ARCHES.render(&bad).unwrap_err();
        assert!(err.to_string().contains("unescaped delimiter"));

        let escaped = Value::List(vec![r"70\;80".into(), "90".into()]);
        assert_eq!(ARCHES.render(&escaped).unwrap(), r"70\;80;90");

        assert!(FLAGS.render(&Value::List(vec!["-O2 -g".into()])).is_err());
    }

    #[test]
    fn test_empty_list_has_no_command_line() {
        let empty = Value::List(vec![" ".into()]);
        assert_eq!(FLAGS.canonicalize(&empty).unwrap(), None);
        assert_eq!(FLAGS.to_command_line(&empty, false).unwrap(), None);
    }

    #[test]
    fn test_path_is_absolute_and_typed() {
        // --- Setup ---
        let dir = TempDir::new().unwrap();
        let file = NamedTempFile::new().unwrap();

        // --- Execute ---
        let dir_value = PREFIX.canonicalize(&Value::from(dir.path())).unwrap();
        let file_value = PREFIX.canonicalize(&Value::from(file.path())).unwrap();
        let relative = PREFIX.canonicalize(&Value::from("some/relative/dir")).unwrap();

        // --- Assert ---
        assert_eq!(PREFIX.type_str(dir_value.as_ref()), "PATH");
        assert_eq!(PREFIX.type_str(file_value.as_ref()), "FILEPATH");
        match relative {
            Some(Value::Path(p)) => assert!(p.is_absolute()),
            other => panic!("unexpected canonical value: {:?}", other),
        }
        assert_eq!(PREFIX.canonicalize(&Value::from("FOO-NOTFOUND")).unwrap(), None);
    }

    #[test]
    fn test_executable_resolution() {
        let dir = TempDir::new().unwrap();
        let err = COMPILER.canonicalize(&Value::from(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigureError::TypeMismatch { .. }));

        let err = COMPILER
            .canonicalize(&Value::from("definitely-not-a-real-compiler-xyz"))
            .unwrap_err();
        assert!(matches!(err, ConfigureError::ExecutableNotFound { .. }));

        let file = NamedTempFile::new().unwrap();
        let resolved = COMPILER.canonicalize(&Value::from(file.path())).unwrap();
        assert!(matches!(resolved, Some(Value::Path(_))));
    }

    #[test]
    fn test_to_command_line_forms() {
        assert_eq!(
            FLAG.to_command_line(&Value::Bool(true), false).unwrap().as_deref(),
            Some("-DENABLE_FOO:BOOL=ON")
        );

        let generator = CMakeVar::new("CMAKE_GENERATOR", VarKind::String).with_prefix("-G");
        assert_eq!(
            generator.to_command_line(&Value::from("Ninja"), false).unwrap().as_deref(),
            Some("-GNinja")
        );

        let flags = Value::List(vec!["-O2".into(), "-g".into()]);
        let quoted = FLAGS.to_command_line(&flags, true).unwrap().unwrap();
        assert!(quoted.starts_with("-DCMAKE_C_FLAGS:STRING="));
        let split = shlex::split(&quoted).unwrap();
        assert_eq!(split, vec!["-DCMAKE_C_FLAGS:STRING=-O2 -g".to_string()]);
    }

    #[test]
    fn test_value_truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::List(Vec::new()).is_truthy());
        assert!(Value::from("/usr/local/cuda").is_truthy());
    }
}
