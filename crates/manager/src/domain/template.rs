//! Template resolution for pool, volume and domain definitions
//!
//! Templates are libvirt XML documents read from disk. Relative references
//! inside them (`./disk.qcow2`) are rewritten to absolute paths anchored at the
//! configured base directory before anything reaches the hypervisor, because
//! libvirt only accepts absolute storage paths.

use core::error::Error;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;

/// Token rewritten to the absolute base directory
pub const RELATIVE_PATH_MARKER: &str = "./";

/// Directory holding the default templates, relative to the base directory
pub const DEFAULT_TEMPLATE_DIR: &str = "./xml/";

/// The three definitions needed to bring up a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum TemplateKind {
    #[display("pool")]
    Pool,
    #[display("volume")]
    Volume,
    #[display("domain")]
    Domain,
}

impl TemplateKind {
    /// File name looked up in [`DEFAULT_TEMPLATE_DIR`] when no source is given
    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::Pool => "pool.xml",
            Self::Volume => "vol.xml",
            Self::Domain => "dom.xml",
        }
    }
}

/// A literal text replacement applied after path rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

/// Reference to a template source plus extra substitutions
///
/// An empty `source` selects the default location for the template kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSpec {
    pub source: String,
    pub substitutions: Vec<Substitution>,
}

impl TemplateSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            substitutions: Vec::new(),
        }
    }

    pub fn with_substitution(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.substitutions.push(Substitution {
            from: from.into(),
            to: to.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum TemplateError {
    #[display("template {location} is not available")]
    NotFound { location: String },
    #[display("template {location} is empty")]
    Empty { location: String },
    #[display("template {location} is not an XML document")]
    Malformed { location: String },
}

impl Error for TemplateError {}

/// Loads templates relative to an explicit base directory.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    base_dir: PathBuf,
}

impl TemplateResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Default source for a template file name, e.g. `./xml/pool.xml`
    pub fn default_source(default_name: &str) -> String {
        format!("{DEFAULT_TEMPLATE_DIR}{default_name}")
    }

    /// Reads a template verbatim.
    ///
    /// # Errors
    ///
    /// - [`TemplateError::NotFound`] if the source cannot be read as UTF-8 text,
    ///   whatever the underlying reason
    pub async fn resolve(
        &self,
        source: &str,
        default_name: &str,
    ) -> Result<String, Report<TemplateError>> {
        let location = if source.is_empty() {
            Self::default_source(default_name)
        } else {
            source.to_string()
        };
        let path = self.base_dir.join(&location);

        let bytes = tokio::fs::read(&path)
            .await
            .change_context(TemplateError::NotFound {
                location: location.clone(),
            })
            .attach_printable_lazy(|| format!("path: {}", path.display()))?;

        String::from_utf8(bytes).change_context(TemplateError::NotFound { location })
    }

    /// Resolves a template, anchors its relative paths and applies the spec's
    /// substitutions.
    ///
    /// # Errors
    ///
    /// - [`TemplateError::NotFound`] if the source cannot be read
    /// - [`TemplateError::Empty`] if nothing but whitespace remains
    /// - [`TemplateError::Malformed`] if the content does not start like XML
    pub async fn render(
        &self,
        spec: &TemplateSpec,
        kind: TemplateKind,
    ) -> Result<String, Report<TemplateError>> {
        let raw = self.resolve(&spec.source, kind.default_file_name()).await?;

        let mut content = rewrite_relative_paths(&raw, &self.base_dir);
        for substitution in &spec.substitutions {
            content = content.replace(&substitution.from, &substitution.to);
        }

        let location = if spec.source.is_empty() {
            Self::default_source(kind.default_file_name())
        } else {
            spec.source.clone()
        };
        let body = content.trim_start();
        if body.is_empty() {
            return Err(Report::new(TemplateError::Empty { location }));
        }
        if !body.starts_with('<') {
            return Err(Report::new(TemplateError::Malformed { location }));
        }

        Ok(content)
    }
}

/// Replaces every relative-path marker with `base` plus a separator.
///
/// Works line by line and keeps line breaks, including a trailing one, exactly
/// as they were. A marker glued to a longer path segment (`../`, `a/./b`) is
/// not a marker and stays untouched.
pub fn rewrite_relative_paths(content: &str, base: &Path) -> String {
    let base = base.to_string_lossy();
    let replacement = format!("{}/", base.trim_end_matches('/'));

    let mut rewritten = String::with_capacity(content.len());
    for (idx, line) in content.split('\n').enumerate() {
        if idx > 0 {
            rewritten.push('\n');
        }
        rewrite_line(line, &replacement, &mut rewritten);
    }
    rewritten
}

fn rewrite_line(line: &str, replacement: &str, out: &mut String) {
    let mut rest = line;
    let mut previous: Option<char> = None;

    while let Some(pos) = rest.find(RELATIVE_PATH_MARKER) {
        let before = &rest[..pos];
        let preceding = before.chars().next_back().or(previous);
        out.push_str(before);

        if preceding.is_some_and(is_path_char) {
            out.push_str(RELATIVE_PATH_MARKER);
        } else {
            out.push_str(replacement);
        }

        previous = Some('/');
        rest = &rest[pos + RELATIVE_PATH_MARKER.len()..];
    }
    out.push_str(rest);
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '/' | '_' | '-' | '~')
}
