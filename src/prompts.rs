//! Versioned prompt templates stored as plain text files.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` produce literal braces so prompts can
//! show JSON examples. Substituted values are inserted verbatim and never re-scanned.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or rendering prompt templates.
#[derive(Debug, Error)]
pub enum PromptError {
    /// Version string contains characters outside `[A-Za-z0-9_.-]` or a `..` sequence.
    #[error("Invalid prompt version '{0}'")]
    InvalidVersion(String),
    /// Template file for the requested version does not exist.
    #[error("Prompt template not found: {0}")]
    NotFound(String),
    /// Template file exists but could not be read.
    #[error("Failed to read prompt template {path}: {source}")]
    Io {
        /// Template path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Template references a placeholder that was not supplied.
    #[error("Template '{template}' references unknown placeholder '{name}'")]
    UnknownPlaceholder {
        /// Template name.
        template: String,
        /// Placeholder name.
        name: String,
    },
    /// Template contains a brace that is neither escaped nor part of a placeholder.
    #[error("Template '{template}' has an unbalanced brace at character {position}")]
    UnbalancedBrace {
        /// Template name.
        template: String,
        /// Character offset of the offending brace.
        position: usize,
    },
}

/// Template families known to the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Question classifier, `router_<version>.txt`.
    Router,
    /// Grounded answer prompt, `policy_qa_<version>.txt`.
    PolicyQa,
}

impl PromptKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::PolicyQa => "policy_qa",
        }
    }
}

/// Check that `version` is safe to splice into a file name.
pub fn validate_version(version: &str) -> Result<(), PromptError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-');
    if version.is_empty() || version.contains("..") || !version.chars().all(allowed) {
        return Err(PromptError::InvalidVersion(version.to_string()));
    }
    Ok(())
}

/// Directory of versioned prompt templates.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    dir: PathBuf,
}

impl PromptLibrary {
    /// Create a library rooted at `dir`. Nothing is read until a template is requested.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the library.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the template for `kind` at `version`, after validating the version.
    pub fn path_for(&self, kind: PromptKind, version: &str) -> Result<PathBuf, PromptError> {
        validate_version(version)?;
        Ok(self.dir.join(format!("{}_{version}.txt", kind.prefix())))
    }

    /// Read and parse the template for `kind` at `version`.
    pub async fn load(
        &self,
        kind: PromptKind,
        version: &str,
    ) -> Result<PromptTemplate, PromptError> {
        let path = self.path_for(kind, version)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(PromptError::NotFound(path.display().to_string()));
            }
            Err(source) => {
                return Err(PromptError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(template = %name, "Loaded prompt template");
        PromptTemplate::parse(name, &text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Parsed prompt template ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse `text`, resolving brace escapes and collecting placeholders.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, PromptError> {
        let name = name.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().enumerate().peekable();

        while let Some((position, c)) = chars.next() {
            match c {
                '{' if chars.peek().is_some_and(|(_, next)| *next == '{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().is_some_and(|(_, next)| *next == '}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut placeholder = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        placeholder.push(inner);
                    }
                    let valid = !placeholder.is_empty()
                        && placeholder
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_');
                    if !closed || !valid {
                        return Err(PromptError::UnbalancedBrace {
                            template: name,
                            position,
                        });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(placeholder));
                }
                '}' => {
                    return Err(PromptError::UnbalancedBrace {
                        template: name,
                        position,
                    });
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { name, segments })
    }

    /// Template file name, used in errors and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute `values` into the template. Unused values are ignored.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, PromptError> {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values
                        .iter()
                        .find(|(key, _)| *key == name.as_str())
                        .map(|(_, value)| *value)
                        .ok_or_else(|| PromptError::UnknownPlaceholder {
                            template: self.name.clone(),
                            name: name.clone(),
                        })?;
                    rendered.push_str(value);
                }
            }
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn renders_placeholders_and_escaped_braces() {
        let template = PromptTemplate::parse(
            "t",
            "Q: {question}\nReturn {{\"answer\": \"...\"}}\n{context}",
        )
        .expect("parse");
        let rendered = template
            .render(&[("question", "Leave?"), ("context", "[a.txt#chunk=0]\nx")])
            .expect("render");
        assert_eq!(
            rendered,
            "Q: Leave?\nReturn {\"answer\": \"...\"}\n[a.txt#chunk=0]\nx"
        );
        assert_eq!(
            template.placeholders().collect::<Vec<_>>(),
            vec!["question", "context"]
        );
    }

    #[test]
    fn values_are_not_rescanned() {
        let template = PromptTemplate::parse("t", "{context}").expect("parse");
        let rendered = template
            .render(&[("context", "{question} and {{braces}}")])
            .expect("render");
        assert_eq!(rendered, "{question} and {{braces}}");
    }

    #[test]
    fn missing_value_is_reported() {
        let template = PromptTemplate::parse("router_v1.txt", "{question}").expect("parse");
        let error = template.render(&[]).unwrap_err();
        assert!(matches!(error, PromptError::UnknownPlaceholder { .. }));
        assert!(error.to_string().contains("'question'"));
    }

    #[test]
    fn stray_braces_are_rejected() {
        for text in ["{\"answer\": 1}", "open {question", "close }", "{}"] {
            let error = PromptTemplate::parse("t", text).unwrap_err();
            assert!(
                matches!(error, PromptError::UnbalancedBrace { .. }),
                "{text}"
            );
        }
    }

    #[test]
    fn version_validation() {
        for ok in ["v1", "v2", "v2.1", "beta_2-rc"] {
            assert!(validate_version(ok).is_ok(), "{ok}");
        }
        for bad in ["", "../v1", "v1/..", "v 1", "v1/x", "v..1"] {
            assert!(
                matches!(validate_version(bad), Err(PromptError::InvalidVersion(_))),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn loads_versioned_templates_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("policy_qa_v9.txt"), "Answer {question}").expect("write");
        let library = PromptLibrary::new(dir.path());

        let template = library
            .load(PromptKind::PolicyQa, "v9")
            .await
            .expect("load");
        assert_eq!(template.name(), "policy_qa_v9.txt");
        assert_eq!(
            template.render(&[("question", "why")]).expect("render"),
            "Answer why"
        );

        let missing = library.load(PromptKind::Router, "v9").await.unwrap_err();
        assert!(matches!(missing, PromptError::NotFound(_)));

        let invalid = library
            .load(PromptKind::PolicyQa, "../v9")
            .await
            .unwrap_err();
        assert!(matches!(invalid, PromptError::InvalidVersion(_)));
    }
}
