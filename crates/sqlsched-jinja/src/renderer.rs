//! SQL template rendering
//!
//! Templates are Jinja files resolved relative to a templates root. Any
//! variable the template references but the job spec does not bind is a
//! render error, never an empty substitution.

use minijinja::{AutoEscape, Environment, Error as JinjaError, ErrorKind, UndefinedBehavior};
use sqlsched_core::{sql_fingerprint, Diagnostic, DiagnosticCode, Location, Severity};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

/// Template parameters as carried by the job spec
pub type Parameters = BTreeMap<String, serde_json::Value>;

/// Result of rendering a job's SQL template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    /// Template identifier as written in the job spec
    pub template: String,

    /// Rendered SQL, trimmed at both ends
    pub sql: String,

    /// SHA-256 of `sql`
    pub fingerprint: String,
}

impl RenderedQuery {
    pub fn new(template: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            template: template.into(),
            fingerprint: sql_fingerprint(&sql),
            sql,
        }
    }
}

/// Error during template loading or rendering
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid template path '{template}': {reason}")]
    InvalidTemplatePath { template: String, reason: String },

    #[error("SQL template '{template}' not found under {}", root.display())]
    TemplateNotFound { template: String, root: PathBuf },

    #[error("failed to load SQL template '{template}': {source}")]
    Load {
        template: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render SQL template '{template}': undefined variable(s) {}", names.join(", "))]
    UndefinedVariable {
        template: String,
        names: Vec<String>,
        #[source]
        source: JinjaError,
    },

    #[error("failed to render SQL template '{template}': {source}")]
    Render {
        template: String,
        #[source]
        source: JinjaError,
    },
}

impl RenderError {
    /// Template identifier the error is about
    pub fn template(&self) -> &str {
        match self {
            RenderError::InvalidTemplatePath { template, .. }
            | RenderError::TemplateNotFound { template, .. }
            | RenderError::Load { template, .. }
            | RenderError::UndefinedVariable { template, .. }
            | RenderError::Render { template, .. } => template,
        }
    }

    /// True when the template could not be found or read
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            RenderError::InvalidTemplatePath { .. }
                | RenderError::TemplateNotFound { .. }
                | RenderError::Load { .. }
        )
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            RenderError::InvalidTemplatePath { .. } | RenderError::TemplateNotFound { .. } => {
                DiagnosticCode::TemplateNotFound
            }
            RenderError::UndefinedVariable { .. } => DiagnosticCode::TemplateUndefinedVariable,
            RenderError::Load { .. } | RenderError::Render { .. } => {
                DiagnosticCode::TemplateRenderError
            }
        };

        let diag = Diagnostic::new(code, Severity::Error, self.to_string())
            .with_location(Location::new(self.template()));

        match self {
            RenderError::UndefinedVariable { names, .. } => {
                diag.with_comparison("bound in parameters", names.join(", "))
            }
            _ => diag,
        }
    }
}

/// Renders SQL templates found under a root directory
pub struct SqlRenderer {
    env: Environment<'static>,
    templates_root: PathBuf,
}

impl SqlRenderer {
    /// Create a renderer for templates below `templates_root`
    pub fn new(templates_root: impl Into<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        Self {
            env,
            templates_root: templates_root.into(),
        }
    }

    pub fn templates_root(&self) -> &Path {
        &self.templates_root
    }

    /// Check if SQL contains Jinja templates
    pub fn has_jinja(sql: &str) -> bool {
        sql.contains("{{") || sql.contains("{%") || sql.contains("{#")
    }

    /// Resolve a template identifier to a file inside the templates root.
    ///
    /// Absolute paths, `..` components and symlinks leading out of the root
    /// are rejected.
    pub fn resolve(&self, template: &str) -> Result<PathBuf, RenderError> {
        let relative = Path::new(template);

        if template.trim().is_empty() {
            return Err(RenderError::InvalidTemplatePath {
                template: template.to_string(),
                reason: "template path is empty".to_string(),
            });
        }

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(RenderError::InvalidTemplatePath {
                        template: template.to_string(),
                        reason: "'..' is not allowed".to_string(),
                    })
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(RenderError::InvalidTemplatePath {
                        template: template.to_string(),
                        reason: "path must be relative to the templates root".to_string(),
                    })
                }
            }
        }

        let candidate = self.templates_root.join(relative);
        if !candidate.is_file() {
            return Err(RenderError::TemplateNotFound {
                template: template.to_string(),
                root: self.templates_root.clone(),
            });
        }

        let load_err = |e: std::io::Error| RenderError::Load {
            template: template.to_string(),
            source: e,
        };
        let root = self.templates_root.canonicalize().map_err(load_err)?;
        let resolved = candidate.canonicalize().map_err(load_err)?;

        if !resolved.starts_with(&root) {
            return Err(RenderError::InvalidTemplatePath {
                template: template.to_string(),
                reason: format!("resolves outside {}", root.display()),
            });
        }

        Ok(resolved)
    }

    /// Render the named template with the given parameters
    pub fn render(&self, template: &str, parameters: &Parameters) -> Result<String, RenderError> {
        let path = self.resolve(template)?;
        let source = std::fs::read_to_string(&path).map_err(|e| RenderError::Load {
            template: template.to_string(),
            source: e,
        })?;

        tracing::debug!(template, path = %path.display(), "rendering SQL template");
        self.render_source(template, &source, parameters)
    }

    /// Render and fingerprint the named template
    pub fn render_query(&self, template: &str, parameters: &Parameters) -> Result<RenderedQuery, RenderError> {
        let sql = self.render(template, parameters)?;
        let rendered = RenderedQuery::new(template, sql);
        tracing::info!(
            template,
            fingerprint = %rendered.fingerprint,
            bytes = rendered.sql.len(),
            "rendered SQL template"
        );
        Ok(rendered)
    }

    /// Render template source text that was already loaded
    pub fn render_source(&self, name: &str, source: &str, parameters: &Parameters) -> Result<String, RenderError> {
        if !Self::has_jinja(source) {
            return Ok(source.trim().to_string());
        }

        self.env
            .render_named_str(name, source, parameters)
            .map(|sql| sql.trim().to_string())
            .map_err(|e| self.jinja_error_to_render_error(e, name, source, parameters))
    }

    /// Convert MiniJinja error to RenderError
    fn jinja_error_to_render_error(
        &self,
        error: JinjaError,
        name: &str,
        source: &str,
        parameters: &Parameters,
    ) -> RenderError {
        if error.kind() == ErrorKind::UndefinedError {
            let names = self.unbound_variables(name, source, parameters);
            if !names.is_empty() {
                return RenderError::UndefinedVariable {
                    template: name.to_string(),
                    names,
                    source: error,
                };
            }
        }

        RenderError::Render {
            template: name.to_string(),
            source: error,
        }
    }

    /// Variables the template reads that are neither parameters nor globals
    fn unbound_variables(&self, name: &str, source: &str, parameters: &Parameters) -> Vec<String> {
        let Ok(template) = self.env.template_from_named_str(name, source) else {
            return Vec::new();
        };

        let globals: BTreeSet<&str> = self.env.globals().map(|(n, _)| n).collect();
        let undeclared: BTreeSet<String> = template.undeclared_variables(false).into_iter().collect();

        undeclared
            .into_iter()
            .filter(|var| !parameters.contains_key(var) && !globals.contains(var.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, serde_json::Value)]) -> Parameters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_has_jinja() {
        assert!(SqlRenderer::has_jinja("select * from {{ table }}"));
        assert!(SqlRenderer::has_jinja("{% set var = 'value' %}"));
        assert!(SqlRenderer::has_jinja("{# comment #}"));
        assert!(!SqlRenderer::has_jinja("select * from table"));
    }

    #[test]
    fn test_no_jinja_passthrough_is_trimmed() {
        let renderer = SqlRenderer::new(".");
        let sql = renderer.render_source("q.sql", "\n  select 1\n\n", &Parameters::new()).unwrap();
        assert_eq!(sql, "select 1");
    }

    #[test]
    fn test_missing_variable_fails_closed() {
        let renderer = SqlRenderer::new(".");
        let err = renderer
            .render_source("q.sql", "select * from t where d > {{missing_var}}", &Parameters::new())
            .unwrap_err();

        match err {
            RenderError::UndefinedVariable { names, .. } => assert_eq!(names, vec!["missing_var"]),
            other => panic!("expected UndefinedVariable, got {:?}", other),
        }
    }

    #[test]
    fn test_bound_variable_renders_and_trims() {
        let renderer = SqlRenderer::new(".");
        let sql = renderer
            .render_source(
                "q.sql",
                "\n\n  select * from t where d > {{missing_var}}  \n",
                &params(&[("missing_var", json!("2024-01-01"))]),
            )
            .unwrap();
        assert_eq!(sql, "select * from t where d > 2024-01-01");
    }

    #[test]
    fn test_filters_and_conditionals() {
        let renderer = SqlRenderer::new(".");
        let source = "select {{ columns | join(', ') }}\nfrom t\n{% if limit %}\nlimit {{ limit }}\n{% endif %}\n";
        let sql = renderer
            .render_source(
                "q.sql",
                source,
                &params(&[("columns", json!(["a", "b"])), ("limit", json!(10))]),
            )
            .unwrap();
        assert_eq!(sql, "select a, b\nfrom t\nlimit 10");
    }

    #[test]
    fn test_no_html_escaping() {
        let renderer = SqlRenderer::new(".");
        let sql = renderer
            .render_source("q.html", "where x = {{ v }}", &params(&[("v", json!("'a' < 'b'"))]))
            .unwrap();
        assert_eq!(sql, "where x = 'a' < 'b'");
    }

    #[test]
    fn test_syntax_error_is_render_error() {
        let renderer = SqlRenderer::new(".");
        let err = renderer
            .render_source("q.sql", "select {{ a ", &params(&[("a", json!(1))]))
            .unwrap_err();
        assert!(matches!(err, RenderError::Render { .. }));
        assert!(!err.is_load_failure());
        assert_eq!(err.to_diagnostic().code, DiagnosticCode::TemplateRenderError);
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let renderer = SqlRenderer::new("templates");
        for template in ["../secrets.sql", "a/../../b.sql", "/etc/passwd", ""] {
            let err = renderer.resolve(template).unwrap_err();
            assert!(
                matches!(err, RenderError::InvalidTemplatePath { .. }),
                "expected '{}' to be rejected, got {:?}",
                template,
                err
            );
        }
    }
}
