use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use minijinja::{Environment, ErrorKind};
use tracing::debug;

use crate::error::PmError;
use crate::template::PromptTemplate;

/// Name of the instruction template sent as the model's system prompt.
pub const SYSTEM_TEMPLATE: &str = "changelog/system";

/// Name of the template wrapping the aggregated history payload.
pub const TASK_TEMPLATE: &str = "changelog/task";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (SYSTEM_TEMPLATE, include_str!("../templates/changelog/system.j2")),
    (TASK_TEMPLATE, include_str!("../templates/changelog/task.j2")),
];

/// File extensions picked up by [`PromptManager::load_dir`].
const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "jinja"];

/// Manages prompt templates and renders them with context variables.
///
/// A new manager already contains the built-in changelog templates. Adding a
/// template under an existing name replaces it, which is how a user-supplied
/// instruction template overrides [`SYSTEM_TEMPLATE`].
#[derive(Debug)]
pub struct PromptManager {
    env: Environment<'static>,
    names: BTreeSet<String>,
}

impl PromptManager {
    /// Create a manager pre-loaded with the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if a built-in template fails to parse.
    pub fn new() -> Result<Self, PmError> {
        let mut pm = Self {
            env: Environment::new(),
            names: BTreeSet::new(),
        };
        for (name, source) in BUILTIN_TEMPLATES {
            pm.add_template(PromptTemplate::new(*name, *source))?;
        }
        Ok(pm)
    }

    /// Load all `.j2` / `.jinja` templates from a directory, recursively.
    ///
    /// Each template is named after its path relative to `dir`, without the
    /// extension and with `/` separators (`changelog/system.j2` becomes
    /// `changelog/system`).
    pub fn load_dir(&mut self, dir: &Path) -> Result<(), PmError> {
        self.load_dir_with_prefix(dir, "")
    }

    fn load_dir_with_prefix(&mut self, dir: &Path, prefix: &str) -> Result<(), PmError> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if path.is_dir() {
                let nested = format!("{prefix}{file_name}/");
                self.load_dir_with_prefix(&path, &nested)?;
                continue;
            }

            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext));
            if !is_template {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = fs::read_to_string(&path)?;
            self.add_template(PromptTemplate::new(format!("{prefix}{stem}"), source))?;
            debug!(path = %path.display(), "loaded template file");
        }
        Ok(())
    }

    /// Register a single template, replacing any template with the same name.
    pub fn add_template(&mut self, template: PromptTemplate) -> Result<(), PmError> {
        let PromptTemplate { name, source } = template;
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| PmError::InvalidTemplate(format!("{name}: {e}")))?;
        self.names.insert(name);
        Ok(())
    }

    /// Render a template by name with the given context.
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, PmError> {
        let template = self.env.get_template(name).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => PmError::TemplateNotFound(name.to_owned()),
            _ => PmError::InvalidTemplate(format!("{name}: {e}")),
        })?;
        template
            .render(ctx)
            .map_err(|e| PmError::RenderError(format!("{name}: {e}")))
    }

    /// Names of all registered templates, sorted.
    pub fn list_templates(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_should_load_builtin_templates() {
        let pm = PromptManager::new().expect("should create manager");
        assert_eq!(pm.list_templates(), vec![SYSTEM_TEMPLATE, TASK_TEMPLATE]);
    }

    #[test]
    fn test_should_render_builtin_system_prompt_in_spanish() {
        let pm = PromptManager::new().expect("should create manager");
        let rendered = pm.render(SYSTEM_TEMPLATE, &json!({})).expect("should render");
        assert!(rendered.contains("Repositorio"));
        assert!(rendered.contains("Fecha"));
    }

    #[test]
    fn test_should_render_task_with_payload_and_window() {
        let pm = PromptManager::new().expect("should create manager");
        let ctx = json!({
            "since": "2 weeks ago",
            "until": "today",
            "username": "ana",
            "payload": "--- Repository: api ---\nabc123 2026-10-01 fix login",
        });
        let rendered = pm.render(TASK_TEMPLATE, &ctx).expect("should render");
        assert!(rendered.contains("de ana"));
        assert!(rendered.contains("\"2 weeks ago\""));
        assert!(rendered.contains("abc123 2026-10-01 fix login"));
    }

    #[test]
    fn test_should_override_builtin_template() {
        let mut pm = PromptManager::new().expect("should create manager");
        pm.add_template(PromptTemplate::new(SYSTEM_TEMPLATE, "Resume los cambios."))
            .expect("should add template");

        let rendered = pm.render(SYSTEM_TEMPLATE, &json!({})).expect("should render");
        assert_eq!(rendered, "Resume los cambios.");
        assert_eq!(pm.list_templates().len(), 2);
    }

    #[test]
    fn test_should_return_not_found_for_unknown_template() {
        let pm = PromptManager::new().expect("should create manager");
        let err = pm.render("missing/template", &json!({})).unwrap_err();
        assert!(matches!(err, PmError::TemplateNotFound(name) if name == "missing/template"));
    }

    #[test]
    fn test_should_reject_invalid_template_syntax() {
        let mut pm = PromptManager::new().expect("should create manager");
        let err = pm
            .add_template(PromptTemplate::new("broken", "{% if %}"))
            .unwrap_err();
        assert!(matches!(err, PmError::InvalidTemplate(_)));
    }

    #[test]
    fn test_should_load_templates_from_directory() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let nested = dir.path().join("changelog");
        std::fs::create_dir_all(&nested).expect("should create dir");
        std::fs::write(nested.join("system.j2"), "Custom {{ username }}").expect("write");
        std::fs::write(dir.path().join("extra.jinja"), "extra").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let mut pm = PromptManager::new().expect("should create manager");
        pm.load_dir(dir.path()).expect("should load dir");

        let rendered = pm
            .render(SYSTEM_TEMPLATE, &json!({"username": "leo"}))
            .expect("should render");
        assert_eq!(rendered, "Custom leo");
        assert_eq!(pm.render("extra", &json!({})).expect("render"), "extra");
        assert!(!pm.list_templates().contains(&"notes"));
    }
}
