use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ReconstructionError;
use crate::session::RunConfiguration;

fn default_modifiable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,
    #[serde(default, alias = "text")]
    pub content: String,
    #[serde(default = "default_modifiable")]
    pub modifiable: bool,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>, modifiable: bool) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            modifiable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    pub name: String,
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub conf_type: Option<RunConfiguration>,
    #[serde(default)]
    pub files: Vec<ProjectFile>,
    #[serde(default)]
    pub test_classes: Vec<String>,
}

impl ProjectDescriptor {
    pub fn file(&self, name: &str) -> Option<&ProjectFile> {
        self.files.iter().find(|file| file.name == name)
    }

    /// Source of the first file, used as diagnostic context.
    pub fn primary_source(&self) -> Option<&str> {
        self.files.first().map(|file| file.content.as_str())
    }
}

pub trait TemplateStore: Send + Sync {
    fn get_example_object(
        &self,
        name: &str,
        parent: &str,
    ) -> Result<ProjectDescriptor, ReconstructionError>;

    fn load_example(&self, args: &str) -> anyhow::Result<String>;
}

/// Appends the template's immutable files and takes its test classes. A
/// submitted file with the same name as an immutable one is kept alongside it.
pub fn reconstruct(
    templates: &dyn TemplateStore,
    mut submitted: ProjectDescriptor,
) -> Result<ProjectDescriptor, ReconstructionError> {
    let stored = templates.get_example_object(&submitted.name, &submitted.parent)?;

    for file in stored.files.into_iter().filter(|file| !file.modifiable) {
        if submitted.file(&file.name).is_some() {
            warn!(
                template = %submitted.name,
                parent = %submitted.parent,
                file = %file.name,
                "submitted file shadows an immutable template file"
            );
        }
        submitted.files.push(file);
    }
    submitted.test_classes = stored.test_classes;
    Ok(submitted)
}
