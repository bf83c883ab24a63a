use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use dispatcher::{ProjectDescriptor, ProjectFile, ReconstructionError, RunConfiguration, TemplateStore};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

const MANIFEST: &str = "manifest.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    files: Vec<ManifestFile>,
    #[serde(default)]
    test_classes: Vec<String>,
    #[serde(default)]
    conf_type: Option<RunConfiguration>,
    #[serde(default)]
    args: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    name: String,
    #[serde(default = "modifiable_default")]
    modifiable: bool,
}

fn modifiable_default() -> bool {
    true
}

/// Templates read from disk once and served from memory afterwards.
///
/// Every directory under the root is a folder. Inside a folder a plain file
/// is a single-file template named by its stem, and a directory holding a
/// `manifest.json` is a multi-file template named by the directory.
#[derive(Debug, Default)]
pub struct FsTemplateStore {
    folders: BTreeMap<String, BTreeMap<String, ProjectDescriptor>>,
}

impl FsTemplateStore {
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let mut folders = BTreeMap::new();
        if !root.is_dir() {
            warn!(root = %root.display(), "templates root missing, serving no templates");
            return Ok(Self { folders });
        }
        for entry in sorted_entries(root)? {
            if !entry.is_dir() {
                continue;
            }
            let Some(folder) = visible_name(&entry) else {
                continue;
            };
            let templates = load_folder(&entry, &folder)
                .with_context(|| format!("failed to load template folder '{folder}'"))?;
            folders.insert(folder, templates);
        }
        let count: usize = folders.values().map(BTreeMap::len).sum();
        info!(root = %root.display(), folders = folders.len(), templates = count, "templates loaded");
        Ok(Self { folders })
    }

    pub fn len(&self) -> usize {
        self.folders.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn listing(&self) -> String {
        let folders: Vec<_> = self
            .folders
            .iter()
            .map(|(folder, templates)| {
                json!({
                    "folder": folder,
                    "examples": templates.keys().collect::<Vec<_>>(),
                })
            })
            .collect();
        serde_json::Value::Array(folders).to_string()
    }
}

impl TemplateStore for FsTemplateStore {
    fn get_example_object(
        &self,
        name: &str,
        parent: &str,
    ) -> Result<ProjectDescriptor, ReconstructionError> {
        self.folders
            .get(parent)
            .and_then(|templates| templates.get(name))
            .cloned()
            .ok_or_else(|| ReconstructionError::TemplateNotFound {
                name: name.to_string(),
                parent: parent.to_string(),
            })
    }

    fn load_example(&self, args: &str) -> anyhow::Result<String> {
        // Already decoded by the caller; folder names may contain `&` or `%`.
        let selection = args
            .strip_prefix("folder=")
            .and_then(|rest| rest.split_once("&name="));
        match selection {
            Some((folder, name)) => {
                let template = self.get_example_object(name, folder)?;
                Ok(serde_json::to_string(&template)?)
            }
            None => Ok(self.listing()),
        }
    }
}

fn load_folder(dir: &Path, folder: &str) -> anyhow::Result<BTreeMap<String, ProjectDescriptor>> {
    let mut templates = BTreeMap::new();
    for entry in sorted_entries(dir)? {
        let Some(file_name) = visible_name(&entry) else {
            continue;
        };
        let template = if entry.is_dir() {
            if !entry.join(MANIFEST).is_file() {
                debug!(path = %entry.display(), "skipping directory without manifest");
                continue;
            }
            load_manifest_template(&entry, &file_name, folder)?
        } else {
            let stem = entry
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(&file_name)
                .to_string();
            let content = fs::read_to_string(&entry)
                .with_context(|| format!("failed to read '{}'", entry.display()))?;
            ProjectDescriptor {
                name: stem,
                parent: folder.to_string(),
                files: vec![ProjectFile::new(file_name, content, true)],
                ..ProjectDescriptor::default()
            }
        };
        if templates.contains_key(&template.name) {
            warn!(folder, template = %template.name, "duplicate template name, keeping the first");
            continue;
        }
        templates.insert(template.name.clone(), template);
    }
    Ok(templates)
}

fn load_manifest_template(dir: &Path, name: &str, folder: &str) -> anyhow::Result<ProjectDescriptor> {
    let raw = fs::read_to_string(dir.join(MANIFEST))?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .with_context(|| format!("invalid manifest in '{}'", dir.display()))?;
    let mut files = Vec::with_capacity(manifest.files.len());
    for file in manifest.files {
        let path = sandbox::path::resolve(dir, &file.name)?;
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        files.push(ProjectFile::new(file.name, content, file.modifiable));
    }
    Ok(ProjectDescriptor {
        name: name.to_string(),
        parent: folder.to_string(),
        args: manifest.args,
        conf_type: manifest.conf_type,
        files,
        test_classes: manifest.test_classes,
    })
}

fn sorted_entries(dir: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

fn visible_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    (!name.starts_with('.')).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let basics = temp.path().join("Basic syntax");
        fs::create_dir_all(basics.join("Inheritance")).unwrap();
        fs::write(basics.join("Hello.kt"), "fun main() {}").unwrap();
        fs::write(basics.join("Inheritance/main.kt"), "class Child : Base()").unwrap();
        fs::write(basics.join("Inheritance/Base.kt"), "open class Base").unwrap();
        fs::write(
            basics.join("Inheritance").join(MANIFEST),
            r#"{"files":[{"name":"main.kt"},{"name":"Base.kt","modifiable":false}],
                "testClasses":["ChildTest"],"confType":"junit"}"#,
        )
        .unwrap();
        temp
    }

    #[test]
    fn loads_single_and_multi_file_templates() {
        let temp = fixture();
        let store = FsTemplateStore::load(temp.path()).unwrap();
        assert_eq!(store.len(), 2);

        let hello = store.get_example_object("Hello", "Basic syntax").unwrap();
        assert_eq!(hello.files.len(), 1);
        assert!(hello.files[0].modifiable);

        let inheritance = store
            .get_example_object("Inheritance", "Basic syntax")
            .unwrap();
        assert_eq!(inheritance.test_classes, vec!["ChildTest".to_string()]);
        assert_eq!(inheritance.conf_type, Some(RunConfiguration::Junit));
        assert!(!inheritance.file("Base.kt").unwrap().modifiable);
    }

    #[test]
    fn load_example_returns_template_or_listing() {
        let temp = fixture();
        let store = FsTemplateStore::load(temp.path()).unwrap();

        let one: serde_json::Value =
            serde_json::from_str(&store.load_example("folder=Basic syntax&name=Hello").unwrap())
                .unwrap();
        assert_eq!(one["name"], "Hello");

        let all: serde_json::Value =
            serde_json::from_str(&store.load_example("all").unwrap()).unwrap();
        assert_eq!(all[0]["folder"], "Basic syntax");
        assert_eq!(all[0]["examples"][1], "Inheritance");
    }

    #[test]
    fn unknown_template_is_not_found() {
        let temp = fixture();
        let store = FsTemplateStore::load(temp.path()).unwrap();
        assert!(matches!(
            store.get_example_object("Nope", "Basic syntax"),
            Err(ReconstructionError::TemplateNotFound { .. })
        ));
        assert!(store.load_example("folder=Basic syntax&name=Nope").is_err());
    }

    #[test]
    fn decoded_selection_keeps_percent_and_ampersand() {
        let temp = fixture();
        let odd = temp.path().join("100% Kotlin");
        fs::create_dir_all(&odd).unwrap();
        fs::write(odd.join("A & B.kt"), "fun main() {}").unwrap();
        let store = FsTemplateStore::load(temp.path()).unwrap();

        let params = dispatcher::RequestParameters::parse(Some(
            "type=loadExample&args=folder=100%25%20Kotlin&name=A%20%26%20B",
        ));
        let one: serde_json::Value =
            serde_json::from_str(&store.load_example(params.args()).unwrap()).unwrap();
        assert_eq!(one["name"], "A & B");
        assert_eq!(one["parent"], "100% Kotlin");
    }

    #[test]
    fn missing_root_serves_nothing() {
        let temp = TempDir::new().unwrap();
        let store = FsTemplateStore::load(&temp.path().join("absent")).unwrap();
        assert!(store.is_empty());
    }
}
