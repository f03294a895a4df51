//! Schema file formats and directory loading
//!
//! Layout on disk is `<base>/<version>/segments/<TAG>.json`. A file may
//! also hold a bundle (`{"segments": [...]}`) with many segments. YAML is
//! accepted wherever JSON is.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::model::{CodeValue, ComponentSchema, DataType, ElementSchema, Requirement, SegmentSchema};
use crate::{Error, Result};

/// Serializable segment format for loading from files
#[derive(Debug, Deserialize)]
struct SegmentFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    purpose: String,
    #[serde(default)]
    position: Option<u32>,
    #[serde(default, rename = "loop")]
    loop_id: Option<String>,
    #[serde(default)]
    min_use: usize,
    #[serde(default)]
    max_use: Option<usize>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    elements: Vec<ElementFile>,
}

#[derive(Debug, Deserialize)]
struct ElementFile {
    position: usize,
    #[serde(default)]
    ref_id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default = "default_type")]
    data_type: DataType,
    #[serde(default = "default_requirement")]
    requirement: Requirement,
    #[serde(default)]
    min_length: usize,
    #[serde(default)]
    max_length: usize,
    #[serde(default = "default_repeat")]
    repeat: usize,
    #[serde(default)]
    description: String,
    #[serde(default)]
    codes: Vec<CodeValue>,
    #[serde(default)]
    components: Vec<ComponentFile>,
    #[serde(default)]
    rules: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ComponentFile {
    position: usize,
    #[serde(default)]
    ref_id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default = "default_type")]
    data_type: DataType,
    #[serde(default = "default_requirement")]
    requirement: Requirement,
    #[serde(default)]
    min_length: usize,
    #[serde(default)]
    max_length: usize,
    #[serde(default)]
    codes: Vec<CodeValue>,
}

#[derive(Debug, Deserialize)]
struct BundleFile {
    #[serde(default)]
    version: Option<String>,
    segments: Vec<SegmentFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SchemaDocument {
    Bundle(BundleFile),
    Single(SegmentFile),
}

fn default_type() -> DataType {
    DataType::Alphanumeric
}

fn default_requirement() -> Requirement {
    Requirement::Optional
}

fn default_repeat() -> usize {
    1
}

/// File encodings the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    /// Pick a format from a file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Some(Self::Json),
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Some(Self::Yaml)
            }
            _ => None,
        }
    }
}

/// Reads segment schemas from a directory tree
pub struct SchemaLoader {
    base_path: PathBuf,
}

impl SchemaLoader {
    /// Create a loader rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Root directory
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Load every version directory under the root
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the root cannot be read and
    /// [`Error::InvalidFormat`] for a malformed schema file.
    pub fn load_all(&self) -> Result<Vec<(String, Vec<SegmentSchema>)>> {
        info!("Loading segment schemas from {:?}", self.base_path);
        let mut versions = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(&self.base_path)?
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().is_dir())
            .collect();
        entries.sort_by_key(std::fs::DirEntry::file_name);

        for entry in entries {
            let version = entry.file_name().to_string_lossy().to_string();
            let schemas = self.load_version(&version)?;
            if schemas.is_empty() {
                debug!("No segment schemas found for version {}", version);
                continue;
            }
            versions.push((version, schemas));
        }
        Ok(versions)
    }

    /// Load all segment files of one version
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on read failures and [`Error::InvalidFormat`]
    /// for a malformed schema file.
    pub fn load_version(&self, version: &str) -> Result<Vec<SegmentSchema>> {
        let dir = self.base_path.join(version).join("segments");
        if !dir.is_dir() {
            trace!("Schema directory {:?} does not exist", dir);
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut schemas = Vec::new();
        for path in paths {
            if FileFormat::from_path(&path).is_none() {
                warn!("Skipping non-schema file {:?}", path);
                continue;
            }
            schemas.extend(Self::load_file(&path, version)?);
        }
        info!("Loaded {} segment schemas for version {}", schemas.len(), version);
        Ok(schemas)
    }

    /// Load one schema file (single segment or bundle)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on read failures and [`Error::InvalidFormat`]
    /// when the content does not parse.
    pub fn load_file(path: &Path, version: &str) -> Result<Vec<SegmentSchema>> {
        trace!("Loading schema file {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let format = FileFormat::from_path(path).unwrap_or(FileFormat::Json);
        Self::parse(&content, format, &path.display().to_string(), version)
    }

    /// Parse schema content
    ///
    /// `version` is used for segments whose file does not name one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when the content does not parse or
    /// element positions are not contiguous.
    pub fn parse(
        content: &str,
        format: FileFormat,
        source_name: &str,
        version: &str,
    ) -> Result<Vec<SegmentSchema>> {
        let document: SchemaDocument = match format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::invalid_format(source_name, format!("JSON parse error: {e}")))?,
            FileFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Error::invalid_format(source_name, format!("YAML parse error: {e}")))?,
        };

        let (bundle_version, files) = match document {
            SchemaDocument::Bundle(bundle) => (bundle.version, bundle.segments),
            SchemaDocument::Single(file) => (None, vec![file]),
        };
        let fallback = bundle_version.as_deref().unwrap_or(version);

        files
            .into_iter()
            .map(|f| convert_segment(f, fallback, source_name))
            .collect()
    }
}

fn convert_segment(file: SegmentFile, version: &str, source_name: &str) -> Result<SegmentSchema> {
    let mut elements: Vec<ElementSchema> = file.elements.into_iter().map(convert_element).collect();
    elements.sort_by_key(|e| e.position);

    let mut schema = SegmentSchema::new(
        file.id,
        file.name,
        file.version.unwrap_or_else(|| version.to_string()),
    )
    .with_elements(elements);
    schema.purpose = file.purpose;
    schema.position = file.position;
    schema.loop_id = file.loop_id.filter(|l| !l.is_empty());
    schema.min_use = file.min_use;
    schema.max_use = file.max_use;

    schema
        .check_positions()
        .map_err(|reason| Error::invalid_format(source_name, reason))?;
    Ok(schema)
}

fn convert_element(file: ElementFile) -> ElementSchema {
    let mut components: Vec<ComponentSchema> = file
        .components
        .into_iter()
        .map(|c| ComponentSchema {
            position: c.position,
            ref_id: c.ref_id,
            name: c.name,
            data_type: c.data_type,
            requirement: c.requirement,
            min_length: c.min_length,
            max_length: c.max_length,
            codes: c.codes,
        })
        .collect();
    components.sort_by_key(|c| c.position);

    ElementSchema {
        position: file.position,
        ref_id: file.ref_id,
        name: file.name,
        data_type: file.data_type,
        requirement: file.requirement,
        min_length: file.min_length,
        max_length: file.max_length,
        repeat: file.repeat.max(1),
        description: file.description,
        codes: file.codes,
        components,
        rules: file.rules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N1_JSON: &str = r#"{
        "id": "n1",
        "name": "Party Identification",
        "loop": "N1",
        "max_use": 1,
        "elements": [
            {"position": 2, "ref_id": "93", "name": "Name", "type": "AN", "requirement": "X", "min_length": 1, "max_length": 60},
            {"position": 1, "ref_id": "98", "name": "Entity Identifier Code", "type": "ID", "requirement": "M",
             "min_length": 2, "max_length": 3, "codes": [{"code": "SH", "description": "Shipper"}]}
        ]
    }"#;

    #[test]
    fn test_parse_single_json() {
        let schemas = SchemaLoader::parse(N1_JSON, FileFormat::Json, "N1.json", "004010").unwrap();
        assert_eq!(schemas.len(), 1);
        let n1 = &schemas[0];
        assert_eq!(n1.tag, "N1");
        assert_eq!(n1.version, "004010");
        assert_eq!(n1.loop_id.as_deref(), Some("N1"));
        assert_eq!(n1.elements[0].position, 1);
        assert!(n1.elements[0].is_mandatory());
        assert_eq!(n1.elements[0].data_type, DataType::Identifier);
        assert_eq!(n1.elements[1].requirement, Requirement::Conditional);
    }

    #[test]
    fn test_parse_yaml_bundle() {
        let yaml = r"
version: '005010'
segments:
  - id: NTE
    name: Note
    elements:
      - position: 1
        ref_id: '363'
        type: ID
        min_length: 3
        max_length: 3
      - position: 2
        ref_id: '352'
        type: AN
        requirement: M
        min_length: 1
        max_length: 80
";
        let schemas = SchemaLoader::parse(yaml, FileFormat::Yaml, "bundle.yaml", "004010").unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].version, "005010");
        assert_eq!(schemas[0].elements[1].max_length, 80);
    }

    #[test]
    fn test_gap_in_positions_rejected() {
        let json = r#"{"id": "L11", "elements": [{"position": 1}, {"position": 3}]}"#;
        let err = SchemaLoader::parse(json, FileFormat::Json, "L11.json", "004010").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { .. }));
    }

    #[test]
    fn test_load_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        let seg_dir = dir.path().join("004010").join("segments");
        std::fs::create_dir_all(&seg_dir).unwrap();
        std::fs::write(seg_dir.join("N1.json"), N1_JSON).unwrap();
        std::fs::write(seg_dir.join("README.txt"), "not a schema").unwrap();

        let loader = SchemaLoader::new(dir.path());
        let all = loader.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "004010");
        assert_eq!(all[0].1[0].tag, "N1");
    }

    #[test]
    fn test_missing_version_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SchemaLoader::new(dir.path());
        assert!(loader.load_version("005010").unwrap().is_empty());
    }
}
