use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::AccessionRecord;
use crate::error::PrepError;

pub const DEFAULT_CONFIG_FILE: &str = "buildout.json";
pub const DEFAULT_PIPELINE_SECTION: &str = "pipeline";
pub const QUICK_PART: &str = "Run";

pub type Section = BTreeMap<String, String>;

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawConfig(BTreeMap<String, BTreeMap<String, Value>>);

/// The nested `section -> {key: value}` mapping handed over by the build tool.
#[derive(Debug, Clone, Default)]
pub struct BuildoutConfig {
    sections: BTreeMap<String, Section>,
}

impl BuildoutConfig {
    pub fn from_sections(sections: BTreeMap<String, Section>) -> Self {
        Self { sections }
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn directory(&self) -> Result<Utf8PathBuf, PrepError> {
        self.section("buildout")
            .and_then(|section| section.get("directory"))
            .map(Utf8PathBuf::from)
            .ok_or_else(|| PrepError::Configuration("missing buildout:directory".to_string()))
    }

    pub fn settings(&self) -> Settings {
        self.section("settings")
            .map(Settings::from_section)
            .unwrap_or_default()
    }

    pub fn accession(&self, name: &str) -> Option<AccessionRecord> {
        self.section(name).map(|attributes| AccessionRecord {
            name: name.to_string(),
            attributes: attributes.clone(),
        })
    }

    /// Part names listed in `runs:parts`.
    pub fn run_parts(&self) -> Vec<String> {
        self.section("runs")
            .and_then(|section| section.get("parts"))
            .map(|parts| parts.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Options of every part in `runs:parts`, located under `parts_root` unless
    /// the part section names its own location.
    pub fn parts(&self, parts_root: &Utf8Path) -> Vec<PartOptions> {
        self.run_parts()
            .into_iter()
            .map(|name| {
                let section = self.section(&name);
                let value = |key: &str| section.and_then(|s| s.get(key)).cloned();
                PartOptions {
                    accession: value("accession").unwrap_or_else(|| name.clone()),
                    location: value("location")
                        .map(Utf8PathBuf::from)
                        .unwrap_or_else(|| parts_root.join(&name)),
                    pipeline: value("pipeline"),
                    description: value("description"),
                    name,
                }
            })
            .collect()
    }
}

/// Tool locations from the `settings` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub perl: Option<String>,
    pub overlap: Option<String>,
    pub gem_folder: Option<String>,
    pub nextgem_folder: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl Settings {
    pub fn from_section(section: &Section) -> Self {
        let mut extra = section.clone();
        Self {
            perl: extra.remove("perl"),
            overlap: extra.remove("overlap"),
            gem_folder: extra.remove("gem_folder"),
            nextgem_folder: extra.remove("nextgem_folder"),
            extra,
        }
    }

    /// Looks up a tool location, failing with the missing settings key.
    pub fn require(&self, key: &str) -> Result<&str, PrepError> {
        let value = match key {
            "perl" => self.perl.as_deref(),
            "overlap" => self.overlap.as_deref(),
            "gem_folder" => self.gem_folder.as_deref(),
            "nextgem_folder" => self.nextgem_folder.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        };
        value.ok_or_else(|| PrepError::Configuration(format!("missing settings:{key}")))
    }
}

/// Options of a single part as given by the build tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartOptions {
    pub name: String,
    pub accession: String,
    pub location: Utf8PathBuf,
    pub pipeline: Option<String>,
    pub description: Option<String>,
}

impl PartOptions {
    pub fn new(name: impl Into<String>, location: impl Into<Utf8PathBuf>) -> Self {
        let name = name.into();
        Self {
            accession: name.clone(),
            name,
            location: location.into(),
            pipeline: None,
            description: None,
        }
    }

    /// The part directory name doubles as the experiment id.
    pub fn experiment_id(&self) -> String {
        self.location.file_name().unwrap_or_default().to_string()
    }
}

/// Pipeline options after layering the named section over the default one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineOptions(BTreeMap<String, String>);

impl PipelineOptions {
    pub fn from_section(section: Section) -> Self {
        Self(section)
    }

    pub fn resolve(
        config: &BuildoutConfig,
        override_section: Option<&str>,
    ) -> Result<Self, PrepError> {
        let mut options = config
            .section(DEFAULT_PIPELINE_SECTION)
            .cloned()
            .unwrap_or_default();
        if let Some(name) = override_section {
            let section = config.section(name).ok_or_else(|| {
                PrepError::Configuration(format!("pipeline section not found: {name}"))
            })?;
            options.extend(section.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(Self(options))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn as_section(&self) -> &Section {
        &self.0
    }
}

/// Everything the orchestrator needs to prepare one part.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub part: PartOptions,
    pub accession: AccessionRecord,
    pub pipeline: PipelineOptions,
    pub settings: Settings,
    pub directory: Utf8PathBuf,
}

impl RunContext {
    pub fn resolve(config: &BuildoutConfig, part: &PartOptions) -> Result<Self, PrepError> {
        let mut accession = config
            .accession(&part.accession)
            .ok_or_else(|| PrepError::MissingAccession(part.accession.clone()))?;
        accession.normalize();

        let override_section = part
            .pipeline
            .as_deref()
            .or_else(|| accession.get("pipeline"));
        let pipeline = PipelineOptions::resolve(config, override_section)?;

        Ok(Self {
            part: part.clone(),
            accession,
            pipeline,
            settings: config.settings(),
            directory: config.directory()?,
        })
    }

    pub fn experiment_id(&self) -> String {
        self.part.experiment_id()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&Utf8Path>) -> Result<BuildoutConfig, PrepError> {
        let config_path = path
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_CONFIG_FILE));
        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| PrepError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<BuildoutConfig, PrepError> {
        let raw: RawConfig =
            serde_json::from_str(content).map_err(|err| PrepError::ConfigParse(err.to_string()))?;
        let sections = raw
            .0
            .into_iter()
            .map(|(name, values)| {
                let section = values
                    .into_iter()
                    .map(|(key, value)| {
                        let text = scalar_text(&value).ok_or_else(|| {
                            PrepError::ConfigParse(format!("{name}:{key} must be a scalar value"))
                        })?;
                        Ok((key, text))
                    })
                    .collect::<Result<Section, PrepError>>()?;
                Ok((name, section))
            })
            .collect::<Result<BTreeMap<_, _>, PrepError>>()?;
        Ok(BuildoutConfig::from_sections(sections))
    }
}

/// Lists are accepted as the newline-joined form used by parallel attributes.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Array(_) | Value::Object(_) => None,
                other => scalar_text(other),
            })
            .collect::<Option<Vec<_>>>()
            .map(|lines| lines.join("\n")),
        Value::Object(_) => None,
    }
}
