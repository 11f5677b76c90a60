use std::fs;
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::PrepError;
use crate::layout::{Layout, remove_link};
use crate::shebang::{PERL_FAMILY, patch_interpreter_line, perl_interpreter_line};

pub const CUFFLINKS_BINARIES: [&str; 6] = [
    "cuffcompare",
    "cuffdiff",
    "cufflinks",
    "cuffmerge",
    "gffread",
    "gtf_to_sam",
];

/// Where a tool binary is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    /// Exact path stored under a settings key.
    Setting(&'static str),
    /// Every match of `pattern` inside the folder stored under `folder_key`.
    Glob {
        folder_key: &'static str,
        pattern: &'static str,
        skip_suffix: Option<&'static str>,
        link_prefix: &'static str,
    },
    /// Fixed path relative to the buildout directory.
    SourceTree(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub source: ToolSource,
    pub make_executable: bool,
    pub patch_perl: bool,
}

impl ToolDescriptor {
    fn new(name: &str, source: ToolSource) -> Self {
        Self {
            name: name.to_string(),
            source,
            make_executable: false,
            patch_perl: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedTool {
    pub tool: String,
    pub source: Utf8PathBuf,
    pub target: Utf8PathBuf,
}

/// Flux, overlap, both GEM generations, cufflinks and FastQC.
pub fn catalogue() -> Vec<ToolDescriptor> {
    let mut tools = vec![
        ToolDescriptor::new("flux", ToolSource::SourceTree("src/flux/bin/flux".to_string())),
        ToolDescriptor::new("overlap", ToolSource::Setting("overlap")),
        ToolDescriptor::new(
            "gem",
            ToolSource::Glob {
                folder_key: "gem_folder",
                pattern: "gem-*",
                skip_suffix: None,
                link_prefix: "",
            },
        ),
        ToolDescriptor::new(
            "nextgem",
            ToolSource::Glob {
                folder_key: "nextgem_folder",
                pattern: "gem-*",
                skip_suffix: Some(".man"),
                link_prefix: "next",
            },
        ),
    ];
    tools.extend(CUFFLINKS_BINARIES.iter().map(|binary| {
        ToolDescriptor::new(binary, ToolSource::SourceTree(format!("src/cufflinks/{binary}")))
    }));
    tools.push(ToolDescriptor {
        make_executable: true,
        patch_perl: true,
        ..ToolDescriptor::new("fastqc", ToolSource::SourceTree("src/fastqc/fastqc".to_string()))
    });
    tools
}

/// Links every catalogue tool into the shared bin tree.
pub fn link_dependencies(
    tools: &[ToolDescriptor],
    layout: &Layout,
    settings: &Settings,
    bin_dir: &Utf8Path,
) -> Result<Vec<LinkedTool>, PrepError> {
    let mut linked = Vec::new();
    for tool in tools {
        let sources = resolve_sources(tool, layout, settings)?;
        if sources.is_empty() {
            warn!(tool = %tool.name, "no binaries matched");
        }
        for (source, link_name) in sources {
            let target = bin_dir.join(&link_name);
            link_tool(tool, settings, &source, &target)?;
            debug!(tool = %tool.name, target = %target, "linked dependency");
            linked.push(LinkedTool {
                tool: tool.name.clone(),
                source,
                target,
            });
        }
    }
    Ok(linked)
}

fn resolve_sources(
    tool: &ToolDescriptor,
    layout: &Layout,
    settings: &Settings,
) -> Result<Vec<(Utf8PathBuf, String)>, PrepError> {
    match &tool.source {
        ToolSource::Setting(key) => Ok(vec![(
            Utf8PathBuf::from(settings.require(key)?),
            tool.name.clone(),
        )]),
        ToolSource::SourceTree(relative) => Ok(vec![(layout.source(relative), tool.name.clone())]),
        ToolSource::Glob {
            folder_key,
            pattern,
            skip_suffix,
            link_prefix,
        } => {
            let folder = settings.require(folder_key)?;
            let full = format!("{}/{pattern}", Pattern::escape(folder));
            let paths = glob::glob(&full)
                .map_err(|err| PrepError::Configuration(format!("invalid pattern {full}: {err}")))?;
            let mut sources = Vec::new();
            for path in paths {
                let path = path.map_err(|err| PrepError::Filesystem(err.to_string()))?;
                let path = Utf8PathBuf::from_path_buf(path).map_err(|path| {
                    PrepError::Filesystem(format!("non UTF-8 path: {}", path.display()))
                })?;
                if skip_suffix.is_some_and(|suffix| path.as_str().ends_with(suffix)) {
                    continue;
                }
                let name = format!("{link_prefix}{}", path.file_name().unwrap_or_default());
                sources.push((path, name));
            }
            sources.sort();
            Ok(sources)
        }
    }
}

fn link_tool(
    tool: &ToolDescriptor,
    settings: &Settings,
    source: &Utf8Path,
    target: &Utf8Path,
) -> Result<(), PrepError> {
    let missing = || PrepError::MissingTool {
        tool: tool.name.clone(),
        target: target.to_path_buf(),
    };
    if tool.make_executable {
        fs::set_permissions(source.as_std_path(), fs::Permissions::from_mode(0o755))
            .map_err(|_| missing())?;
    }
    remove_link(target)?;
    std::os::unix::fs::symlink(source.as_std_path(), target.as_std_path())
        .map_err(|err| PrepError::fs(format!("link {target} -> {source}"), err))?;
    if !target.as_std_path().exists() {
        return Err(missing());
    }
    if tool.patch_perl {
        let line = perl_interpreter_line(settings.require("perl")?);
        patch_interpreter_line(target, &line, PERL_FAMILY)?;
        if !target.as_std_path().exists() {
            return Err(missing());
        }
    }
    Ok(())
}
