use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::{PartOptions, PipelineOptions};
use crate::domain::{AccessionRecord, InputType};
use crate::error::PrepError;
use crate::layout::Layout;

use Inclusion::{Always, IfPresent};
use Source::{Accession, Pipeline, Run};
use ValueParser::{FluxMem, Integer, NonEmpty, Quoted, ReadLength, Text};

pub const INTERPRETER_LINE: &str = "#!/bin/bash";
pub const START_ENGINE: &str = "bin/start_RNAseq_pipeline.3.0.pl";
pub const EXECUTE_COMMAND: &str = "bin/execute_RNAseq_pipeline3.0.pl all |tee -a pipeline.log";
pub const CLEAN_FLAG: &str = "-clean";

pub const START_SCRIPT: &str = "start.sh";
pub const CLEAN_SCRIPT: &str = "clean.sh";
pub const EXECUTE_SCRIPT: &str = "execute.sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Accession,
    Pipeline,
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueParser {
    Text,
    /// Free text always rendered in single quotes.
    Quoted,
    Integer,
    /// `readType` values such as `2x76D`; unparsable values drop the flag.
    ReadLength,
    /// Memory in gigabytes, with or without the `G` suffix.
    FluxMem,
    /// Any value that is not blank.
    NonEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Always,
    IfPresent,
}

#[derive(Debug, Clone, Copy)]
pub struct FlagRule {
    pub flag: &'static str,
    pub key: &'static str,
    pub source: Source,
    pub parser: ValueParser,
    pub inclusion: Inclusion,
}

const fn rule(
    flag: &'static str,
    key: &'static str,
    source: Source,
    parser: ValueParser,
    inclusion: Inclusion,
) -> FlagRule {
    FlagRule {
        flag,
        key,
        source,
        parser,
        inclusion,
    }
}

/// Order of the flags on the start script command line.
pub const FLAG_SCHEDULE: [FlagRule; 25] = [
    rule("-species", "species", Accession, Quoted, Always),
    rule("-genome", "GENOMESEQ", Pipeline, Text, Always),
    rule("-annotation", "ANNOTATION", Pipeline, Text, Always),
    rule("-project", "PROJECTID", Pipeline, Text, Always),
    rule("-experiment", "experiment_id", Run, Text, Always),
    rule("-template", "TEMPLATE", Pipeline, Text, Always),
    rule("-cellline", "cell", Accession, Quoted, Always),
    rule("-rnafrac", "rnaExtract", Accession, Text, Always),
    rule("-compartment", "localization", Accession, Text, Always),
    rule("-qualities", "qualities", Accession, Text, Always),
    rule("-cluster", "CLUSTER", Pipeline, NonEmpty, IfPresent),
    rule("-database", "DB", Pipeline, Text, Always),
    rule("-commondb", "COMMONDB", Pipeline, Text, Always),
    rule("-host", "HOST", Pipeline, Text, IfPresent),
    rule("-mapper", "MAPPER", Pipeline, Text, Always),
    rule("-run_description", "description", Run, Quoted, IfPresent),
    rule("-preprocess", "PREPROCESS", Pipeline, Quoted, IfPresent),
    rule("-readlength", "readType", Accession, ReadLength, IfPresent),
    rule("-fluxmem", "FLUXMEM", Pipeline, FluxMem, IfPresent),
    rule("-bioreplicate", "replicate", Accession, Integer, IfPresent),
    rule("-threads", "THREADS", Pipeline, Integer, IfPresent),
    rule("-mismatches", "MISMATCHES", Pipeline, Integer, IfPresent),
    rule("-preprocess_trim_length", "PREPROCESS_TRIM_LENGTH", Pipeline, Integer, IfPresent),
    rule("-trimlength", "MIN_RECURSIVE_MAPPING_TRIM_LENGTH", Pipeline, Integer, IfPresent),
    rule("-maxintronlength", "MAXINTRONLENGTH", Pipeline, Integer, IfPresent),
];

/// Run specific values that are neither accession metadata nor pipeline options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub experiment_id: String,
    pub description: Option<String>,
}

impl RunOptions {
    pub fn from_part(part: &PartOptions) -> Self {
        Self {
            experiment_id: part.experiment_id(),
            description: part.description.clone(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        match key {
            "experiment_id" => Some(self.experiment_id.as_str()),
            "description" => self.description.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandArg {
    pub flag: &'static str,
    pub value: String,
    pub quoted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub args: Vec<CommandArg>,
}

impl CommandSpec {
    pub fn value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|arg| arg.flag == flag)
            .map(|arg| arg.value.as_str())
    }

    pub fn flags(&self) -> Vec<&'static str> {
        self.args.iter().map(|arg| arg.flag).collect()
    }

    /// `start.sh` body: interpreter line, engine and the ordered flags.
    pub fn render(&self) -> String {
        let mut command = format!("{INTERPRETER_LINE}\n{START_ENGINE}");
        for arg in &self.args {
            command.push(' ');
            command.push_str(arg.flag);
            command.push(' ');
            if arg.quoted || arg.value.contains(' ') {
                command.push_str(&shell_quote(&arg.value));
            } else {
                command.push_str(&arg.value);
            }
        }
        command
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Bodies of the three scripts written into a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineScripts {
    pub start: String,
    pub clean: String,
    pub execute: String,
}

impl PipelineScripts {
    pub fn from_command(command: &CommandSpec) -> Self {
        let start = command.render();
        let clean = format!("{start} {CLEAN_FLAG}");
        let execute = format!("{INTERPRETER_LINE}\n{EXECUTE_COMMAND}");
        Self {
            start,
            clean,
            execute,
        }
    }

    /// Writes the scripts with mode 0755, returning their paths.
    pub fn write(&self, run_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PrepError> {
        [
            (START_SCRIPT, &self.start),
            (CLEAN_SCRIPT, &self.clean),
            (EXECUTE_SCRIPT, &self.execute),
        ]
        .into_iter()
        .map(|(name, body)| {
            let target = run_dir.join(name);
            write_executable(&target, body)?;
            Ok::<_, PrepError>(target)
        })
        .collect()
    }
}

fn write_executable(target: &Utf8Path, body: &str) -> Result<(), PrepError> {
    let parent = target
        .parent()
        .ok_or_else(|| PrepError::Filesystem(format!("invalid script path {target}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".grape-script")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PrepError::fs(parent, err))?;
    temp.write_all(body.as_bytes())
        .map_err(|err| PrepError::fs(target, err))?;
    temp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o755))
        .map_err(|err| PrepError::fs(target, err))?;
    temp.persist(target.as_std_path())
        .map_err(|err| PrepError::fs(target, err.error))?;
    Ok(())
}

/// Picks or checks the pipeline template for the accession's input type.
pub fn resolve_template(
    pipeline: &PipelineOptions,
    input_type: InputType,
    layout: &Layout,
) -> Result<String, PrepError> {
    let fastq = layout.template(InputType::Fastq);
    let bam = layout.template(InputType::Bam);
    match pipeline.get("TEMPLATE") {
        Some(template) => {
            let wrong = match input_type {
                InputType::Fastq => &bam,
                InputType::Bam => &fastq,
            };
            if template == wrong.as_str() {
                return Err(PrepError::Configuration(format!(
                    "wrong TEMPLATE for {input_type}: {template}"
                )));
            }
            Ok(template.to_string())
        }
        None => Ok(layout.template(input_type).to_string()),
    }
}

/// Builds the ordered start script flags for one part.
pub fn compile_command(
    accession: &AccessionRecord,
    pipeline: &PipelineOptions,
    run: &RunOptions,
    layout: &Layout,
) -> Result<CommandSpec, PrepError> {
    let input_type = accession.input_type()?;
    let mut pipeline = pipeline.clone();
    let template = resolve_template(&pipeline, input_type, layout)?;
    pipeline.insert("TEMPLATE", template);

    let mut args = Vec::new();
    for rule in &FLAG_SCHEDULE {
        let value = match rule.source {
            Source::Accession => accession.get(rule.key),
            Source::Pipeline => pipeline.get(rule.key),
            Source::Run => run.get(rule.key),
        };
        let Some(value) = value else {
            if rule.inclusion == Inclusion::Always {
                return Err(PrepError::Configuration(format!(
                    "missing required value {} for {}",
                    rule.key, rule.flag
                )));
            }
            continue;
        };
        if let Some(value) = parse_value(rule, value)? {
            args.push(CommandArg {
                flag: rule.flag,
                value,
                quoted: rule.parser == ValueParser::Quoted,
            });
        }
    }
    Ok(CommandSpec { args })
}

fn parse_value(rule: &FlagRule, value: &str) -> Result<Option<String>, PrepError> {
    match rule.parser {
        ValueParser::Text | ValueParser::Quoted => Ok(Some(value.to_string())),
        ValueParser::Integer => parse_integer(rule.key, value).map(Some),
        ValueParser::ReadLength => Ok(parse_read_length(value)),
        ValueParser::FluxMem => parse_flux_mem(value).map(|gigabytes| Some(format!("{gigabytes}G"))),
        ValueParser::NonEmpty => {
            if value.trim().is_empty() {
                return Err(PrepError::Configuration(format!(
                    "{} has not been specified",
                    rule.key
                )));
            }
            Ok(Some(value.to_string()))
        }
    }
}

pub fn parse_integer(key: &str, value: &str) -> Result<String, PrepError> {
    if is_digits(value) {
        Ok(value.to_string())
    } else {
        Err(PrepError::Configuration(format!(
            "{key} must be an integer: {value}"
        )))
    }
}

/// `2x76D` -> 76, `100` -> 100; anything else yields `None`.
pub fn parse_read_length(value: &str) -> Option<String> {
    let value = value.strip_suffix('D').unwrap_or(value);
    let value = match value.split_once('x') {
        Some((_, length)) => length,
        None => value,
    };
    is_digits(value).then(|| value.to_string())
}

pub fn parse_flux_mem(value: &str) -> Result<String, PrepError> {
    parse_integer("FLUXMEM", value.strip_suffix('G').unwrap_or(value))
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn accession() -> AccessionRecord {
        AccessionRecord::new("TestRun")
            .with("type", "fastq")
            .with("species", "Homo sapiens")
            .with("cell", "NHEK")
            .with("rnaExtract", "LONGPOLYA")
            .with("localization", "CELL")
            .with("qualities", "solexa")
            .with("readType", "2x76")
    }

    fn pipeline() -> PipelineOptions {
        let mut options = PipelineOptions::default();
        for (key, value) in [
            ("GENOMESEQ", "/db/H.sapiens.genome.hg19.test.fa"),
            ("ANNOTATION", "/db/H.sapiens.EnsEMBL.55.test.gtf"),
            ("PROJECTID", "Test"),
            ("DB", "TestRNAseqPipeline"),
            ("COMMONDB", "TestRNAseqPipelineCommon"),
            ("MAPPER", "GEM"),
            ("THREADS", "2"),
            ("MISMATCHES", "2"),
        ] {
            options.insert(key, value);
        }
        options
    }

    fn run() -> RunOptions {
        RunOptions {
            experiment_id: "TestRun".to_string(),
            description: None,
        }
    }

    fn layout() -> Layout {
        Layout::new("/srv/grape")
    }

    #[test]
    fn renders_full_command() {
        let command = compile_command(&accession(), &pipeline(), &run(), &layout()).unwrap();
        assert_eq!(
            command.render(),
            "#!/bin/bash\nbin/start_RNAseq_pipeline.3.0.pl -species 'Homo sapiens' \
             -genome /db/H.sapiens.genome.hg19.test.fa -annotation /db/H.sapiens.EnsEMBL.55.test.gtf \
             -project Test -experiment TestRun -template /srv/grape/src/pipeline/template3.0.txt \
             -cellline 'NHEK' -rnafrac LONGPOLYA -compartment CELL -qualities solexa \
             -database TestRNAseqPipeline -commondb TestRNAseqPipelineCommon -mapper GEM \
             -readlength 76 -threads 2 -mismatches 2"
        );
    }

    #[test]
    fn empty_cluster_is_fatal() {
        for cluster in ["", "  "] {
            let mut options = pipeline();
            options.insert("CLUSTER", cluster);
            let err = compile_command(&accession(), &options, &run(), &layout()).unwrap_err();
            assert_matches!(err, PrepError::Configuration(message) if message.contains("CLUSTER"));
        }
    }

    #[test]
    fn cluster_sits_between_qualities_and_database() {
        let mut options = pipeline();
        options.insert("CLUSTER", "mem_6");
        let command = compile_command(&accession(), &options, &run(), &layout()).unwrap();
        let flags = command.flags();
        let cluster = flags.iter().position(|flag| *flag == "-cluster").unwrap();
        assert_eq!(flags[cluster - 1], "-qualities");
        assert_eq!(flags[cluster + 1], "-database");
        assert!(command.render().contains(" -cluster mem_6 "));
    }

    #[test]
    fn read_length_parsing() {
        assert_eq!(parse_read_length("2x76").as_deref(), Some("76"));
        assert_eq!(parse_read_length("100").as_deref(), Some("100"));
        assert_eq!(parse_read_length("2x76D").as_deref(), Some("76"));
        assert_eq!(parse_read_length("75D").as_deref(), Some("75"));
        assert_eq!(parse_read_length("abc"), None);

        let command = compile_command(
            &accession().with("readType", "abc"),
            &pipeline(),
            &run(),
            &layout(),
        )
        .unwrap();
        assert_eq!(command.value("-readlength"), None);
    }

    #[test]
    fn integer_options_are_checked() {
        let mut options = pipeline();
        options.insert("THREADS", "two");
        let err = compile_command(&accession(), &options, &run(), &layout()).unwrap_err();
        assert_matches!(err, PrepError::Configuration(message) if message.contains("THREADS"));
    }

    #[test]
    fn flux_memory_keeps_gigabyte_suffix() {
        assert_eq!(parse_flux_mem("16G").unwrap(), "16");
        assert_eq!(parse_flux_mem("16").unwrap(), "16");
        assert!(parse_flux_mem("16M").is_err());

        let mut options = pipeline();
        options.insert("FLUXMEM", "16G");
        let command = compile_command(&accession(), &options, &run(), &layout()).unwrap();
        assert_eq!(command.value("-fluxmem"), Some("16G"));
    }

    #[test]
    fn optional_flags_follow_schedule() {
        let mut options = pipeline();
        options.insert("HOST", "db.example.org");
        options.insert("PREPROCESS", "gunzip -c");
        options.insert("MAXINTRONLENGTH", "50000");
        let run = RunOptions {
            experiment_id: "TestRun".to_string(),
            description: Some("first run".to_string()),
        };
        let command =
            compile_command(&accession().with("replicate", "1"), &options, &run, &layout())
                .unwrap();
        assert_eq!(
            command.flags()[12..],
            [
                "-host",
                "-mapper",
                "-run_description",
                "-preprocess",
                "-readlength",
                "-bioreplicate",
                "-threads",
                "-mismatches",
                "-maxintronlength",
            ]
        );
        let rendered = command.render();
        assert!(rendered.contains("-run_description 'first run'"));
        assert!(rendered.contains("-preprocess 'gunzip -c'"));
    }

    #[test]
    fn template_defaults_by_type() {
        let command = compile_command(
            &accession().with("type", "bam"),
            &pipeline(),
            &run(),
            &layout(),
        )
        .unwrap();
        assert_eq!(
            command.value("-template"),
            Some("/srv/grape/src/pipeline/template.bam.txt")
        );
    }

    #[test]
    fn template_must_match_type() {
        let mut options = pipeline();
        options.insert("TEMPLATE", "/srv/grape/src/pipeline/template.bam.txt");
        let err = compile_command(&accession(), &options, &run(), &layout()).unwrap_err();
        assert_matches!(err, PrepError::Configuration(message) if message.contains("fastq"));

        options.insert("TEMPLATE", "/custom/template.txt");
        let command = compile_command(&accession(), &options, &run(), &layout()).unwrap();
        assert_eq!(command.value("-template"), Some("/custom/template.txt"));
    }

    #[test]
    fn unknown_type_is_fatal() {
        let err = compile_command(
            &accession().with("type", "sra"),
            &pipeline(),
            &run(),
            &layout(),
        )
        .unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));
    }

    #[test]
    fn missing_required_value() {
        let mut accession = accession();
        accession.attributes.remove("qualities");
        let err = compile_command(&accession, &pipeline(), &run(), &layout()).unwrap_err();
        assert_matches!(err, PrepError::Configuration(message) if message.contains("qualities"));
    }

    #[test]
    fn compilation_is_deterministic() {
        let first = compile_command(&accession(), &pipeline(), &run(), &layout()).unwrap();
        let second = compile_command(&accession(), &pipeline(), &run(), &layout()).unwrap();
        assert_eq!(first.render(), second.render());
    }

    #[test]
    fn scripts_are_written_executable() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let command = compile_command(&accession(), &pipeline(), &run(), &layout()).unwrap();
        let scripts = PipelineScripts::from_command(&command);
        let written = scripts.write(&dir).unwrap();
        assert_eq!(written.len(), 3);

        let clean = fs::read_to_string(dir.join(CLEAN_SCRIPT).as_std_path()).unwrap();
        assert!(clean.ends_with("-mismatches 2 -clean"));
        let execute = fs::read_to_string(dir.join(EXECUTE_SCRIPT).as_std_path()).unwrap();
        assert_eq!(
            execute,
            "#!/bin/bash\nbin/execute_RNAseq_pipeline3.0.pl all |tee -a pipeline.log"
        );
        let mode = fs::metadata(dir.join(START_SCRIPT).as_std_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
