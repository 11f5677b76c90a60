//! Zero configuration runs: read files, one genome and one annotation dropped
//! into a working directory.

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;

use crate::config::{BuildoutConfig, PartOptions, PipelineOptions, QUICK_PART, RunContext};
use crate::domain::{AccessionRecord, InputType};
use crate::error::PrepError;
use crate::layout::Layout;

/// Annotation and genome file name signatures of the supported species.
const SPECIES_SIGNATURES: [(&str, &str, &str); 3] = [
    (
        "gencode.v7.annotation.ok.gtf",
        "H.sapiens.genome.hg19.main.fa",
        "Homo sapiens",
    ),
    (
        "mm9_ucsc_UCSC_genes.gtf",
        "M.musculus.genome.mm9.main.fa",
        "Mus musculus",
    ),
    (
        "flyBase.exons.genes_real.transcripts.gtf",
        "D.melanogaster.genome.fa",
        "Drosophila Melanogaster",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickInputs {
    pub reads: Vec<Utf8PathBuf>,
    pub annotation: Utf8PathBuf,
    pub genome: Utf8PathBuf,
}

/// Quick mode only applies to the conventional `Run` part.
pub fn is_applicable(config: &BuildoutConfig, part: &PartOptions) -> bool {
    part.name == QUICK_PART || config.run_parts().iter().any(|name| name == QUICK_PART)
}

pub fn discover(workdir: &Utf8Path) -> Result<QuickInputs, PrepError> {
    let reads = find(workdir, "*.fastq.gz")?;
    if reads.is_empty() {
        return Err(PrepError::Configuration(format!(
            "please drop *.fastq.gz files into {workdir}"
        )));
    }
    let annotation = single(find(workdir, "*.gtf")?, "annotation")?;
    let genome = single(find(workdir, "*.fa")?, "genome")?;
    Ok(QuickInputs {
        reads,
        annotation,
        genome,
    })
}

pub fn infer_species(annotation: &Utf8Path, genome: &Utf8Path) -> Option<&'static str> {
    let annotation = annotation.file_name()?;
    let genome = genome.file_name()?;
    SPECIES_SIGNATURES
        .iter()
        .find(|(gtf, fa, _)| annotation == *gtf && genome == *fa)
        .map(|(_, _, species)| *species)
}

/// Synthesizes the accession and pipeline of a quick run.
pub fn quick_context(
    config: &BuildoutConfig,
    part: &PartOptions,
    workdir: &Utf8Path,
) -> Result<RunContext, PrepError> {
    let inputs = discover(workdir)?;
    let species = infer_species(&inputs.annotation, &inputs.genome).ok_or_else(|| {
        PrepError::Configuration(format!(
            "genome and annotation files don't match: {} {}",
            inputs.genome, inputs.annotation
        ))
    })?;
    let directory = config.directory()?;

    let count = inputs.reads.len();
    let numbered = (0..count).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
    let accession = AccessionRecord::new(QUICK_PART)
        .with(
            "file_location",
            inputs
                .reads
                .iter()
                .map(|path| path.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        )
        .with("species", species)
        .with("readType", "76")
        .with("cell", "Unknown")
        .with("rnaExtract", "Unknown")
        .with("localization", "Unknown")
        .with("qualities", "phred")
        .with("pair_id", numbered.clone())
        .with("mate_id", numbered)
        .with("label", vec![QUICK_PART; count].join("\n"))
        .with("paired", "0")
        .with("type", InputType::Fastq.to_string())
        .with("accession", QUICK_PART);

    let mut pipeline = PipelineOptions::default();
    let template = Layout::new(directory.clone()).template(InputType::Fastq);
    for (key, value) in [
        ("GENOMESEQ", inputs.genome.as_str()),
        ("ANNOTATION", inputs.annotation.as_str()),
        ("PROJECTID", "Quick"),
        ("TEMPLATE", template.as_str()),
        ("THREADS", "1"),
        ("DB", "Quick_RNAseqPipeline"),
        ("COMMONDB", "Quick_RNAseqPipelineCommon"),
        ("MAPPER", "GEM"),
        ("MISMATCHES", "2"),
    ] {
        pipeline.insert(key, value);
    }

    Ok(RunContext {
        part: PartOptions {
            accession: QUICK_PART.to_string(),
            pipeline: None,
            ..part.clone()
        },
        accession,
        pipeline,
        settings: config.settings(),
        directory,
    })
}

fn find(workdir: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>, PrepError> {
    let full = format!("{}/{pattern}", Pattern::escape(workdir.as_str()));
    let mut found = Vec::new();
    for path in glob::glob(&full).map_err(|err| PrepError::Configuration(err.to_string()))? {
        let path = path.map_err(|err| PrepError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(path).map_err(|path| {
            PrepError::Filesystem(format!("non UTF-8 path: {}", path.display()))
        })?;
        found.push(path);
    }
    found.sort();
    Ok(found)
}

fn single(mut paths: Vec<Utf8PathBuf>, kind: &str) -> Result<Utf8PathBuf, PrepError> {
    if paths.len() != 1 {
        let listed = paths.iter().map(|p| p.as_str()).collect::<Vec<_>>();
        return Err(PrepError::Configuration(format!(
            "please provide just one {kind} file, found: {listed:?}"
        )));
    }
    Ok(paths.remove(0))
}
