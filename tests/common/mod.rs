use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};

use grape_pipeline::config::{BuildoutConfig, ConfigLoader};

pub struct Buildout {
    _temp: tempfile::TempDir,
    pub root: Utf8PathBuf,
}

fn touch(path: &Utf8Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
    fs::write(path.as_std_path(), content).unwrap();
}

impl Buildout {
    /// A buildout tree with pipeline sources, dependency binaries and reads.
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        touch(
            &root.join("src/pipeline/bin/start_RNAseq_pipeline.3.0.pl"),
            "#!/usr/bin/env perl\nuse strict;\n",
        );
        touch(&root.join("src/pipeline/bin/helper.sh"), "#!/bin/sh\n");
        touch(&root.join("src/pipeline/lib/RNAseq_pipeline3.pm"), "1;\n");
        touch(&root.join("src/pipeline/template3.0.txt"), "");
        touch(&root.join("src/pipeline/template.bam.txt"), "");
        touch(&root.join("src/flux/bin/flux"), "#!/bin/sh\n");
        for binary in ["cuffcompare", "cuffdiff", "cufflinks", "cuffmerge", "gffread", "gtf_to_sam"] {
            touch(&root.join("src/cufflinks").join(binary), "");
        }
        touch(&root.join("src/fastqc/fastqc"), "#!/usr/bin/perl\nprint 1;\n");
        touch(&root.join("src/overlap/overlap"), "");
        touch(&root.join("src/gem/gem-mapper"), "");
        touch(&root.join("src/nextgem/gem-mapper"), "");
        for read in ["testA.r1", "testA.r2", "testB.r1", "testB.r2"] {
            touch(&root.join(format!("src/testdata/{read}.fastq.gz")), "");
        }
        Self { _temp: temp, root }
    }

    pub fn read(&self, name: &str) -> String {
        self.root
            .join(format!("src/testdata/{name}.fastq.gz"))
            .to_string()
    }

    pub fn config_value(&self) -> Value {
        let root = &self.root;
        json!({
            "buildout": {"directory": root.as_str()},
            "settings": {
                "perl": "/usr/bin/perl",
                "overlap": root.join("src/overlap/overlap").as_str(),
                "gem_folder": root.join("src/gem").as_str(),
                "nextgem_folder": root.join("src/nextgem").as_str()
            },
            "pipeline": {
                "PROJECTID": "Test",
                "THREADS": 2,
                "DB": "TestRNAseqPipeline",
                "COMMONDB": "TestRNAseqPipelineCommon",
                "MAPPER": "GEM",
                "MISMATCHES": "2",
                "GENOMESEQ": root.join("src/testdata/H.sapiens.genome.hg19.test.fa").as_str(),
                "ANNOTATION": root.join("src/testdata/H.sapiens.EnsEMBL.55.test.gtf").as_str()
            },
            "male": {"CLUSTER": "mem_6"},
            "runs": {"parts": "TestRun TestRunB"},
            "TestRun": {
                "file_location": [
                    self.read("testA.r2"),
                    self.read("testA.r1"),
                    self.read("testB.r2"),
                    self.read("testB.r1")
                ],
                "species": "Homo sapiens",
                "readType": "2x76",
                "cell": "NHEK",
                "rnaExtract": "LONGPOLYA",
                "localization": "CELL",
                "qualities": "solexa",
                "type": "fastq",
                "paired": "1",
                "pair_id": ["testA", "testA", "testB", "testB"],
                "mate_id": ["testA.2", "testA.1", "testB.2", "testB.1"],
                "label": ["Test", "Test", "Test", "Test"]
            },
            "TestRunB": {
                "file_location": self.read("testB.r1"),
                "species": "Homo sapiens\nHomo sapiens",
                "cell": "HeLa S3",
                "rnaExtract": "TOTAL",
                "localization": "NUCLEUS",
                "qualities": "phred",
                "type": "fastq",
                "paired": "0",
                "pair_id": "testB",
                "mate_id": "testB",
                "label": "Nuclear",
                "pipeline": "male"
            }
        })
    }

    pub fn config(&self) -> BuildoutConfig {
        ConfigLoader::parse(&self.config_value().to_string()).unwrap()
    }

    pub fn parts_root(&self) -> Utf8PathBuf {
        self.root.join("parts")
    }
}
