use std::collections::HashSet;

use crate::domain::AccessionRecord;
use crate::error::PrepError;

/// Checks the read labels of one accession against its `paired` setting.
///
/// Parallel attributes are split on newlines and compared untrimmed.
pub fn validate_pairing(accession: &AccessionRecord, run_id: &str) -> Result<(), PrepError> {
    let paired = accession.get("paired").ok_or_else(|| {
        PrepError::validation(run_id, "experiment is missing the paired attribute")
    })?;

    match paired {
        "0" => {
            // Single end reads share one identifier, compared as whole values.
            if accession.get("pair_id") != accession.get("mate_id") {
                return Err(PrepError::validation(
                    run_id,
                    "for unpaired reads, mate id and pair id have to be the same",
                ));
            }
        }
        "1" => {
            // Paired bam inputs carry no per-file labels to check.
            if accession.get("type") == Some("bam") {
                return Ok(());
            }
            let pairs = required_lines(accession, "pair_id", run_id)?;
            let distinct: HashSet<_> = pairs.iter().collect();
            if distinct.len() * 2 != pairs.len() {
                return Err(PrepError::validation(
                    run_id,
                    "the same pair_id must be used for exactly two lines",
                ));
            }
        }
        other => {
            return Err(PrepError::validation(
                run_id,
                format!("wrong setting paired={other} (use paired=0 or paired=1)"),
            ));
        }
    }

    let labels = required_lines(accession, "label", run_id)?;
    if labels.iter().collect::<HashSet<_>>().len() != 1 {
        return Err(PrepError::validation(
            run_id,
            "all labels in the label attribute should be the same",
        ));
    }

    let mates = required_lines(accession, "mate_id", run_id)?;
    if mates.iter().collect::<HashSet<_>>().len() != mates.len() {
        return Err(PrepError::validation(run_id, "all mate ids need to be different"));
    }
    Ok(())
}

fn required_lines<'a>(
    accession: &'a AccessionRecord,
    attribute: &str,
    run_id: &str,
) -> Result<Vec<&'a str>, PrepError> {
    accession
        .lines(attribute)
        .ok_or_else(|| PrepError::validation(run_id, format!("missing {attribute} attribute")))
}
