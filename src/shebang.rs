use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;

use crate::error::PrepError;

pub const PERL_FAMILY: &str = "perl";

/// Replaces the interpreter line of a script, keeping the rest byte for byte.
///
/// The current first line must already be a `#!` line naming `family`, so a
/// binary or a script for another interpreter is never rewritten.
pub fn patch_interpreter_line(
    script: &Utf8Path,
    desired_line: &str,
    family: &str,
) -> Result<bool, PrepError> {
    let content = fs::read(script.as_std_path()).map_err(|err| PrepError::fs(script, err))?;
    let (first, rest) = match content.iter().position(|byte| *byte == b'\n') {
        Some(index) => (&content[..index], &content[index + 1..]),
        None => (&content[..], &[][..]),
    };
    let first = String::from_utf8_lossy(first);
    let first = first.trim_end_matches('\r');
    if first == desired_line {
        return Ok(false);
    }
    if !first.starts_with("#!") || !first.contains(family) {
        return Err(PrepError::Shebang {
            path: script.to_path_buf(),
            line: first.to_string(),
        });
    }

    let mut patched = Vec::with_capacity(desired_line.len() + 1 + rest.len());
    patched.extend_from_slice(desired_line.as_bytes());
    patched.push(b'\n');
    patched.extend_from_slice(rest);
    fs::write(script.as_std_path(), patched).map_err(|err| PrepError::fs(script, err))?;
    Ok(true)
}

pub fn perl_interpreter_line(perl: &str) -> String {
    format!("#!{perl}")
}

/// Points every `*.pl` script directly inside `dir` at the configured perl.
pub fn patch_perl_scripts(dir: &Utf8Path, perl: &str) -> Result<Vec<Utf8PathBuf>, PrepError> {
    let line = perl_interpreter_line(perl);
    let pattern = format!("{}/*.pl", Pattern::escape(dir.as_str()));
    let mut patched = Vec::new();
    for path in glob::glob(&pattern).map_err(|err| PrepError::Configuration(err.to_string()))? {
        let path = path.map_err(|err| PrepError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(path).map_err(|path| {
            PrepError::Filesystem(format!("non UTF-8 path: {}", path.display()))
        })?;
        if patch_interpreter_line(&path, &line, PERL_FAMILY)? {
            patched.push(path);
        }
    }
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn script(content: &[u8]) -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("run.pl")).unwrap();
        fs::write(path.as_std_path(), content).unwrap();
        (temp, path)
    }

    #[test]
    fn rewrites_first_line_only() {
        let (_temp, path) = script(b"#!/usr/bin/env perl -w\nuse strict;\n\n  print 1;");
        let changed = patch_interpreter_line(&path, "#!/opt/perl/bin/perl", PERL_FAMILY).unwrap();
        assert!(changed);
        let content = fs::read(path.as_std_path()).unwrap();
        assert_eq!(content, b"#!/opt/perl/bin/perl\nuse strict;\n\n  print 1;");
    }

    #[test]
    fn matching_line_is_left_alone() {
        let (_temp, path) = script(b"#!/opt/perl/bin/perl\nprint 1;\n");
        let changed = patch_interpreter_line(&path, "#!/opt/perl/bin/perl", PERL_FAMILY).unwrap();
        assert!(!changed);
    }

    #[test]
    fn foreign_interpreter_is_rejected() {
        let (_temp, path) = script(b"#!/bin/bash\necho hi\n");
        let err = patch_interpreter_line(&path, "#!/opt/perl/bin/perl", PERL_FAMILY).unwrap_err();
        assert_matches!(err, PrepError::Shebang { line, .. } if line == "#!/bin/bash");
    }

    #[test]
    fn missing_marker_is_rejected() {
        let (_temp, path) = script(b"perl script without marker\n");
        let err = patch_interpreter_line(&path, "#!/opt/perl/bin/perl", PERL_FAMILY).unwrap_err();
        assert_matches!(err, PrepError::Shebang { .. });
    }

    #[test]
    fn patches_perl_scripts_in_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(dir.join("a.pl").as_std_path(), "#!/usr/bin/perl\n1;\n").unwrap();
        fs::write(dir.join("b.pl").as_std_path(), "#!/opt/perl/bin/perl\n1;\n").unwrap();
        fs::write(dir.join("c.sh").as_std_path(), "#!/bin/sh\n").unwrap();

        let patched = patch_perl_scripts(&dir, "/opt/perl/bin/perl").unwrap();
        assert_eq!(patched, vec![dir.join("a.pl")]);
        let content = fs::read_to_string(dir.join("a.pl").as_std_path()).unwrap();
        assert_eq!(content, "#!/opt/perl/bin/perl\n1;\n");
    }
}
