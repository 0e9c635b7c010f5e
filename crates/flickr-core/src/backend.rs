use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::{Deserialize, Serialize};

use crate::plan::TagWrite;

/// What the backend does with the file it rewrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupPolicy {
    /// Keep a `<name>_original` copy next to the file
    #[default]
    CreateBackup,
    OverwriteInPlace,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("could not run {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Applies tag writes to media files.
pub trait MetadataBackend {
    /// Write `writes` into the file at `path`. One blocking call per file.
    fn apply(&self, path: &Path, writes: &[TagWrite], backup: BackupPolicy) -> Result<(), BackendError>;

    /// Produce a CSV manifest (`Directory`, `FileName`, `DateTimeOriginal`,
    /// `CreateDate`) for every file under `root`.
    fn scan_manifest(&self, root: &Path) -> Result<String, BackendError>;
}

/// Backend driving the `exiftool` executable.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn run(&self, args: &[OsString]) -> Result<Output, BackendError> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| BackendError::Launch {
                program: self.program_name(),
                source,
            })?;
        if !output.status.success() {
            return Err(BackendError::Failed {
                program: self.program_name(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Check the executable runs; returns its version string.
    pub fn version(&self) -> Result<String, BackendError> {
        let output = self.run(&["-ver".into()])?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Command-line arguments for one write call.
    pub fn write_args(path: &Path, writes: &[TagWrite], backup: BackupPolicy) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(writes.len() + 2);
        if backup == BackupPolicy::OverwriteInPlace {
            args.push("-overwrite_original".into());
        }
        for w in writes {
            let op = if w.append { "+=" } else { "=" };
            args.push(format!("-{}{}{}", w.tag, op, w.value).into());
        }
        args.push(path.as_os_str().to_os_string());
        args
    }

    pub fn manifest_args(root: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-r",
            "-csv",
            "-DateTimeOriginal",
            "-CreateDate",
            "-FileName",
            "-Directory",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(root.as_os_str().to_os_string());
        args
    }
}

impl MetadataBackend for ExifTool {
    fn apply(&self, path: &Path, writes: &[TagWrite], backup: BackupPolicy) -> Result<(), BackendError> {
        self.run(&Self::write_args(path, writes, backup)).map(|_| ())
    }

    fn scan_manifest(&self, root: &Path) -> Result<String, BackendError> {
        let output = self.run(&Self::manifest_args(root))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaFile;
    use crate::plan::{plan_writes, FieldSet};
    use crate::sidecar::SidecarRecord;

    #[test]
    fn test_write_args() {
        let record = SidecarRecord {
            id: "12345678901".into(),
            title: "Sunset".into(),
            description: String::new(),
            tags: vec!["beach".into()],
            geo: None,
            date_taken: None,
        };
        let file = MediaFile::from_path(PathBuf::from("/m/x_12345678901.jpg")).unwrap();
        let plan = plan_writes(&record, &file, &FieldSet::descriptive());

        let args = ExifTool::write_args(&file.path, &plan.tag_writes(), BackupPolicy::CreateBackup);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-XMP:Title=Sunset",
                "-IPTC:ObjectName=Sunset",
                "-XMP:Subject+=beach",
                "-IPTC:Keywords+=beach",
                "/m/x_12345678901.jpg",
            ]
        );

        let args = ExifTool::write_args(&file.path, &plan.tag_writes(), BackupPolicy::OverwriteInPlace);
        assert_eq!(args[0], "-overwrite_original");
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let tool = ExifTool::new("/nonexistent/exiftool-binary");
        let err = tool.apply(Path::new("x.jpg"), &[], BackupPolicy::CreateBackup).unwrap_err();
        assert!(matches!(err, BackendError::Launch { .. }));
    }
}
