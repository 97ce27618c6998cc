//! Descriptor generation. The SMIL playlist is written here; the remixed `.mp4` index and
//! the `.isml` server manifest are produced by the vendor tools `unified_remix` and
//! `mp4split`, which run as child processes in the output directory.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::archive::s3::S3ArchiveConfig;
use crate::chunk::{period_name, timestamp, ArchiveChunk};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::smil::Smil;

pub const DEFAULT_REMIX: &str = "unified_remix";
pub const DEFAULT_MP4SPLIT: &str = "mp4split";
pub const REMIX_IMAGE: &str = "docker.io/unifiedstreaming/unified_remix";
pub const MP4SPLIT_IMAGE: &str = "docker.io/unifiedstreaming/mp4split";

const SECRET_FLAG: &str = "--s3_secret_key";

/// Credentials the vendor tools use to fetch chunks from the archive.
#[derive(Debug, Clone)]
pub struct S3Auth {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl From<&S3ArchiveConfig> for S3Auth {
    fn from(config: &S3ArchiveConfig) -> Self {
        Self {
            access_key: config.access_key_id.clone(),
            secret_key: config.secret_access_key.clone(),
            region: config.region.clone(),
        }
    }
}

impl S3Auth {
    fn args(&self) -> Vec<String> {
        vec![
            "--s3_access_key".to_string(),
            self.access_key.clone(),
            SECRET_FLAG.to_string(),
            self.secret_key.clone(),
            "--s3_region".to_string(),
            self.region.clone(),
        ]
    }
}

/// How the vendor tools are launched.
#[derive(Debug, Clone, PartialEq)]
pub enum Runner {
    /// Run the tools installed on this host.
    Native,
    /// Run the tool images with `docker run`, mounting `workdir` as `/data`.
    Docker { workdir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub remix: String,
    pub mp4split: String,
    pub runner: Runner,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            remix: DEFAULT_REMIX.to_string(),
            mp4split: DEFAULT_MP4SPLIT.to_string(),
            runner: Runner::Native,
        }
    }
}

impl Toolchain {
    pub fn docker(workdir: impl Into<PathBuf>) -> Self {
        Self {
            remix: REMIX_IMAGE.to_string(),
            mp4split: MP4SPLIT_IMAGE.to_string(),
            runner: Runner::Docker {
                workdir: workdir.into(),
            },
        }
    }

    fn command(&self, tool: &str, args: Vec<String>) -> ToolCommand {
        match &self.runner {
            Runner::Native => ToolCommand {
                program: tool.to_string(),
                args,
            },
            Runner::Docker { workdir } => {
                let mut docker_args = vec![
                    "run".to_string(),
                    "--rm".to_string(),
                    "-e".to_string(),
                    "UspLicenseKey".to_string(),
                    "-v".to_string(),
                    format!("{}:/data", workdir.display()),
                    "-w".to_string(),
                    "/data".to_string(),
                    tool.to_string(),
                ];
                docker_args.extend(args);

                ToolCommand {
                    program: "docker".to_string(),
                    args: docker_args,
                }
            }
        }
    }

    /// `unified_remix -o {period}.mp4 <auth> {period}.smil`
    pub fn remix_command(&self, period: &str, auth: &S3Auth) -> ToolCommand {
        let mut args = vec!["-o".to_string(), format!("{period}.mp4")];
        args.extend(auth.args());
        args.push(format!("{period}.smil"));

        self.command(&self.remix, args)
    }

    /// `mp4split -o {name}.isml --vod2live ... {period}.mp4`
    pub fn isml_command(&self, event: &Event, period: &str, auth: &S3Auth) -> ToolCommand {
        let mut args = vec![
            "-o".to_string(),
            format!("{}.isml", event.name),
            "--vod2live".to_string(),
            "--vod2live_start_time".to_string(),
            timestamp(&event.vod2live_start_time()),
            format!("--time_shift={}", event.delay),
        ];
        args.extend(auth.args());
        args.push(format!("{period}.mp4"));

        self.command(&self.mp4split, args)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for ToolCommand {
    /// Shell-like rendering for logs, with the S3 secret masked.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;

        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                write!(f, " ***")?;
            } else {
                write!(f, " {arg}")?;
            }
            mask_next = arg == SECRET_FLAG;
        }

        Ok(())
    }
}

impl ToolCommand {
    pub async fn run(&self, cwd: &Path) -> Result<()> {
        info!(command = %self, "Running tool");

        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .current_dir(cwd)
            .status()
            .await
            .map_err(|source| Error::Spawn {
                tool: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(Error::Tool {
                tool: self.program.clone(),
                status,
            });
        }

        Ok(())
    }
}

/// Files produced by one publication of an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptors {
    pub period: String,
    pub smil: PathBuf,
    pub mp4: PathBuf,
    pub isml: PathBuf,
}

pub struct DescriptorWriter {
    output_dir: PathBuf,
    store: S3ArchiveConfig,
    auth: S3Auth,
    toolchain: Toolchain,
}

impl DescriptorWriter {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        store: S3ArchiveConfig,
        toolchain: Toolchain,
    ) -> Self {
        let auth = S3Auth::from(&store);

        Self {
            output_dir: output_dir.into(),
            store,
            auth,
            toolchain,
        }
    }

    /// Write the SMIL playlist for `chunks`, remix it into `{period}.mp4` and point
    /// `{event}.isml` at the result.
    #[instrument(skip_all, fields(event = %event.name))]
    pub async fn write(&self, event: &Event, chunks: &[ArchiveChunk]) -> Result<Descriptors> {
        let period = period_name(&event.name, chunks)
            .ok_or_else(|| Error::InvalidEvent("no archive chunks to publish".to_string()))?;

        let sources = chunks.iter().map(|chunk| self.store.object_url(&chunk.path));
        let smil = Smil::from_sources(sources);
        let smil_path = self.output_dir.join(format!("{period}.smil"));
        tokio::fs::write(&smil_path, smil.to_xml()?).await?;
        info!(path = %smil_path.display(), chunks = chunks.len(), "Wrote SMIL playlist");

        self.toolchain
            .remix_command(&period, &self.auth)
            .run(&self.output_dir)
            .await?;
        self.toolchain
            .isml_command(event, &period, &self.auth)
            .run(&self.output_dir)
            .await?;

        Ok(Descriptors {
            mp4: self.output_dir.join(format!("{period}.mp4")),
            isml: self.output_dir.join(format!("{}.isml", event.name)),
            smil: smil_path,
            period,
        })
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;
    use std::str::FromStr;

    use chrono::{DateTime, TimeDelta, Utc};

    use crate::archive::s3::S3ArchiveConfig;
    use crate::event::Event;
    use crate::remix::{Runner, S3Auth, Toolchain};

    fn event() -> Event {
        Event::new(
            "match",
            DateTime::<Utc>::from_str("2021-03-04T10:00:00Z").unwrap(),
            DateTime::<Utc>::from_str("2021-03-04T12:00:00Z").unwrap(),
            600,
            TimeDelta::minutes(10),
        )
        .unwrap()
    }

    fn store() -> S3ArchiveConfig {
        S3ArchiveConfig {
            endpoint: "localhost:9000".to_string(),
            bucket: "archive".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            region: "default".to_string(),
        }
    }

    #[test]
    pub fn test_remix_command() {
        let auth = S3Auth::from(&store());
        let command = Toolchain::default().remix_command("match-A--B", &auth);

        assert_eq!(command.program, "unified_remix");
        assert_eq!(
            command.args,
            vec![
                "-o",
                "match-A--B.mp4",
                "--s3_access_key",
                "key",
                "--s3_secret_key",
                "secret",
                "--s3_region",
                "default",
                "match-A--B.smil",
            ]
        );
    }

    #[test]
    pub fn test_isml_command() {
        let auth = S3Auth::from(&store());
        let command = Toolchain::default().isml_command(&event(), "match-A--B", &auth);

        assert_eq!(command.program, "mp4split");
        assert_eq!(
            &command.args[..6],
            &[
                "-o",
                "match.isml",
                "--vod2live",
                "--vod2live_start_time",
                "2021-03-04T10:20:00Z",
                "--time_shift=600",
            ]
        );
        assert_eq!(command.args.last().unwrap(), "match-A--B.mp4");
    }

    #[test]
    pub fn test_docker_runner() {
        let auth = S3Auth::from(&store());
        let toolchain = Toolchain::docker("/srv/events");
        assert_eq!(
            toolchain.runner,
            Runner::Docker {
                workdir: PathBuf::from("/srv/events")
            }
        );

        let command = toolchain.remix_command("p", &auth);
        assert_eq!(command.program, "docker");
        assert_eq!(
            &command.args[..9],
            &[
                "run",
                "--rm",
                "-e",
                "UspLicenseKey",
                "-v",
                "/srv/events:/data",
                "-w",
                "/data",
                "docker.io/unifiedstreaming/unified_remix",
            ]
        );
        assert_eq!(&command.args[9..11], &["-o", "p.mp4"]);
    }

    #[test]
    pub fn test_display_masks_secret() {
        let auth = S3Auth::from(&store());
        let rendered = Toolchain::default().remix_command("p", &auth).to_string();

        assert_eq!(
            rendered,
            "unified_remix -o p.mp4 --s3_access_key key --s3_secret_key *** --s3_region default p.smil"
        );
        assert!(!rendered.contains("secret "));
    }

    #[cfg(unix)]
    mod process {
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};
        use std::str::FromStr;

        use chrono::{DateTime, Utc};

        use crate::chunk::ArchiveChunk;
        use crate::error::Error;
        use crate::remix::test::{event, store};
        use crate::remix::{DescriptorWriter, Runner, Toolchain};

        /// A stand-in tool that appends its name and arguments to `calls.log` in its cwd.
        fn fake_tool(dir: &Path, name: &str) -> String {
            let path = dir.join(name);
            std::fs::write(
                &path,
                format!("#!/bin/sh\necho \"{name} $*\" >> calls.log\n"),
            )
            .unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_str().unwrap().to_string()
        }

        fn chunks() -> Vec<ArchiveChunk> {
            let t = |s| DateTime::<Utc>::from_str(s).unwrap();
            vec![
                ArchiveChunk::new("ch", t("2021-03-04T10:00:00Z"), t("2021-03-04T10:10:00Z")),
                ArchiveChunk::new("ch", t("2021-03-04T10:10:00Z"), t("2021-03-04T10:20:00Z")),
            ]
        }

        #[tokio::test]
        pub async fn test_write_descriptors() {
            let tools = tempfile::tempdir().unwrap();
            let output = tempfile::tempdir().unwrap();
            let toolchain = Toolchain {
                remix: fake_tool(tools.path(), "remix"),
                mp4split: fake_tool(tools.path(), "mp4split"),
                runner: Runner::Native,
            };

            let writer = DescriptorWriter::new(output.path(), store(), toolchain);
            let descriptors = writer.write(&event(), &chunks()).await.unwrap();

            let period = "match-2021-03-04T10:00:00Z--2021-03-04T10:20:00Z";
            assert_eq!(descriptors.period, period);
            assert_eq!(descriptors.isml, output.path().join("match.isml"));
            assert_eq!(
                descriptors.mp4,
                PathBuf::from(output.path()).join(format!("{period}.mp4"))
            );

            let smil = std::fs::read_to_string(&descriptors.smil).unwrap();
            assert!(smil.contains(
                "http://localhost:9000/archive/ch/2021-03-04/2021-03-04T10:00:00Z--2021-03-04T10:10:00Z.ismv"
            ));

            let calls = std::fs::read_to_string(output.path().join("calls.log")).unwrap();
            let calls: Vec<&str> = calls.lines().collect();
            assert_eq!(calls.len(), 2);
            assert!(calls[0].starts_with(&format!("remix -o {period}.mp4")));
            assert!(calls[1].starts_with("mp4split -o match.isml --vod2live"));
            assert!(calls[1].ends_with(&format!("{period}.mp4")));
        }

        #[tokio::test]
        pub async fn test_failing_tool() {
            let output = tempfile::tempdir().unwrap();
            let toolchain = Toolchain {
                remix: "false".to_string(),
                mp4split: "true".to_string(),
                runner: Runner::Native,
            };

            let writer = DescriptorWriter::new(output.path(), store(), toolchain);
            let err = writer.write(&event(), &chunks()).await.unwrap_err();
            assert!(matches!(err, Error::Tool { ref tool, .. } if tool == "false"));
        }

        #[tokio::test]
        pub async fn test_missing_tool() {
            let output = tempfile::tempdir().unwrap();
            let toolchain = Toolchain {
                remix: "/nonexistent/unified_remix".to_string(),
                ..Toolchain::default()
            };

            let writer = DescriptorWriter::new(output.path(), store(), toolchain);
            let err = writer.write(&event(), &chunks()).await.unwrap_err();
            assert!(matches!(err, Error::Spawn { .. }));
        }

        #[tokio::test]
        pub async fn test_nothing_to_publish() {
            let output = tempfile::tempdir().unwrap();
            let writer = DescriptorWriter::new(output.path(), store(), Toolchain::default());

            assert!(writer.write(&event(), &[]).await.is_err());
        }
    }
}
