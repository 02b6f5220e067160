//! The `olx` command: check, resolve and preview OLX course directories.

mod error;

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use olx_codec::LocalDiskFs;
use olx_core::{value_to_json, CourseKey, UsageKey, UserId};
use olx_field_store::{EffectiveValue, InheritanceResolver, Provenance};
use olx_runtime::{AssignmentStoreConfig, Runtime, RuntimeConfig};
use tracing::{debug, info};

pub use error::{CliError, Result};

/// olx - tools for OLX course directories
#[derive(Parser, Debug)]
#[command(name = "olx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Runtime config file [default: <config dir>/olx/config.json]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import, export and re-import a course, reporting every difference
    Roundtrip(CourseArgs),
    /// Import a course and write it back out in canonical form
    Export {
        #[command(flatten)]
        course: CourseArgs,
        /// Output directory
        #[arg(long)]
        out: PathBuf,
    },
    /// Print effective settings of a usage and where they come from
    Resolve {
        #[command(flatten)]
        course: CourseArgs,
        /// Usage key, e.g. block-v1:edX+Demo+2014+type@problem+block@q1
        usage: UsageKey,
        /// Only this field
        #[arg(long)]
        field: Option<String>,
    },
    /// Print the children of a usage a learner sees
    Children {
        #[command(flatten)]
        course: CourseArgs,
        usage: UsageKey,
        #[arg(long)]
        user: String,
        /// Keep assignments in this JSON file instead of the configured store
        #[arg(long)]
        assignments: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct CourseArgs {
    /// Course directory containing course.xml
    pub course_dir: PathBuf,
    /// Course key, e.g. course-v1:edX+Demo+2014
    #[arg(long = "course-key")]
    pub course_key: CourseKey,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("olx").join("config.json"))
}

fn load_config(path: Option<&PathBuf>) -> Result<RuntimeConfig> {
    match path.cloned().or_else(default_config_path) {
        Some(path) => Ok(RuntimeConfig::load(&path)?),
        None => Ok(RuntimeConfig::default()),
    }
}

/// Run a parsed command, writing its report to `out`.
///
/// Returns `false` when the command ran but found a problem, such as a
/// round trip that diverged.
pub fn run(cli: Cli, out: &mut dyn Write) -> Result<bool> {
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Roundtrip(course) => {
            let fs = LocalDiskFs::new(&course.course_dir)?;
            let divergences = config.codec().check_round_trip(&fs, &course.course_key)?;
            for divergence in &divergences {
                writeln!(out, "{}", divergence)?;
            }
            if divergences.is_empty() {
                writeln!(out, "{}: round trip is clean", course.course_key)?;
            } else {
                writeln!(out, "{}: {} differences", course.course_key, divergences.len())?;
            }
            Ok(divergences.is_empty())
        }
        Command::Export { course, out: dir } => {
            let source = LocalDiskFs::new(&course.course_dir)?;
            let codec = config.codec();
            let imported = codec.import_course(&source, &course.course_key)?;

            fs::create_dir_all(&dir).map_err(|source| CliError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            let mut target = LocalDiskFs::new(&dir)?;
            let export =
                codec.write_course(&imported.root, &imported.store, &imported.tree, &mut target)?;
            info!(files = export.files.len(), "Exported to {}", dir.display());
            for path in export.files.keys() {
                writeln!(out, "{}", path)?;
            }
            Ok(true)
        }
        Command::Resolve {
            course,
            usage,
            field,
        } => {
            let fs = LocalDiskFs::new(&course.course_dir)?;
            let imported = config.codec().import_course(&fs, &course.course_key)?;
            if !imported.tree.contains(&usage) {
                return Err(CliError::UnknownUsage {
                    usage: usage.to_string(),
                });
            }
            let resolver = InheritanceResolver::new(&imported.store, &imported.tree);
            match field {
                Some(field) => {
                    let effective = resolver.resolve(&usage, &field)?;
                    write_effective(out, &field, &effective)?;
                }
                None => {
                    for (field, effective) in resolver.resolve_all(&usage)? {
                        write_effective(out, &field, &effective)?;
                    }
                }
            }
            Ok(true)
        }
        Command::Children {
            course,
            usage,
            user,
            assignments,
        } => {
            if let Some(path) = assignments {
                debug!("Using assignments at {}", path.display());
                config.assignments = AssignmentStoreConfig::Local {
                    path: path.to_string_lossy().into_owned(),
                };
            }
            let fs = LocalDiskFs::new(&course.course_dir)?;
            let mut runtime = Runtime::load(config, &fs, &course.course_key, UserId::new(user))?;
            for child in runtime.visible_children(&usage)? {
                writeln!(out, "{}", child)?;
            }
            for event in runtime.assignments().events().events() {
                writeln!(out, "event {} {}", event.name, event.data)?;
            }
            Ok(true)
        }
    }
}

fn write_effective(out: &mut dyn Write, field: &str, effective: &EffectiveValue) -> Result<()> {
    let source = match &effective.provenance {
        Provenance::Explicit => "explicit".to_string(),
        Provenance::Inherited(from) => format!("inherited from {}", from),
        Provenance::Default => "default".to_string(),
    };
    writeln!(
        out,
        "{} = {} ({})",
        field,
        value_to_json(&effective.value),
        source
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_course(dir: &Path) {
        fs::create_dir_all(dir.join("course")).unwrap();
        fs::write(
            dir.join("course.xml"),
            r#"<course url_name="2014" org="edX" course="Demo"/>"#,
        )
        .unwrap();
        fs::write(
            dir.join("course/2014.xml"),
            r#"<course display_name="Demo" max_attempts="3">
                 <chapter url_name="c1">
                   <vertical url_name="v1">
                     <html url_name="h1">One</html>
                     <html url_name="h2">Two</html>
                   </vertical>
                 </chapter>
               </course>"#,
        )
        .unwrap();
    }

    fn run_args(args: &[&str]) -> (bool, String) {
        let cli = Cli::try_parse_from(args).unwrap();
        let mut out = Vec::new();
        let ok = run(cli, &mut out).unwrap();
        (ok, String::from_utf8(out).unwrap())
    }

    #[test]
    fn roundtrip_reports_clean_course() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path());
        let config = dir.path().join("none.json");
        let (ok, out) = run_args(&[
            "olx",
            "--config",
            config.to_str().unwrap(),
            "roundtrip",
            dir.path().to_str().unwrap(),
            "--course-key",
            "course-v1:edX+Demo+2014",
        ]);
        assert!(ok);
        assert!(out.contains("round trip is clean"));
    }

    #[test]
    fn resolve_prints_provenance() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path());
        let config = dir.path().join("none.json");
        let (_, out) = run_args(&[
            "olx",
            "--config",
            config.to_str().unwrap(),
            "resolve",
            dir.path().to_str().unwrap(),
            "--course-key",
            "course-v1:edX+Demo+2014",
            "block-v1:edX+Demo+2014+type@html+block@h1",
            "--field",
            "max_attempts",
        ]);
        assert_eq!(
            out.trim(),
            "max_attempts = 3 (inherited from block-v1:edX+Demo+2014+type@course+block@2014)"
        );
    }

    #[test]
    fn children_of_plain_block() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path());
        let config = dir.path().join("none.json");
        let (_, out) = run_args(&[
            "olx",
            "--config",
            config.to_str().unwrap(),
            "children",
            dir.path().to_str().unwrap(),
            "--course-key",
            "course-v1:edX+Demo+2014",
            "block-v1:edX+Demo+2014+type@vertical+block@v1",
            "--user",
            "7",
        ]);
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn export_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path());
        let target = dir.path().join("exported");
        let config = dir.path().join("none.json");
        let (ok, out) = run_args(&[
            "olx",
            "--config",
            config.to_str().unwrap(),
            "export",
            dir.path().to_str().unwrap(),
            "--course-key",
            "course-v1:edX+Demo+2014",
            "--out",
            target.to_str().unwrap(),
        ]);
        assert!(ok);
        assert!(out.lines().any(|line| line == "course.xml"));
        assert!(target.join("course.xml").exists());
    }

    #[test]
    fn unknown_usage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_course(dir.path());
        let config = dir.path().join("none.json");
        let cli = Cli::try_parse_from([
            "olx",
            "--config",
            config.to_str().unwrap(),
            "resolve",
            dir.path().to_str().unwrap(),
            "--course-key",
            "course-v1:edX+Demo+2014",
            "block-v1:edX+Demo+2014+type@html+block@missing",
        ])
        .unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            run(cli, &mut out),
            Err(CliError::UnknownUsage { .. })
        ));
    }
}
