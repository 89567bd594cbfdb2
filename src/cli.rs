use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use log::{debug, info};

use crate::catalog::Catalog;
use crate::config::{Config, LayoutConfig};
use crate::dedupe::{self, Deduplicator};
use crate::error::InkfolioError;
use crate::ids::IdScheme;
use crate::migrate::{MigrateOptions, Migrator};
use crate::rename::AssetLayout;
use crate::reorder::{self, ReorderOptions, Reorderer};
use crate::sizes::{self, SizeCalculator};
use crate::thumbnails::{ThumbnailGenerator, ThumbnailOptions};
use crate::utils::Utils;

#[derive(Parser)]
#[command(
    name = "inkfolio",
    version,
    about = "Inkfolio: catalog and image maintenance for an ink painting portfolio"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Where a project lives and how its images are laid out.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root containing the catalog and the image directories
    #[arg(long = "root", short = 'r')]
    pub root: PathBuf,

    /// Catalog file, relative to the root (default from config: artworks.json)
    #[arg(long = "json")]
    pub catalog: Option<PathBuf>,

    /// Thumbnail directory, relative to the root
    #[arg(long = "thumb-dir")]
    pub thumb_dir: Option<String>,

    /// Large image directory, relative to the root
    #[arg(long = "large-dir")]
    pub large_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Give every artwork a new id and rename its image files to match
    #[command(name = "migrate-ids")]
    MigrateIds {
        #[command(flatten)]
        project: ProjectArgs,

        /// Id scheme for the new ids
        #[arg(long = "id-scheme", value_enum, default_value_t = IdScheme::UuidV7)]
        id_scheme: IdScheme,

        /// Delete image files whose id is not in the catalog
        #[arg(long = "delete-orphans", default_value_t = false)]
        delete_orphans: bool,

        /// Plan and report without changing any file
        #[arg(long = "dry-run", default_value_t = false)]
        dry_run: bool,

        /// First value of the numeric8 counter
        #[arg(long = "start-index", default_value_t = 1)]
        start_index: u64,
    },

    /// Renumber artworks as <year>_<nnn> with no gaps
    Reorder {
        #[command(flatten)]
        project: ProjectArgs,

        /// Show the analysis and the planned renames only
        #[arg(long = "dry-run", default_value_t = false)]
        dry_run: bool,
    },

    /// Remove artworks whose title repeats an earlier one
    Dedupe {
        /// Catalog file to clean; results are written next to it
        input: PathBuf,
    },

    /// Recommend integer print sizes for every artwork
    Sizes {
        /// Project root containing the catalog
        #[arg(long = "root", short = 'r')]
        root: PathBuf,

        /// Catalog file, relative to the root
        #[arg(long = "json")]
        catalog: Option<PathBuf>,

        /// Output file (default: finerworks_size_recommendations.json in the root)
        #[arg(long = "output", short = 'o')]
        output: Option<PathBuf>,
    },

    /// Generate missing thumbnails from the large images
    Thumbnails {
        #[command(flatten)]
        project: ProjectArgs,

        /// Longest side of a thumbnail in pixels (default from config: 800)
        #[arg(long = "max-size", value_parser = clap::value_parser!(u32).range(1..))]
        max_size: Option<u32>,

        /// Regenerate thumbnails that already exist
        #[arg(long = "force", default_value_t = false)]
        force: bool,

        /// Report what would be generated without writing images or the catalog
        #[arg(long = "dry-run", default_value_t = false)]
        dry_run: bool,
    },
}

impl Command {
    fn root(&self) -> Option<&Path> {
        match self {
            Command::MigrateIds { project, .. }
            | Command::Reorder { project, .. }
            | Command::Thumbnails { project, .. } => Some(&project.root),
            Command::Sizes { root, .. } => Some(root),
            Command::Dedupe { .. } => None,
        }
    }
}

/// Project settings after command-line flags have been laid over the config.
#[derive(Debug, Clone, PartialEq)]
struct Project {
    root: PathBuf,
    catalog: PathBuf,
    thumb_dir: String,
    large_dir: String,
}

impl Project {
    fn catalog_path(&self) -> PathBuf {
        Utils::in_root(&self.root, &self.catalog)
    }

    fn layout(&self) -> AssetLayout {
        AssetLayout::new(&self.root, &self.thumb_dir, &self.large_dir)
    }
}

impl ProjectArgs {
    fn resolve(&self, root: PathBuf, layout: &LayoutConfig) -> Project {
        Project {
            root,
            catalog: self
                .catalog
                .clone()
                .unwrap_or_else(|| PathBuf::from(&layout.catalog)),
            thumb_dir: self.thumb_dir.clone().unwrap_or_else(|| layout.thumb_dir.clone()),
            large_dir: self.large_dir.clone().unwrap_or_else(|| layout.large_dir.clone()),
        }
    }
}

impl Cli {
    pub fn handle_command_line() -> Result<(), InkfolioError> {
        let args = Cli::parse();

        let project_dirs = ProjectDirs::from("", "", "inkfolio").ok_or_else(|| {
            InkfolioError::Error("Could not determine the project directories".to_string())
        })?;

        let root = args.command.root().map(Self::resolve_root).transpose()?;
        let config = Config::load_config(&project_dirs, root.as_deref());
        let _logger = Self::setup_logging(&project_dirs, &config)?;

        debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

        match args.command {
            Command::MigrateIds {
                project,
                id_scheme,
                delete_orphans,
                dry_run,
                start_index,
            } => {
                let project = project.resolve(Self::expect_root(root)?, &config.layout);
                Self::migrate_ids(project, id_scheme, delete_orphans, dry_run, start_index)
            }
            Command::Reorder { project, dry_run } => {
                let project = project.resolve(Self::expect_root(root)?, &config.layout);
                Self::reorder(project, dry_run)
            }
            Command::Dedupe { input } => Self::dedupe(&input),
            Command::Sizes { catalog, output, .. } => {
                let root = Self::expect_root(root)?;
                let catalog = catalog.unwrap_or_else(|| PathBuf::from(&config.layout.catalog));
                let output = output.unwrap_or_else(|| PathBuf::from(sizes::OUTPUT_FILE));
                Self::sizes(&Utils::in_root(&root, &catalog), &Utils::in_root(&root, &output))
            }
            Command::Thumbnails {
                project,
                max_size,
                force,
                dry_run,
            } => {
                let project = project.resolve(Self::expect_root(root)?, &config.layout);
                let options = ThumbnailOptions {
                    max_size: max_size.unwrap_or(config.thumbnails.max_size),
                    force,
                    dry_run,
                };
                Self::thumbnails(project, options)
            }
        }
    }

    fn expect_root(root: Option<PathBuf>) -> Result<PathBuf, InkfolioError> {
        root.ok_or_else(|| InkfolioError::Error("A project root is required".to_string()))
    }

    /// The root must be an existing directory; it is canonicalized without the
    /// Windows verbatim prefix.
    fn resolve_root(path: &Path) -> Result<PathBuf, InkfolioError> {
        if !path.exists() {
            return Err(InkfolioError::Error(format!(
                "Project root '{}' does not exist",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(InkfolioError::Error(format!(
                "Project root '{}' is not a directory",
                path.display()
            )));
        }
        Ok(dunce::canonicalize(path)?)
    }

    fn setup_logging(project_dirs: &ProjectDirs, config: &Config) -> Result<LoggerHandle, InkfolioError> {
        let log_dir = project_dirs.data_local_dir().join("logs");

        let handle = Logger::try_with_env_or_str(config.logging.log_spec())?
            .log_to_file(FileSpec::default().directory(log_dir).basename("inkfolio"))
            .rotate(
                Criterion::Size(10 * 1024 * 1024),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(7),
            )
            .format_for_files(flexi_logger::detailed_format)
            .duplicate_to_stderr(Duplicate::Warn)
            .start()?;

        Ok(handle)
    }

    fn migrate_ids(
        project: Project,
        scheme: IdScheme,
        delete_orphans: bool,
        dry_run: bool,
        start_index: u64,
    ) -> Result<(), InkfolioError> {
        let options = MigrateOptions {
            root: project.root.clone(),
            catalog: project.catalog.clone(),
            thumb_dir: project.thumb_dir,
            large_dir: project.large_dir,
            scheme,
            delete_orphans,
            dry_run,
            start_index,
        };
        info!("Migrating ids under {} ({})", options.root.display(), scheme);

        let outcome = Migrator::run(&options)?;
        outcome
            .report
            .print_summary(&options.root, &outcome.report_paths);
        Ok(())
    }

    fn reorder(project: Project, dry_run: bool) -> Result<(), InkfolioError> {
        let options = ReorderOptions {
            root: project.root.clone(),
            catalog: project.catalog.clone(),
            thumb_dir: project.thumb_dir.clone(),
            large_dir: project.large_dir.clone(),
            dry_run,
        };

        let outcome = Reorderer::run(&options)?;

        reorder::print_analysis(&outcome.analysis);
        println!();
        reorder::print_mapping(&outcome.id_map);
        println!("{:<22} {}", "File renames:", outcome.plan.len());

        match (&outcome.backup, &outcome.verification) {
            (Some(backup), Some(verification)) => {
                println!("Backup: {}", backup.display());
                println!();
                reorder::print_verification(verification);
                if verification.is_clean() {
                    println!("All ids are sequential and every artwork has both images");
                }
            }
            _ => println!("Dry run: no files or catalog changed"),
        }
        Ok(())
    }

    fn dedupe(input: &Path) -> Result<(), InkfolioError> {
        let outcome = Deduplicator::run(input)?;
        dedupe::print_duplicates(&outcome.duplicates);
        println!();
        outcome.print_summary();
        Ok(())
    }

    fn sizes(catalog: &Path, output: &Path) -> Result<(), InkfolioError> {
        let recommendations = SizeCalculator::run(catalog, output)?;
        SizeCalculator::print_summary(&recommendations, output);
        Ok(())
    }

    fn thumbnails(project: Project, options: ThumbnailOptions) -> Result<(), InkfolioError> {
        let catalog_path = project.catalog_path();
        let layout = project.layout();
        let mut catalog = Catalog::load(&catalog_path)?;

        let generator = ThumbnailGenerator::new(&layout, options);
        let summary = generator.run(catalog.records());
        summary.print();

        if options.dry_run {
            println!("Dry run: no thumbnails or catalog written");
            return Ok(());
        }

        let updated = generator.update_artwork_paths(catalog.records_mut());
        let backup = catalog.backup()?;
        catalog.save_as(catalog.path())?;
        println!("{:<22} {}", "Image paths updated:", updated);
        println!("Backup: {}", backup.display());
        Ok(())
    }
}
