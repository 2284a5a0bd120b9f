//! Pattern labeller (patlabel) - command-line entry point
//!
//! Drives the labelling engine headlessly: inspect the attribute taxonomy,
//! import subjects, rank pattern candidates for a subject, record assignments
//! and edit the pattern catalog. Every mutating command persists through the
//! background save worker, which is flushed before exit. The subject last
//! worked on is remembered beside the taxonomy.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use patlabel_cli::{DecodedImage, FileBytesDecoder, ImageCache, LastRunInfo, Session};
use patlabel_common::config::{self, TomlConfig};
use patlabel_common::registry::{attributes_path, RegistrySource};
use patlabel_common::{MatchMode, PatternCatalog, Record, TypeRegistry};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for patlabel
#[derive(Parser, Debug)]
#[command(name = "patlabel")]
#[command(about = "Assign pattern images to subject images by attribute matching")]
#[command(version)]
struct Cli {
    /// Bootstrap config file (default: <config dir>/patlabel/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project root folder containing one image folder per record
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Attribute taxonomy document (default from config, `__attributes.xml`)
    #[arg(long, global = true)]
    attributes: Option<PathBuf>,

    /// Project document (default: <root>/<export_name>)
    #[arg(short, long, global = true)]
    document: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attribute types, their values and external mappings
    Types,

    /// Map an external attribute value onto a local one
    MapExternal {
        /// External attribute name
        external: String,
        /// Local attribute type it maps onto
        local_type: String,
        external_value: String,
        local_value: String,
    },

    /// Rank candidate patterns for a subject
    Rank {
        subject: String,
        #[command(flatten)]
        mode: ModeArgs,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a subject and its thumbnail; without a name, where the last run left off
    Show {
        subject: Option<String>,
        /// Move this many subjects forward (negative: back), wrapping around
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        step: isize,
        #[arg(long)]
        json: bool,
    },

    /// Add a subject for every image folder below the root folder
    ImportImages {
        /// Folder to scan instead of the root folder
        folder: Option<PathBuf>,
    },

    /// Merge a tab-separated external catalogue export into the subjects
    ImportExternal { list: PathBuf },

    /// Assign a pattern to a subject (empty name clears the assignment)
    Assign { subject: String, pattern: String },

    /// Set an attribute of a subject, or of a pattern with --pattern
    SetAttr {
        name: String,
        type_name: String,
        value: String,
        /// `name` is a catalog pattern
        #[arg(long)]
        pattern: bool,
    },

    /// Add a pattern to the catalog
    AddPattern {
        name: String,
        /// Attribute as type=value (repeatable)
        #[arg(short, long = "attr", value_parser = parse_key_value)]
        attrs: Vec<(String, String)>,
        /// Image file name inside the pattern folder (repeatable)
        #[arg(short, long = "image")]
        images: Vec<String>,
        #[arg(long)]
        url: Option<String>,
    },

    /// Remove a pattern from the catalog
    RemovePattern { name: String },

    /// Show usage counts per pattern
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Load the taxonomy and the project document, migrating legacy formats
    Migrate,

    /// Merge the patterns of every project document in a folder into the catalog
    Collect { dir: PathBuf },
}

#[derive(Args, Debug)]
struct ModeArgs {
    /// Compare a single attribute type (the configured match axis)
    #[arg(long)]
    single: bool,

    /// Attribute type compared in single-attribute mode
    #[arg(long, requires = "single")]
    axis: Option<String>,
}

impl ModeArgs {
    fn resolve(&self, config: &TomlConfig) -> MatchMode {
        if self.single {
            MatchMode::SingleAttribute(self.axis.clone().unwrap_or_else(|| config.match_axis.clone()))
        } else {
            MatchMode::FullAttribute
        }
    }
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected type=value, got '{}'", s))
}

/// Resolved settings every command works against
struct AppContext {
    config: TomlConfig,
    attributes: PathBuf,
    root: PathBuf,
    document: PathBuf,
    last_run: LastRunInfo,
}

#[derive(Serialize)]
struct RankRow<'a> {
    rank: usize,
    pattern: &'a str,
    usage: usize,
    pinned: bool,
}

#[derive(Serialize)]
struct ThumbnailRow {
    index: usize,
    path: PathBuf,
    bytes: usize,
}

#[derive(Serialize)]
struct SubjectReport<'a> {
    index: usize,
    name: &'a str,
    external_id: Option<&'a str>,
    title: Option<&'a str>,
    url: Option<&'a str>,
    mapped_pattern: Option<&'a str>,
    attributes: Vec<(&'a str, &'a str)>,
    images: usize,
    thumbnail: Option<ThumbnailRow>,
    pattern_thumbnail: Option<ThumbnailRow>,
}

#[derive(Serialize)]
struct StatsRow<'a> {
    pattern: &'a str,
    position: usize,
    count: usize,
}

#[derive(Serialize)]
struct StatsReport<'a> {
    subjects: usize,
    assigned: usize,
    patterns: Vec<StatsRow<'a>>,
}

fn init_logging(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let (stderr_layer, file_layer) = match &config.logging.file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (
                None,
                Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false)),
            )
        }
        None => (Some(fmt::layer().with_writer(std::io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(config::default_config_path);
    let config = config::load_toml_config(config_path.as_deref()).context("Failed to load config")?;
    init_logging(&config)?;

    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    let attributes = attributes_path(
        &cwd,
        cli.attributes.as_deref().unwrap_or(&config.attributes_file),
    );
    let last_run = LastRunInfo::load(&LastRunInfo::path_beside(&attributes));
    let root = config::resolve_root_folder(
        cli.root_folder.as_deref(),
        &config,
        &last_run.root_fallback(&cwd),
    );
    let document = cli
        .document
        .clone()
        .unwrap_or_else(|| root.join(&config.export_name));
    info!("Root folder: {}", root.display());

    let ctx = AppContext {
        config,
        attributes,
        root,
        document,
        last_run,
    };
    run(cli.command, &ctx)
}

fn load_registry(ctx: &AppContext) -> Result<Arc<TypeRegistry>> {
    let registry = TypeRegistry::load_from(&ctx.attributes)
        .with_context(|| format!("Failed to load attribute taxonomy {}", ctx.attributes.display()))?;
    Ok(Arc::new(registry))
}

fn open_session(ctx: &AppContext, registry: Arc<TypeRegistry>) -> Result<Session> {
    let cache = Arc::new(ImageCache::with_capacity_kib(ctx.config.image_cache_kib));
    let mut session = Session::open_or_create(registry, &ctx.root, &ctx.document)
        .with_context(|| format!("Failed to open project {}", ctx.document.display()))?
        .with_image_cache(cache);
    if let Some(index) = session.restore(&ctx.last_run) {
        info!("Resuming at subject #{}", index);
    }
    session.enable_background_save()?;
    Ok(session)
}

/// Queue the save, flush it and record where we left off
fn finish(ctx: &AppContext, mut session: Session, pattern_dir: Option<PathBuf>) -> Result<()> {
    if !session.verify_mapping() {
        warn!("Usage table repaired before save");
    }
    session.request_save().context("Failed to queue save")?;
    let current = session.current();
    session.close();
    remember(ctx, current, pattern_dir);
    Ok(())
}

fn remember(ctx: &AppContext, subject_index: usize, pattern_dir: Option<PathBuf>) {
    let mut last_run = ctx.last_run.clone();
    last_run.root_folder = Some(ctx.root.clone());
    last_run.subject_index = subject_index;
    if pattern_dir.is_some() {
        last_run.pattern_dir = pattern_dir;
    }
    let path = LastRunInfo::path_beside(&ctx.attributes);
    if let Err(e) = last_run.save(&path) {
        warn!("Could not write {}: {}", path.display(), e);
    }
}

fn run(command: Command, ctx: &AppContext) -> Result<()> {
    match command {
        Command::Types => {
            let registry = load_registry(ctx)?;
            for type_name in registry.type_names() {
                let values = registry.values_of(type_name).unwrap_or_default();
                println!("{}: {}", type_name, values.join(", "));
            }
            for external in registry.external_names() {
                if let Some(mapping) = registry.external_mapping(external) {
                    println!("{} -> {}", external, mapping.local_type);
                    for (from, to) in &mapping.values {
                        println!("  {} -> {}", from, to);
                    }
                }
            }
        }

        Command::MapExternal {
            external,
            local_type,
            external_value,
            local_value,
        } => {
            let mut registry = TypeRegistry::load_from(&ctx.attributes)
                .with_context(|| format!("Failed to load attribute taxonomy {}", ctx.attributes.display()))?;
            registry.add_external_mapping(&external, &local_type, &external_value, &local_value)?;
            registry
                .save_canonical(&ctx.attributes)
                .context("Failed to save attribute taxonomy")?;
            println!("{}={} -> {}={}", external, external_value, local_type, local_value);
        }

        Command::Rank { subject, mode, json } => {
            let mut session = open_session(ctx, load_registry(ctx)?)?;
            let index = session.subject_index(&subject)?;
            session.navigate(index as isize);
            let mode = mode.resolve(&ctx.config);
            print_ranking(&session, index, &mode, json)?;
            session.close();
        }

        Command::Show { subject, step, json } => {
            let mut session = open_session(ctx, load_registry(ctx)?)?;
            if session.subjects().is_empty() {
                bail!("Project {} has no subjects", ctx.document.display());
            }
            if let Some(name) = &subject {
                let index = session.subject_index(name)?;
                session.navigate(index as isize);
            }
            let index = session.step(step);
            print_subject(&session, index, json)?;
            session.close();
            remember(ctx, index, None);
        }

        Command::ImportImages { folder } => {
            let folder = folder.unwrap_or_else(|| ctx.root.clone());
            let mut session = open_session(ctx, load_registry(ctx)?)?;
            let added = session
                .import_image_folders(&folder)
                .with_context(|| format!("Failed to scan {}", folder.display()))?;
            println!("Added {} subjects from {}", added, folder.display());
            finish(ctx, session, None)?;
        }

        Command::ImportExternal { list } => {
            let mut session = open_session(ctx, load_registry(ctx)?)?;
            let report = session
                .import_external_list(&list)
                .with_context(|| format!("Failed to import {}", list.display()))?;
            println!(
                "{}: {} added, {} updated, {} attributes mapped",
                list.display(),
                report.added,
                report.updated,
                report.mapped
            );
            finish(ctx, session, None)?;
        }

        Command::Assign { subject, pattern } => {
            let mut session = open_session(ctx, load_registry(ctx)?)?;
            let index = session.subject_index(&subject)?;
            session.navigate(index as isize);
            let changed = if pattern.is_empty() {
                session.unassign(index)?
            } else {
                session.assign(index, &pattern)?
            };
            if !changed {
                println!("{} unchanged", subject);
            }
            finish(ctx, session, None)?;
        }

        Command::SetAttr {
            name,
            type_name,
            value,
            pattern,
        } => {
            let mut session = open_session(ctx, load_registry(ctx)?)?;
            if pattern {
                session.set_pattern_attribute(&name, &type_name, &value)?;
            } else {
                let index = session.subject_index(&name)?;
                session.navigate(index as isize);
                session.set_attribute(index, &type_name, &value)?;
            }
            finish(ctx, session, None)?;
        }

        Command::AddPattern {
            name,
            attrs,
            images,
            url,
        } => {
            let registry = load_registry(ctx)?;
            let mut record = Record::new(&registry, name);
            for (type_name, value) in &attrs {
                record.set_attribute(&registry, type_name, value)?;
            }
            record.images = images
                .iter()
                .map(|file| record.image_path(&ctx.root, file))
                .collect();
            record.url = url;

            let mut session = open_session(ctx, registry)?;
            session.add_pattern(record)?;
            finish(ctx, session, None)?;
        }

        Command::RemovePattern { name } => {
            let mut session = open_session(ctx, load_registry(ctx)?)?;
            session.remove_pattern(&name)?;
            finish(ctx, session, None)?;
        }

        Command::Stats { json } => {
            let session = open_session(ctx, load_registry(ctx)?)?;
            print_stats(&session, json)?;
            session.close();
        }

        Command::Migrate => {
            let registry = load_registry(ctx)?;
            match registry.source() {
                RegistrySource::MigratedLegacy => println!("{}: migrated", ctx.attributes.display()),
                _ => println!("{}: current", ctx.attributes.display()),
            }
            if !ctx.document.exists() {
                bail!("Project document {} does not exist", ctx.document.display());
            }
            let codec = patlabel_common::DocumentCodec::new(registry, &ctx.root);
            let outcome = codec
                .load(&ctx.document)
                .with_context(|| format!("Failed to load {}", ctx.document.display()))?;
            match (outcome.fell_back, outcome.migrated) {
                (true, true) => println!("{}: migrated", ctx.document.display()),
                (true, false) => bail!("{}: migration failed, see log", ctx.document.display()),
                _ => println!("{}: current", ctx.document.display()),
            }
        }

        Command::Collect { dir } => {
            let registry = load_registry(ctx)?;
            let collected = PatternCatalog::collect_from_dir(&dir, Arc::clone(&registry))
                .with_context(|| format!("Failed to collect patterns from {}", dir.display()))?;
            let mut session = open_session(ctx, registry)?;
            let mut added = 0;
            for pattern in collected.into_records() {
                if !session.catalog().contains(&pattern.base_name) {
                    session.add_pattern(pattern)?;
                    added += 1;
                }
            }
            println!("Added {} patterns from {}", added, dir.display());
            finish(ctx, session, Some(absolute_dir(&dir)))?;
        }
    }
    Ok(())
}

fn print_ranking(session: &Session, subject: usize, mode: &MatchMode, json: bool) -> Result<()> {
    let candidates = session.candidates(subject, mode)?;
    let rows: Vec<RankRow> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| RankRow {
            rank: i + 1,
            pattern: &c.pattern.base_name,
            usage: c.usage,
            pinned: c.pinned,
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            println!(
                "{:>3}. {}{} ({})",
                row.rank,
                row.pattern,
                if row.pinned { " *" } else { "" },
                row.usage
            );
        }
    }
    Ok(())
}

fn thumbnail_row((index, image): (usize, Arc<DecodedImage>)) -> ThumbnailRow {
    ThumbnailRow {
        index,
        path: image.path.clone(),
        bytes: image.size(),
    }
}

fn print_subject(session: &Session, index: usize, json: bool) -> Result<()> {
    let record = session.subject(index)?;
    let registry = session.registry();
    let thumbnail = session.thumbnail(index, 0, &FileBytesDecoder)?.map(thumbnail_row);
    let pattern_thumbnail = match record.mapped_pattern() {
        Some(name) if session.catalog().contains(name) => session
            .pattern_thumbnail(name, &FileBytesDecoder)?
            .map(thumbnail_row),
        _ => None,
    };
    let report = SubjectReport {
        index,
        name: &record.base_name,
        external_id: record.external_id.as_deref(),
        title: record.external_title.as_deref(),
        url: record.url.as_deref(),
        mapped_pattern: record.mapped_pattern(),
        attributes: record
            .attributes()
            .keys()
            .filter_map(|t| record.attribute(registry, t).map(|v| (t.as_str(), v)))
            .collect(),
        images: record.images.len(),
        thumbnail,
        pattern_thumbnail,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "#{} {} / {}",
        report.index,
        report.name,
        session.subjects().len()
    );
    for (label, value) in [
        ("id", report.external_id),
        ("title", report.title),
        ("url", report.url),
        ("pattern", report.mapped_pattern),
    ] {
        if let Some(value) = value {
            println!("  {}: {}", label, value);
        }
    }
    for (type_name, value) in &report.attributes {
        println!("  {} = {}", type_name, value);
    }
    match &report.thumbnail {
        Some(t) => println!(
            "  image {}/{}: {} ({} bytes)",
            t.index + 1,
            report.images,
            t.path.display(),
            t.bytes
        ),
        None => println!("  no readable image ({} listed)", report.images),
    }
    if let Some(t) = &report.pattern_thumbnail {
        println!("  pattern image: {} ({} bytes)", t.path.display(), t.bytes);
    }
    Ok(())
}

fn print_stats(session: &Session, json: bool) -> Result<()> {
    let table = session.table();
    let entries = table.entries();
    let report = StatsReport {
        subjects: session.subjects().len(),
        assigned: session
            .subjects()
            .iter()
            .filter(|s| s.mapped_pattern().is_some_and(|p| table.resolves(p)))
            .count(),
        patterns: entries
            .iter()
            .map(|(name, entry)| StatsRow {
                pattern: name,
                position: entry.position,
                count: entry.count,
            })
            .collect(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} of {} subjects assigned", report.assigned, report.subjects);
        for row in &report.patterns {
            println!("{:>6}  {}", row.count, row.pattern);
        }
    }
    Ok(())
}

fn absolute_dir(dir: &Path) -> PathBuf {
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}
