//! PcbCam command line
//!
//! Reads Gerber, Excellon or G-Code files and writes CNC programs.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use pcbcam::camlib::{
    excellon_to_cncjob_with, geometry_to_cncjob_with, isolate, mill_drills, CamResult, CncJob, Document, Geometry,
};
use pcbcam::{
    commands, init_logging, AppEvent, CamObject, Config, EventFilter, ObjectEvent, ObjectKind, Project, WorkerStack,
};

#[derive(Parser)]
#[command(name = "pcbcam", version)]
#[command(about = "Gerber and Excellon to isolation, drilling and milling G-Code", long_about = None)]
struct Cli {
    /// Settings file (.json or .toml). Defaults to the per-user file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also save the resulting project to this file
    #[arg(long, global = true)]
    save_project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Isolation routing around the copper of a Gerber layer
    Isolate {
        input: PathBuf,
        /// Output G-Code file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Tool diameter
        #[arg(long)]
        dia: Option<f64>,
        #[arg(long)]
        passes: Option<usize>,
        /// Pass overlap as a fraction of the tool diameter
        #[arg(long)]
        overlap: Option<f64>,
        /// Cut depth (negative)
        #[arg(long, allow_hyphen_values = true)]
        cutz: Option<f64>,
    },
    /// Drill the holes of an Excellon file
    Drill {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma separated tool numbers; all tools when omitted
        #[arg(long)]
        tools: Option<String>,
        /// Stop for a tool change between tools
        #[arg(long)]
        toolchange: bool,
    },
    /// Mill the holes of an Excellon file with an end mill
    Mill {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        tools: Option<String>,
        /// End mill diameter
        #[arg(long)]
        tooldia: f64,
    },
    /// Read a G-Code file back into toolpaths and summarise it
    ParseGcode { input: PathBuf },
    /// List system variables, or print one
    Sys {
        /// Name prefix, e.g. `gerber` or `cncj`
        prefix: Option<String>,
        #[arg(long)]
        get: Option<String>,
    },
}

fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    info!("PcbCam {} built {}", pcbcam::VERSION, pcbcam::BUILD_DATE);

    let defaults = match &cli.config {
        Some(path) => Config::load_from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::load_or_default(),
    };
    let project = Project::new(defaults);

    match cli.command {
        Commands::Isolate {
            input,
            output,
            dia,
            passes,
            overlap,
            cutz,
        } => {
            let workers = WorkerStack::new()?;
            let name = load(&project, &workers, ObjectKind::Gerber, &input)?;
            for (key, value) in [
                ("isotooldia", dia.map(|v| json!(v))),
                ("isopasses", passes.map(|v| json!(v))),
                ("isooverlap", overlap.map(|v| json!(v))),
            ] {
                if let Some(value) = value {
                    commands::set_option(&project, &name, key, value)?;
                }
            }
            run_isolation(&project, &name, cutz, output.as_deref())?;
        }
        Commands::Drill {
            input,
            output,
            tools,
            toolchange,
        } => {
            let workers = WorkerStack::new()?;
            let name = load(&project, &workers, ObjectKind::Excellon, &input)?;
            if toolchange {
                commands::set_option(&project, &name, "toolchange", json!(true))?;
            }
            run_drilling(&project, &name, tools, output.as_deref())?;
        }
        Commands::Mill {
            input,
            output,
            tools,
            tooldia,
        } => {
            let workers = WorkerStack::new()?;
            let name = load(&project, &workers, ObjectKind::Excellon, &input)?;
            run_milling(&project, &name, tools, tooldia, output.as_deref())?;
        }
        Commands::ParseGcode { input } => parse_gcode(&project, &input)?,
        Commands::Sys { prefix, get } => match get {
            Some(name) => match commands::get_sys(&project, &name) {
                Some(value) => println!("{}", value),
                None => bail!("Unknown system variable: {}", name),
            },
            None => {
                for key in commands::list_sys(&project, prefix.as_deref()) {
                    println!("{}", key);
                }
            }
        },
    }

    if let Some(path) = &cli.save_project {
        commands::save_project(&project, path)?;
    }
    Ok(())
}

fn object_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse `path` on a worker and wait for the object to appear.
fn load(project: &Project, workers: &WorkerStack, kind: ObjectKind, path: &Path) -> Result<String> {
    let name = object_name(path);
    let (tx, rx) = mpsc::channel();
    let bus = project.bus();
    let subscription = bus.subscribe(EventFilter::Object(name.clone()), move |event| {
        if let AppEvent::Object(e @ (ObjectEvent::Created { .. } | ObjectEvent::Failed { .. })) = event {
            let _ = tx.send(e);
        }
    });

    let source = path.to_path_buf();
    let spawned = project.spawn_object(workers, kind, &name, move |object, ctx| {
        match object {
            CamObject::Gerber { document, .. } => document.parse_file(&source)?,
            CamObject::Excellon { document, .. } => document.parse_file(&source)?,
            _ => {}
        }
        ctx.progress(100);
        Ok(())
    });
    let outcome = spawned.map_err(anyhow::Error::from).and_then(|_| Ok(rx.recv()?));
    bus.unsubscribe(subscription);

    match outcome? {
        ObjectEvent::Failed { reason, .. } => bail!("Could not open {}: {}", path.display(), reason),
        _ => Ok(name),
    }
}

/// Store a CNC job built by `make` under `name`.
fn add_job(project: &Project, name: &str, make: impl FnOnce(CncJob) -> CamResult<CncJob>) -> Result<()> {
    project.new_object(ObjectKind::CncJob, name, |object| {
        if let CamObject::CncJob { document, .. } = object {
            *document = make(document.clone())?;
        }
        Ok(())
    })?;
    Ok(())
}

fn add_geometry(project: &Project, name: &str, geometry: Geometry) -> Result<()> {
    project.new_object(ObjectKind::Geometry, name, |object| {
        if let CamObject::Geometry { document, .. } = object {
            *document = geometry;
        }
        Ok(())
    })?;
    Ok(())
}

/// Machine geometry object `name` into a job named `job_name`.
fn machine_geometry(project: &Project, name: &str, job_name: &str, cutz: Option<f64>) -> Result<()> {
    if let Some(cutz) = cutz {
        commands::set_option(project, name, "cutz", json!(cutz))?;
    }
    let handle = project.require(name)?;
    let object = handle.read().clone();
    let (geometry, options) = object.geometry(name)?;
    add_job(project, job_name, |job| geometry_to_cncjob_with(job, geometry, options))?;
    commands::set_option(project, job_name, "tooldia", json!(options.cnctooldia))?;
    Ok(())
}

fn run_isolation(project: &Project, name: &str, cutz: Option<f64>, output: Option<&Path>) -> Result<()> {
    let passes = {
        let handle = project.require(name)?;
        let object = handle.read();
        let (gerber, options) = object.gerber(name)?;
        isolate(gerber, options.isotooldia, options.isopasses, options.isooverlap, options.combine_passes)?
    };

    let mut jobs = Vec::with_capacity(passes.len());
    for (i, geometry) in passes.into_iter().enumerate() {
        let geo_name = if i == 0 {
            format!("{}_iso", name)
        } else {
            format!("{}_iso{}", name, i + 1)
        };
        add_geometry(project, &geo_name, geometry)?;
        let job_name = format!("{}_cnc", geo_name);
        machine_geometry(project, &geo_name, &job_name, cutz)?;
        jobs.push(job_name);
    }
    write_jobs(project, &jobs, output)
}

fn tool_list(project: &Project, name: &str, tools: Option<String>) -> Result<String> {
    match tools {
        Some(tools) => Ok(tools),
        None => {
            let handle = project.require(name)?;
            let object = handle.read();
            let (excellon, _) = object.excellon(name)?;
            Ok(excellon.tools.keys().cloned().collect::<Vec<_>>().join(","))
        }
    }
}

fn run_drilling(project: &Project, name: &str, tools: Option<String>, output: Option<&Path>) -> Result<()> {
    let tools = tool_list(project, name, tools)?;
    let handle = project.require(name)?;
    let object = handle.read().clone();
    let (excellon, options) = object.excellon(name)?;

    let job_name = format!("{}_cnc", name);
    add_job(project, &job_name, |job| excellon_to_cncjob_with(job, excellon, options, &tools))?;
    write_jobs(project, &[job_name], output)
}

fn run_milling(project: &Project, name: &str, tools: Option<String>, tooldia: f64, output: Option<&Path>) -> Result<()> {
    let tools: Vec<String> = tool_list(project, name, tools)?
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let geometry = {
        let handle = project.require(name)?;
        let object = handle.read();
        let (excellon, _) = object.excellon(name)?;
        mill_drills(excellon, &tools, tooldia)?
    };

    let geo_name = format!("{}_mill", name);
    add_geometry(project, &geo_name, geometry)?;
    commands::set_option(project, &geo_name, "cnctooldia", json!(tooldia))?;
    let job_name = format!("{}_cnc", geo_name);
    machine_geometry(project, &geo_name, &job_name, None)?;
    write_jobs(project, &[job_name], output)
}

/// Write the jobs one after another, with each job's prepend and append text.
fn write_jobs(project: &Project, jobs: &[String], output: Option<&Path>) -> Result<()> {
    if let (Some(path), [job_name]) = (output, jobs) {
        let handle = project.require(job_name)?;
        let object = handle.read();
        let (job, options) = object.cncjob(job_name)?;
        job.export_gcode(path, &options.prepend, &options.append, options.dwell_time())?;
        info!("Wrote {}", path.display());
        return Ok(());
    }

    let mut text = String::new();
    for job_name in jobs {
        let handle = project.require(job_name)?;
        let object = handle.read();
        let (job, options) = object.cncjob(job_name)?;
        text.push_str(&job.get_gcode(&options.prepend, &options.append));
        text.push('\n');
    }
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            info!("Wrote {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn parse_gcode(project: &Project, input: &Path) -> Result<()> {
    let text = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let name = object_name(input);
    let handle = project.new_object(ObjectKind::CncJob, &name, |object| {
        if let CamObject::CncJob { document, .. } = object {
            document.gcode = text;
            document.gcode_parse();
            document.create_geometry();
        }
        Ok(())
    })?;

    let object = handle.read();
    let (job, _) = object.cncjob(&name)?;
    let mut counts = std::collections::BTreeMap::new();
    for path in &job.gcode_parsed {
        *counts.entry(path.kind.tag()).or_insert(0usize) += 1;
    }
    println!("{}: {} paths ({})", name, job.gcode_parsed.len(), job.units);
    for (tag, count) in counts {
        println!("  {}: {}", tag, count);
    }
    let (xmin, ymin, xmax, ymax) = job.bounds();
    println!("  bounds: ({:.4}, {:.4}) - ({:.4}, {:.4})", xmin, ymin, xmax, ymax);
    Ok(())
}
