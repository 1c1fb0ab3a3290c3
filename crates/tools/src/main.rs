use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use foundation::math::ProjectionRegistry;
use layers::{ImageLayer, ImageOption, surface_projector, warp_quad};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Step count used when a job file has no `arrugatorStep`.
const DEFAULT_STEPS_ENV: &str = "WARP_DEFAULT_STEPS";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let mut args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let cmd = args[1].clone();
    args.drain(0..2);

    match cmd.as_str() {
        "mesh" => cmd_mesh(args),
        "inspect" => cmd_inspect(args),
        _ => Err(usage()),
    }
}

/// `--steps` / `--epsilon` / `--define` flags shared by both commands.
#[derive(Debug, Default)]
struct JobArgs {
    steps: Option<u32>,
    epsilon: Option<f64>,
    registry: ProjectionRegistry,
}

impl JobArgs {
    /// Consumes the flag at `args[*i]` if it is one of ours.
    fn take(&mut self, args: &[String], i: &mut usize) -> Result<bool, String> {
        match args[*i].as_str() {
            "--steps" => {
                *i += 1;
                let v = args.get(*i).ok_or("--steps requires a value")?;
                let steps = v.parse::<u32>().map_err(|e| format!("--steps {v}: {e}"))?;
                self.steps = Some(steps);
                Ok(true)
            }
            "--epsilon" => {
                *i += 1;
                let v = args.get(*i).ok_or("--epsilon requires a value")?;
                let epsilon = v.parse::<f64>().map_err(|e| format!("--epsilon {v}: {e}"))?;
                self.epsilon = Some(epsilon);
                Ok(true)
            }
            "--define" => {
                *i += 1;
                let v = args.get(*i).ok_or("--define requires CODE=DEFINITION")?;
                let (code, definition) = v
                    .split_once('=')
                    .ok_or_else(|| format!("--define {v}: expected CODE=DEFINITION"))?;
                self.registry.define(code, definition);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn apply(&self, option: &mut ImageOption) {
        if let Some(steps) = self.steps {
            option.arrugator_step = steps;
            option.target_epsilon = None;
        }
        if let Some(epsilon) = self.epsilon {
            option.target_epsilon = Some(epsilon);
        }
    }
}

fn cmd_mesh(args: Vec<String>) -> Result<(), String> {
    // warp mesh <job.json> <out.json> [--steps N] [--epsilon E] [--define CODE=DEF]
    if args.len() < 2 {
        return Err(usage());
    }

    let input = PathBuf::from(&args[0]);
    let output = PathBuf::from(&args[1]);

    let mut job = JobArgs::default();
    let mut i = 2;
    while i < args.len() {
        if !job.take(&args, &mut i)? {
            return Err(format!("unknown arg: {}\n\n{}", args[i], usage()));
        }
        i += 1;
    }

    let mut option = read_job(&input)?;
    job.apply(&mut option);

    let layer = ImageLayer::with_registry(layer_id(&input), option, job.registry)
        .map_err(|e| e.to_string())?;
    let mesh = layer.mesh();

    let file = fs::File::create(&output).map_err(|e| format!("create {output:?}: {e}"))?;
    let mut writer = HashingWriter::new(BufWriter::new(file));
    serde_json::to_writer(&mut writer, mesh).map_err(|e| format!("json: {e}"))?;
    writer
        .flush()
        .map_err(|e| format!("flush {output:?}: {e}"))?;
    let hash = writer.finalize_hex();

    info!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        epsilon = ?layer.epsilon(),
        blake3 = %hash,
        "mesh written"
    );
    eprintln!(
        "wrote {} ({} vertices, {} triangles, blake3={hash})",
        output.display(),
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct InspectReport {
    projection: String,
    vertices: usize,
    triangles: usize,
    segments: usize,
    queued: usize,
    epsilon: Option<f64>,
    /// Surface-space extent as `[min, max]`.
    bounds: Option<[[f64; 2]; 2]>,
    counters: BTreeMap<&'static str, u64>,
}

fn cmd_inspect(args: Vec<String>) -> Result<(), String> {
    // warp inspect <job.json> [--steps N] [--epsilon E] [--define CODE=DEF]
    if args.is_empty() {
        return Err(usage());
    }

    let input = PathBuf::from(&args[0]);
    let mut job = JobArgs::default();
    let mut i = 1;
    while i < args.len() {
        if !job.take(&args, &mut i)? {
            return Err(format!("unknown arg: {}\n\n{}", args[i], usage()));
        }
        i += 1;
    }

    let mut option = read_job(&input)?;
    job.apply(&mut option);

    let source = job
        .registry
        .resolve(&option.projection)
        .map_err(|e| e.to_string())?;
    let projection = source.code().to_string();
    let refiner = warp_quad(
        surface_projector(source),
        &option.coordinates,
        option.policy(),
    )
    .map_err(|e| e.to_string())?;

    let snapshot = refiner.metrics().snapshot();
    let bounds = refiner
        .output()
        .projected_bounds()
        .map(|b| [b.min, b.max]);
    let report = InspectReport {
        projection,
        vertices: refiner.vertex_count(),
        triangles: refiner.triangle_count(),
        segments: refiner.segment_count(),
        queued: refiner.queued(),
        epsilon: refiner.epsilon(),
        bounds,
        counters: snapshot.counters.into_iter().collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).map_err(|e| format!("json: {e}"))?
    );
    Ok(())
}

/// Reads an [`ImageOption`] job, filling a missing step count from the
/// environment.
fn read_job(path: &Path) -> Result<ImageOption, String> {
    let bytes = fs::read(path).map_err(|e| format!("read {path:?}: {e}"))?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| format!("parse {path:?}: {e}"))?;
    let has_step = value.get("arrugatorStep").is_some();
    let mut option: ImageOption =
        serde_json::from_value(value).map_err(|e| format!("parse {path:?}: {e}"))?;

    if !has_step && let Ok(raw) = env::var(DEFAULT_STEPS_ENV) {
        option.arrugator_step = raw
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("{DEFAULT_STEPS_ENV}={raw}: {e}"))?;
    }
    Ok(option)
}

fn layer_id(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string()
}

struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
}

impl<W> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
        }
    }

    fn finalize_hex(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn usage() -> String {
    let exe = env::args().next().unwrap_or_else(|| "warp".to_string());
    format!(
        "Usage:\n  {exe} mesh <job.json> <out.json> [--steps N] [--epsilon E] [--define CODE=DEF]\n  {exe} inspect <job.json> [--steps N] [--epsilon E] [--define CODE=DEF]\n\nNotes:\n- --define registers a proj4 definition, e.g. --define 'EPSG:2154=+proj=lcc ...'; repeatable.\n- A job is an image option object: url, projection, coordinates (TL, TR, BR, BL), optional arrugatorStep / targetEpsilon.\n- --epsilon is in squared surface units and overrides the step count.\n- {DEFAULT_STEPS_ENV} sets the step count for jobs that omit arrugatorStep.\n- `mesh` writes {{pos, uv, trigs}} JSON and logs its blake3 hash.\n"
    )
}
