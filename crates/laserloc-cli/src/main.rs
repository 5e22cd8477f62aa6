//! laserloc CLI — calibrate a ground-plane homography and locate a colored
//! target in recorded frames.

use clap::{ArgGroup, Args, Parser, Subcommand};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use std::path::{Path, PathBuf};

use laserloc::{
    verification_grid, CalibrationSession, ClickOutcome, GridOverlay, GridSpec, Homography,
    HomographyStore, JsonFileStore, LocatorConfig, PixelPoint, TrackingSession, TrackingState,
    WorldPoint, MAX_AXIS_NODES,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

const GRID_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const POINT_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

#[derive(Parser)]
#[command(name = "laserloc")]
#[command(about = "Locate a colored target on a calibrated ground plane")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the pixel → world homography from recorded calibration clicks.
    Calibrate(CliCalibrateArgs),

    /// Feed frames through tracking until the target is stable.
    Track(CliTrackArgs),

    /// Transform a single point with a stored homography.
    Project(CliProjectArgs),

    /// Draw the world verification grid onto an image.
    Grid(CliGridArgs),
}

#[derive(Debug, Clone, Args)]
struct CliCalibrateArgs {
    /// JSON array of [x, y] clicks in display coordinates, one per target.
    #[arg(long)]
    clicks: PathBuf,

    /// Camera frame the clicks were made on.
    #[arg(long)]
    frame: PathBuf,

    /// Locator configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the homography. Defaults to the configured path.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the frame with the verification grid and clicked points drawn on it.
    #[arg(long)]
    grid_image: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliTrackArgs {
    /// Frames in capture order.
    #[arg(long, num_args = 1.., required = true)]
    frames: Vec<PathBuf>,

    /// Stored homography. Defaults to the configured path.
    #[arg(long)]
    homography: Option<PathBuf>,

    /// Locator configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Process every frame and log per-frame detail instead of stopping when stable.
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("point").required(true).args(["pixel", "world"])))]
struct CliProjectArgs {
    /// Stored homography.
    #[arg(long)]
    homography: PathBuf,

    /// Pixel point "X,Y" to map to world coordinates.
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pixel: Option<[f64; 2]>,

    /// World point "X,Y" to map to pixel coordinates.
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    world: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Args)]
struct CliGridArgs {
    /// Stored homography.
    #[arg(long)]
    homography: PathBuf,

    /// Image to draw on.
    #[arg(long)]
    image: PathBuf,

    /// Output image path.
    #[arg(long)]
    out: PathBuf,

    /// Grid spacing in world units.
    #[arg(long, default_value = "10.0", value_parser = parse_step)]
    step: f64,
}

fn parse_pair(s: &str) -> Result<[f64; 2], String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{}'", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid number '{}': {}", v.trim(), e))
    };
    Ok([parse(x)?, parse(y)?])
}

fn parse_step(s: &str) -> Result<f64, String> {
    let step: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid number '{}': {}", s.trim(), e))?;
    if !(step.is_finite() && step > 0.0) {
        return Err(format!("step must be a positive number, got {}", step));
    }
    Ok(step)
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::Track(args) => run_track(&args),
        Commands::Project(args) => run_project(&args),
        Commands::Grid(args) => run_grid(&args),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<LocatorConfig> {
    match path {
        Some(p) => {
            tracing::info!("Loading config: {}", p.display());
            Ok(LocatorConfig::from_json_file(p)?)
        }
        None => Ok(LocatorConfig::default()),
    }
}

fn load_frame(path: &Path) -> CliResult<RgbImage> {
    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    Ok(img.to_rgb8())
}

fn load_homography(path: &Path) -> CliResult<Homography> {
    JsonFileStore::new(path).load().map_err(|e| -> CliError {
        format!("Failed to load homography {}: {}", path.display(), e).into()
    })
}

fn draw_grid(image: &mut RgbImage, overlay: &GridOverlay) {
    for (a, b) in overlay.segments() {
        draw_line_segment_mut(
            image,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            GRID_COLOR,
        );
    }
    for node in &overlay.nodes {
        draw_cross_mut(image, GRID_COLOR, node.x.round() as i32, node.y.round() as i32);
    }
}

// ── calibrate ──────────────────────────────────────────────────────────

fn run_calibrate(args: &CliCalibrateArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| config.homography_path.clone());

    let clicks: Vec<[f64; 2]> = serde_json::from_str(&std::fs::read_to_string(&args.clicks)?)?;
    let frame = load_frame(&args.frame)?;
    tracing::info!(
        "Frame size: {}x{}, {} clicks",
        frame.width(),
        frame.height(),
        clicks.len()
    );

    let mut session =
        CalibrationSession::new(&config.calibration, Box::new(JsonFileStore::new(&out)));
    session.handle_frame(&frame);

    let mut homography = None;
    for [x, y] in clicks {
        match session.handle_click(PixelPoint::new(x, y))? {
            ClickOutcome::Completed(h) => homography = Some(h),
            ClickOutcome::Accepted { .. } => {}
            ClickOutcome::Ignored => tracing::warn!("Extra click ({}, {}) ignored", x, y),
        }
    }
    let Some(h) = homography else {
        return Err(format!(
            "calibration incomplete: {} of {} targets clicked",
            session.correspondences().len(),
            session.target_count()
        )
        .into());
    };

    if let Some(grid_path) = &args.grid_image {
        let mut canvas = frame.clone();
        draw_grid(&mut canvas, &verification_grid(&h, &GridSpec::default()));
        for p in session.correspondences().pixel_points() {
            draw_hollow_circle_mut(
                &mut canvas,
                (p.x.round() as i32, p.y.round() as i32),
                4,
                POINT_COLOR,
            );
        }
        canvas.save(grid_path)?;
        tracing::info!("Verification grid written to {}", grid_path.display());
    }

    println!("{}", serde_json::to_string_pretty(&h.to_rows())?);
    Ok(())
}

// ── track ──────────────────────────────────────────────────────────────

fn run_track(args: &CliTrackArgs) -> CliResult<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.tracking.debug |= args.debug;
    let path = args
        .homography
        .clone()
        .unwrap_or_else(|| config.homography_path.clone());

    let store = JsonFileStore::new(&path);
    let mut session = TrackingSession::from_store(config.tracking.clone(), &store)?;

    for frame_path in &args.frames {
        let frame = load_frame(frame_path)?;
        let state = session.handle_frame(&frame);
        if let Some(obs) = session.last_observation() {
            tracing::debug!(
                "{}: pixel {:?} world {:?}",
                frame_path.display(),
                obs.pixel,
                obs.world
            );
        }
        if state == TrackingState::Stable {
            break;
        }
    }

    match session.target_location() {
        Some(p) if session.is_stable() => {
            println!("{:.3} {:.3}", p.x, p.y);
            Ok(())
        }
        Some(p) => Err(format!(
            "target not stable after {} frames (last estimate {})",
            session.frames_seen(),
            p
        )
        .into()),
        None => Err(format!("target not found in {} frames", session.frames_seen()).into()),
    }
}

// ── project ────────────────────────────────────────────────────────────

fn run_project(args: &CliProjectArgs) -> CliResult<()> {
    let h = load_homography(&args.homography)?;
    if let Some([x, y]) = args.pixel {
        let w = h
            .pixel_to_world(PixelPoint::new(x, y))
            .ok_or("pixel projects to infinity")?;
        println!("{:.6} {:.6}", w.x, w.y);
    }
    if let Some([x, y]) = args.world {
        let p = h
            .world_to_pixel(WorldPoint::new(x, y))
            .ok_or("world point projects to infinity")?;
        println!("{:.6} {:.6}", p.x, p.y);
    }
    Ok(())
}

// ── grid ───────────────────────────────────────────────────────────────

fn run_grid(args: &CliGridArgs) -> CliResult<()> {
    let h = load_homography(&args.homography)?;
    let mut canvas = load_frame(&args.image)?;
    let spec = GridSpec {
        step: args.step,
        ..GridSpec::default()
    };
    let overlay = verification_grid(&h, &spec);
    if overlay.nodes.is_empty() {
        return Err(format!(
            "step {} gives no drawable grid (at most {} lines per axis)",
            args.step, MAX_AXIS_NODES
        )
        .into());
    }
    tracing::info!("Drawing {} grid nodes", overlay.nodes.len());
    draw_grid(&mut canvas, &overlay);
    canvas.save(&args.out)?;
    tracing::info!("Grid image written to {}", args.out.display());
    Ok(())
}
