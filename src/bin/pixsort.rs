use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pixsort", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sort the bright runs of every column of an image and write a PNG.
    Sort(SortArgs),
    /// Print the sort network schedule for a column height as JSON.
    Plan(PlanArgs),
}

#[derive(Parser, Debug)]
struct SortArgs {
    /// Input image (any format the `image` crate decodes).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Sort options JSON. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Activity threshold on the weighted luminance scale, in [0, 1].
    #[arg(long)]
    threshold: Option<f32>,

    /// Put the brightest texel at the top of each run.
    #[arg(long)]
    descending: bool,

    /// Output width. Defaults to the input width.
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Output height. Defaults to the input height.
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Surface to write instead of the sorted output.
    #[arg(long, value_enum, default_value_t = ViewChoice::Output)]
    view: ViewChoice,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,

    /// Worker threads of the CPU backend. Defaults to the global rayon pool.
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Column height in texels.
    #[arg(long)]
    height: u32,

    /// Emit the descending schedule.
    #[arg(long)]
    descending: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    #[cfg(feature = "gpu")]
    Gpu,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ViewChoice {
    Capture,
    Mask,
    Span,
    Keys,
    Output,
}

impl From<ViewChoice> for pixsort::SurfaceRole {
    fn from(v: ViewChoice) -> Self {
        match v {
            ViewChoice::Capture => Self::Capture,
            ViewChoice::Mask => Self::Mask,
            ViewChoice::Span => Self::Span,
            ViewChoice::Keys => Self::Keys,
            ViewChoice::Output => Self::Output,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Sort(args) => cmd_sort(args),
        Command::Plan(args) => cmd_plan(args),
    }
}

fn make_backend(
    choice: BackendChoice,
    settings: &pixsort::RenderSettings,
) -> anyhow::Result<Box<dyn pixsort::RenderBackend>> {
    let kind = match choice {
        BackendChoice::Cpu => pixsort::BackendKind::Cpu,
        #[cfg(feature = "gpu")]
        BackendChoice::Gpu => pixsort::BackendKind::Gpu,
    };

    Ok(pixsort::create_backend(kind, settings)?)
}

fn sort_opts(args: &SortArgs) -> anyhow::Result<pixsort::SortOpts> {
    let mut opts = match &args.config {
        Some(path) => pixsort::SortOpts::from_path(path)?,
        None => pixsort::SortOpts::default(),
    };
    if let Some(t) = args.threshold {
        opts.threshold = t;
    }
    if args.descending {
        opts.direction = pixsort::SortDirection::Descending;
    }
    opts.validate()?;
    Ok(opts)
}

fn cmd_sort(args: SortArgs) -> anyhow::Result<()> {
    let opts = sort_opts(&args)?;
    let source = image::open(&args.in_path)
        .with_context(|| format!("decode image '{}'", args.in_path.display()))?
        .to_rgba8();

    let extent = pixsort::Extent::new(
        args.width.unwrap_or(source.width()),
        args.height.unwrap_or(source.height()),
    )?;
    let settings = pixsort::RenderSettings {
        threads: args.threads,
        ..pixsort::RenderSettings::default()
    };
    let backend = make_backend(args.backend, &settings)?;
    let mut session = pixsort::SortSession::new(backend, extent, opts)?;

    for program in session.disabled_programs() {
        eprintln!("warning: program {program:?} is disabled, output will be degraded");
    }

    match session.render_frame(&source, None)? {
        pixsort::FrameOutcome::Rendered { .. } => {}
        pixsort::FrameOutcome::Skipped { reason } => {
            anyhow::bail!("frame skipped: {reason}");
        }
    }
    let frame = session.readback_rgba8(args.view.into())?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    let stats = session.stats();
    eprintln!(
        "wrote {} ({}x{}, {} sub-passes)",
        args.out.display(),
        frame.width,
        frame.height,
        stats.sub_passes_executed
    );
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let extent = pixsort::Extent::new(1, args.height)?;
    let direction = if args.descending {
        pixsort::SortDirection::Descending
    } else {
        pixsort::SortDirection::Ascending
    };
    let schedule = pixsort::sort_schedule(extent, direction);
    let doc = serde_json::json!({
        "height": extent.height,
        "padded_height": extent.padded_height(),
        "passes": extent.sort_pass_count(),
        "sub_passes": schedule,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&doc).context("serialize schedule")?
    );
    Ok(())
}
