use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use image::DynamicImage;
use serde_json::{json, Value};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use framecheck::batch::BatchExporter;
use framecheck::compose::compose_view;
use framecheck::config::{parse_size, Overrides, Settings};
use framecheck::corpus::{AnnotationStore, CorpusName};
use framecheck::frames::{video_id_of, MediaOpener, SourceOpener};
use framecheck::histogram::series_for;
use framecheck::{CountAggregator, FrameIndex, ReviewSession};

const REVIEW_HELP: &str = r##"Review commands (one per line):
  folder <dir>          scan <dir> for videos and open the first one
  list                  list videos in the current folder
  video <name|n>        open a video by name or 1-based list position
  goto <n> | <n>        jump to frame n (out-of-range values clamp)
  a | prev              previous frame (stops at the first frame)
  d | next              next frame (stops at the last frame)
  load <old|new> [path] reload a corpus (default path from settings)
  viewport <WxH>        resize the display viewport
  status                print the current status
  help                  show this help
  quit                  leave the session

After every command view.png and histogram.png are rewritten in the output
directory and one status JSON line is printed."##;

#[derive(Parser, Debug)]
#[command(
    name = "framecheck",
    version,
    about = "Compare old/new detection annotations frame by frame against source video"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Print per-frame box counts of both corpora for one video
    Counts(CountsArgs),
    /// Render one frame with both overlays into a viewport-sized PNG
    Frame(FrameArgs),
    /// Export one count histogram PNG per video in a folder
    Histograms(HistogramsArgs),
    /// Interactive line-driven review session
    Review(ReviewArgs),
}

#[derive(Args, Debug, Clone, Default)]
struct CorpusArgs {
    /// Old corpus JSON (default: json/annotations_old.json)
    #[arg(long)]
    old: Option<PathBuf>,
    /// New corpus JSON (default: json/annotations_new.json)
    #[arg(long)]
    new: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CountsArgs {
    /// Video file or directory of extracted frames
    video: PathBuf,
    /// Use this frame count instead of probing the video
    #[arg(long)]
    frames: Option<usize>,
    #[command(flatten)]
    corpora: CorpusArgs,
}

#[derive(Args, Debug)]
struct FrameArgs {
    /// Video file or directory of extracted frames
    video: PathBuf,
    /// 1-based frame number (clamped into range)
    #[arg(long, default_value_t = 1)]
    frame: i64,
    /// Output PNG path
    #[arg(long, default_value = "view.png")]
    out: PathBuf,
    /// Viewport size, e.g. 1280x720
    #[arg(long)]
    viewport: Option<String>,
    /// Print the projected boxes as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    #[command(flatten)]
    corpora: CorpusArgs,
}

#[derive(Args, Debug)]
struct HistogramsArgs {
    /// Folder containing the videos
    video_dir: PathBuf,
    /// Output folder (default: histograms_output)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Video file extension to pick up
    #[arg(long)]
    ext: Option<String>,
    /// Figure size, e.g. 1000x600
    #[arg(long)]
    size: Option<String>,
    /// Skip writing batch_report.json
    #[arg(long, action = ArgAction::SetTrue)]
    no_report: bool,
    #[command(flatten)]
    corpora: CorpusArgs,
}

#[derive(Args, Debug)]
struct ReviewArgs {
    /// Folder to open right away
    folder: Option<PathBuf>,
    /// Where view.png and histogram.png are written (default: <out>/review)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Video file extension to list
    #[arg(long)]
    ext: Option<String>,
    /// Viewport size, e.g. 1280x720
    #[arg(long)]
    viewport: Option<String>,
    #[command(flatten)]
    corpora: CorpusArgs,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Counts(args) => command_counts(args),
        Commands::Frame(args) => command_frame(args),
        Commands::Histograms(args) => command_histograms(args),
        Commands::Review(args) => command_review(args),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "counts",
            "description": "Per-frame old/new box counts and histogram domains for one video."
        }),
        json!({
            "name": "frame",
            "description": "Render one frame with old (green fill) and new (black outline) boxes."
        }),
        json!({
            "name": "histograms",
            "description": "Export <video>_histogram.png for every video in a folder."
        }),
        json!({
            "name": "review",
            "description": "Line-driven session: navigate frames, reload corpora, re-render views."
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn resolve_settings(corpora: &CorpusArgs, overrides: Overrides) -> Result<Settings> {
    Settings::resolve(Overrides {
        old_corpus: corpora.old.clone(),
        new_corpus: corpora.new.clone(),
        ..overrides
    })
}

fn load_store(settings: &Settings) -> AnnotationStore {
    let mut store = AnnotationStore::new();
    for name in CorpusName::ALL {
        store.load_file_or_empty(name, settings.corpus_path(name));
    }
    store
}

fn parse_size_opt(raw: Option<&str>) -> Result<Option<(u32, u32)>> {
    raw.map(parse_size).transpose()
}

fn command_counts(args: CountsArgs) -> Result<()> {
    let settings = resolve_settings(&args.corpora, Overrides::default())?;
    let store = load_store(&settings);
    let video_id = video_id_of(&args.video);

    let frame_count = match args.frames {
        Some(count) => count,
        None => MediaOpener::new(settings.tools.clone())
            .open(&args.video)?
            .frame_count(),
    };

    let mut aggregator = CountAggregator::new();
    let model = series_for(&mut aggregator, &store, &video_id, frame_count);
    let payload = json!({
        "video_id": video_id,
        "frame_count": frame_count,
        "x_domain": [model.x_domain.0, model.x_domain.1],
        "y_domain": [model.y_domain.0, model.y_domain.1],
        "old": model.series.old,
        "new": model.series.new,
        "corpora": corpus_status_json(&store),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn command_frame(args: FrameArgs) -> Result<()> {
    let settings = resolve_settings(
        &args.corpora,
        Overrides {
            viewport: parse_size_opt(args.viewport.as_deref())?,
            ..Overrides::default()
        },
    )?;
    let store = load_store(&settings);
    let video_id = video_id_of(&args.video);

    let mut source = MediaOpener::new(settings.tools.clone()).open(&args.video)?;
    let mut index = FrameIndex::new();
    index.bind(source.frame_count());
    let nav = index.goto(args.frame)?;
    if nav.clamped {
        warn!(
            requested = args.frame,
            shown = nav.frame_number(),
            "frame number out of range; clamped"
        );
    }

    let frame = source.seek_and_decode(nav.index)?;
    let old = store.boxes_for(CorpusName::Old, &video_id, nav.frame_number());
    let new = store.boxes_for(CorpusName::New, &video_id, nav.frame_number());
    let (canvas, transform) = compose_view(&frame, settings.viewport, old, new)?;

    save_png(canvas, &args.out)?;

    if args.json {
        let payload = json!({
            "video_id": video_id,
            "frame_number": nav.frame_number(),
            "clamped": nav.clamped,
            "frame_count": index.frame_count(),
            "image_size": {"width": frame.width(), "height": frame.height()},
            "viewport": {"width": settings.viewport.0, "height": settings.viewport.1},
            "transform": transform,
            "old_boxes": transform.project_all(old),
            "new_boxes": transform.project_all(new),
            "output": abs_path(&args.out).display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", abs_path(&args.out).display());
    }
    Ok(())
}

fn command_histograms(args: HistogramsArgs) -> Result<()> {
    let settings = resolve_settings(
        &args.corpora,
        Overrides {
            out_dir: args.out.clone(),
            video_ext: args.ext.clone(),
            figure: parse_size_opt(args.size.as_deref())?,
            ..Overrides::default()
        },
    )?;
    if !args.video_dir.is_dir() {
        bail!("video folder not found: {}", args.video_dir.display());
    }

    info!("loading corpora");
    let store = load_store(&settings);
    let opener = MediaOpener::new(settings.tools.clone());
    let exporter = BatchExporter {
        store: &store,
        opener: &opener,
        video_ext: &settings.video_ext,
        out_dir: &settings.out_dir,
        figure: settings.figure,
    };
    let report = exporter.run(&args.video_dir)?;

    if args.no_report {
        println!("{}", abs_path(&settings.out_dir).display());
    } else {
        let report_path = settings.out_dir.join("batch_report.json");
        write_json_pretty(&report_path, &serde_json::to_value(&report)?)?;
        println!("{}", abs_path(&report_path).display());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum ReviewCommand {
    Folder(PathBuf),
    List,
    Video(String),
    Goto(i64),
    Step(i64),
    Load(CorpusName, Option<PathBuf>),
    Viewport(u32, u32),
    Status,
    Help,
    Quit,
}

impl FromStr for ReviewCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        let need_arg = |what: &str| require_arg(head, rest, what);

        let command = match head.to_ascii_lowercase().as_str() {
            "folder" => ReviewCommand::Folder(PathBuf::from(need_arg("a folder path")?)),
            "list" | "ls" => ReviewCommand::List,
            "video" => ReviewCommand::Video(need_arg("a video name or number")?.to_string()),
            "goto" | "g" => ReviewCommand::Goto(parse_frame_number(need_arg("a frame number")?)?),
            "a" | "prev" => ReviewCommand::Step(-1),
            "d" | "next" => ReviewCommand::Step(1),
            "load" => {
                let arg = need_arg("old or new")?;
                let (name, path) = match arg.split_once(char::is_whitespace) {
                    Some((name, path)) => (name, Some(PathBuf::from(path.trim()))),
                    None => (arg, None),
                };
                let name = CorpusName::from_str(name).map_err(anyhow::Error::msg)?;
                ReviewCommand::Load(name, path)
            }
            "viewport" => {
                let (w, h) = parse_size(need_arg("a size like 1280x720")?)?;
                ReviewCommand::Viewport(w, h)
            }
            "status" => ReviewCommand::Status,
            "help" | "?" => ReviewCommand::Help,
            "quit" | "exit" | "q" => ReviewCommand::Quit,
            _ if head.chars().all(|c| c.is_ascii_digit() || c == '-') && !head.is_empty() => {
                ReviewCommand::Goto(parse_frame_number(head)?)
            }
            _ => bail!("unknown command '{head}' (try 'help')"),
        };
        Ok(command)
    }
}

fn require_arg<'a>(head: &str, rest: &'a str, what: &str) -> Result<&'a str> {
    if rest.is_empty() {
        bail!("'{head}' needs {what}");
    }
    Ok(rest)
}

fn parse_frame_number(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .with_context(|| format!("not a frame number: {raw}"))
}

fn command_review(args: ReviewArgs) -> Result<()> {
    let settings = resolve_settings(
        &args.corpora,
        Overrides {
            video_ext: args.ext.clone(),
            viewport: parse_size_opt(args.viewport.as_deref())?,
            ..Overrides::default()
        },
    )?;
    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| settings.out_dir.join("review"));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create output directory: {}", out_dir.display()))?;

    let mut session = ReviewSession::new(MediaOpener::new(settings.tools.clone()), &settings);
    session.load_default_corpora(&settings);
    if let Some(folder) = &args.folder {
        if let Err(err) = session.select_folder(folder) {
            warn!(folder = %folder.display(), error = %err, "cannot scan folder");
        }
    }
    refresh_review_outputs(&mut session, &out_dir)?;
    eprintln!("{REVIEW_HELP}");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read command")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<ReviewCommand>() {
            Ok(command) => command,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };

        match command {
            ReviewCommand::Quit => break,
            ReviewCommand::Help => {
                eprintln!("{REVIEW_HELP}");
                continue;
            }
            ReviewCommand::List => {
                let names: Vec<Value> = session
                    .videos()
                    .iter()
                    .enumerate()
                    .map(|(i, name)| json!({"n": i + 1, "name": name}))
                    .collect();
                writeln!(stdout, "{}", serde_json::to_string(&json!({ "videos": names }))?)?;
                continue;
            }
            ReviewCommand::Status => {}
            ReviewCommand::Folder(folder) => {
                if let Err(err) = session.select_folder(&folder) {
                    warn!(folder = %folder.display(), error = %err, "cannot scan folder");
                }
            }
            ReviewCommand::Video(selector) => {
                let _ = session.select_video(&selector);
            }
            ReviewCommand::Goto(frame_number) => {
                let _ = session.goto(frame_number);
            }
            ReviewCommand::Step(delta) => {
                let _ = session.step(delta);
            }
            ReviewCommand::Load(name, path) => {
                let path = path.unwrap_or_else(|| settings.corpus_path(name).to_path_buf());
                let _ = session.reload_corpus(name, &path);
            }
            ReviewCommand::Viewport(w, h) => session.set_viewport(w, h),
        }

        refresh_review_outputs(&mut session, &out_dir)?;
        writeln!(stdout, "{}", serde_json::to_string(&session.status())?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn refresh_review_outputs<O: SourceOpener>(session: &mut ReviewSession<O>, out_dir: &Path) -> Result<()> {
    if let Some(view) = session.render_view() {
        save_png(view, &out_dir.join("view.png"))?;
    }
    if let Some(histogram) = session.render_histogram() {
        save_png(histogram, &out_dir.join("histogram.png"))?;
    }
    Ok(())
}

fn corpus_status_json(store: &AnnotationStore) -> Value {
    let entry = |name: CorpusName| {
        json!({
            "status": store.status(name),
            "path": store.source(name).map(|p| p.display().to_string()),
            "videos": store.corpus(name).video_count(),
        })
    };
    json!({ "old": entry(CorpusName::Old), "new": entry(CorpusName::New) })
}

fn save_png(img: image::RgbaImage, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    DynamicImage::ImageRgba8(img)
        .save(path)
        .with_context(|| format!("failed to save image: {}", path.display()))?;
    Ok(())
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_navigation_commands() {
        assert_eq!("goto 12".parse::<ReviewCommand>().unwrap(), ReviewCommand::Goto(12));
        assert_eq!(" 7 ".parse::<ReviewCommand>().unwrap(), ReviewCommand::Goto(7));
        assert_eq!("-3".parse::<ReviewCommand>().unwrap(), ReviewCommand::Goto(-3));
        assert_eq!("A".parse::<ReviewCommand>().unwrap(), ReviewCommand::Step(-1));
        assert_eq!("next".parse::<ReviewCommand>().unwrap(), ReviewCommand::Step(1));
        assert!("goto".parse::<ReviewCommand>().is_err());
        assert!("goto x".parse::<ReviewCommand>().is_err());
    }

    #[test]
    fn parses_session_commands() {
        assert_eq!(
            "load NEW /tmp/new.json".parse::<ReviewCommand>().unwrap(),
            ReviewCommand::Load(CorpusName::New, Some(PathBuf::from("/tmp/new.json")))
        );
        assert_eq!(
            "load old".parse::<ReviewCommand>().unwrap(),
            ReviewCommand::Load(CorpusName::Old, None)
        );
        assert!("load mid".parse::<ReviewCommand>().is_err());
        assert_eq!(
            "viewport 800x600".parse::<ReviewCommand>().unwrap(),
            ReviewCommand::Viewport(800, 600)
        );
        assert_eq!(
            "folder /data/my videos".parse::<ReviewCommand>().unwrap(),
            ReviewCommand::Folder(PathBuf::from("/data/my videos"))
        );
        assert_eq!(
            "video cam 1.avi".parse::<ReviewCommand>().unwrap(),
            ReviewCommand::Video("cam 1.avi".to_string())
        );
        assert_eq!("quit".parse::<ReviewCommand>().unwrap(), ReviewCommand::Quit);
        assert!("dance".parse::<ReviewCommand>().is_err());
    }

    #[test]
    fn writes_json_pretty() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b.json");
        write_json_pretty(&target, &json!({"ok": true})).unwrap();
        assert!(target.exists());
    }

    #[test]
    fn saves_png_into_new_directory() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("view.png");
        save_png(image::RgbaImage::new(3, 2), &target).unwrap();
        assert_eq!(image::open(&target).unwrap().width(), 3);
    }
}
