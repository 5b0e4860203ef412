//! Runtime settings: built-in defaults, then `FRAMECHECK_*` environment
//! variables, then command-line flags.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::corpus::CorpusName;
use crate::frames::FfmpegTools;

pub const DEFAULT_VIDEO_EXT: &str = "avi";
pub const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);
pub const DEFAULT_FIGURE: (u32, u32) = (1000, 600);
pub const DEFAULT_OUT_DIR: &str = "histograms_output";

#[derive(Debug, Clone)]
pub struct Settings {
    pub old_corpus: PathBuf,
    pub new_corpus: PathBuf,
    pub out_dir: PathBuf,
    pub video_ext: String,
    pub viewport: (u32, u32),
    pub figure: (u32, u32),
    pub tools: FfmpegTools,
}

/// Command-line values that override the environment when present.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub old_corpus: Option<PathBuf>,
    pub new_corpus: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub video_ext: Option<String>,
    pub viewport: Option<(u32, u32)>,
    pub figure: Option<(u32, u32)>,
}

impl Settings {
    pub fn defaults_in(base: &Path) -> Self {
        let json_dir = base.join("json");
        Self {
            old_corpus: json_dir.join("annotations_old.json"),
            new_corpus: json_dir.join("annotations_new.json"),
            out_dir: base.join(DEFAULT_OUT_DIR),
            video_ext: DEFAULT_VIDEO_EXT.to_string(),
            viewport: DEFAULT_VIEWPORT,
            figure: DEFAULT_FIGURE,
            tools: FfmpegTools::default(),
        }
    }

    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let base = env::current_dir().context("failed to resolve working directory")?;
        let mut settings = Self::defaults_in(&base);
        settings.apply_env(|key| env::var(key).ok())?;
        settings.apply_overrides(overrides);
        Ok(settings)
    }

    /// `lookup` is `std::env::var` in production; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("FRAMECHECK_OLD_JSON") {
            self.old_corpus = PathBuf::from(path);
        }
        if let Some(path) = get("FRAMECHECK_NEW_JSON") {
            self.new_corpus = PathBuf::from(path);
        }
        if let Some(path) = get("FRAMECHECK_OUT_DIR") {
            self.out_dir = PathBuf::from(path);
        }
        if let Some(bin) = get("FRAMECHECK_FFMPEG") {
            self.tools.ffmpeg = bin;
        }
        if let Some(bin) = get("FRAMECHECK_FFPROBE") {
            self.tools.ffprobe = bin;
        }
        if let Some(raw) = get("FRAMECHECK_DECODE_TIMEOUT_MS") {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("FRAMECHECK_DECODE_TIMEOUT_MS is not a number: {raw}"))?;
            self.tools.timeout = Duration::from_millis(ms.max(1));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(path) = overrides.old_corpus {
            self.old_corpus = path;
        }
        if let Some(path) = overrides.new_corpus {
            self.new_corpus = path;
        }
        if let Some(path) = overrides.out_dir {
            self.out_dir = path;
        }
        if let Some(ext) = overrides.video_ext {
            self.video_ext = ext;
        }
        if let Some(size) = overrides.viewport {
            self.viewport = size;
        }
        if let Some(size) = overrides.figure {
            self.figure = size;
        }
    }

    pub fn corpus_path(&self, name: CorpusName) -> &Path {
        match name {
            CorpusName::Old => &self.old_corpus,
            CorpusName::New => &self.new_corpus,
        }
    }
}

/// Parses `WIDTHxHEIGHT`, e.g. `1280x720`.
pub fn parse_size(raw: &str) -> Result<(u32, u32)> {
    let lower = raw.trim().to_ascii_lowercase();
    let Some((w, h)) = lower.split_once('x') else {
        bail!("expected WIDTHxHEIGHT, got '{raw}'");
    };
    let w: u32 = w.trim().parse().with_context(|| format!("invalid width in '{raw}'"))?;
    let h: u32 = h.trim().parse().with_context(|| format!("invalid height in '{raw}'"))?;
    Ok((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_project_layout() {
        let settings = Settings::defaults_in(Path::new("/proj"));
        assert_eq!(settings.old_corpus, Path::new("/proj/json/annotations_old.json"));
        assert_eq!(settings.new_corpus, Path::new("/proj/json/annotations_new.json"));
        assert_eq!(settings.out_dir, Path::new("/proj/histograms_output"));
        assert_eq!(settings.video_ext, "avi");
        assert_eq!(settings.corpus_path(CorpusName::New), settings.new_corpus.as_path());
    }

    #[test]
    fn env_then_flags_take_precedence() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FRAMECHECK_OLD_JSON", "/env/old.json"),
            ("FRAMECHECK_NEW_JSON", "  "),
            ("FRAMECHECK_FFMPEG", "/opt/ffmpeg"),
            ("FRAMECHECK_DECODE_TIMEOUT_MS", "2500"),
        ]);
        let mut settings = Settings::defaults_in(Path::new("/proj"));
        settings
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.old_corpus, Path::new("/env/old.json"));
        assert_eq!(settings.new_corpus, Path::new("/proj/json/annotations_new.json"));
        assert_eq!(settings.tools.ffmpeg, "/opt/ffmpeg");
        assert_eq!(settings.tools.timeout, Duration::from_millis(2500));

        settings.apply_overrides(Overrides {
            old_corpus: Some(PathBuf::from("flag.json")),
            viewport: Some((800, 600)),
            ..Overrides::default()
        });
        assert_eq!(settings.old_corpus, Path::new("flag.json"));
        assert_eq!(settings.viewport, (800, 600));
    }

    #[test]
    fn bad_timeout_is_reported() {
        let mut settings = Settings::defaults_in(Path::new("/proj"));
        let err = settings
            .apply_env(|key| (key == "FRAMECHECK_DECODE_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("FRAMECHECK_DECODE_TIMEOUT_MS"));
    }

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 640X480 ").unwrap(), (640, 480));
        assert!(parse_size("640").is_err());
        assert!(parse_size("axb").is_err());
    }
}
