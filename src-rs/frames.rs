//! Frame sources: something with a frame count that can decode frame `N`.
//!
//! Videos are decoded by shelling out to `ffprobe`/`ffmpeg`; a directory of
//! already-extracted images works as a source too.

use image::RgbaImage;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::error::ReviewError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

pub trait FrameSource {
    fn frame_count(&self) -> usize;

    /// Decodes the frame at 0-based `index`.
    fn seek_and_decode(&mut self, index: usize) -> Result<RgbaImage, ReviewError>;
}

/// Opens a frame source for a path picked from the video folder.
pub trait SourceOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, ReviewError>;
}

/// External decoder binaries and how long one invocation may take.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub timeout: Duration,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            timeout: Duration::from_millis(15_000),
        }
    }
}

/// Video file decoded one frame at a time through `ffmpeg`.
#[derive(Debug)]
pub struct FfmpegSource {
    path: PathBuf,
    tools: FfmpegTools,
    frame_count: usize,
}

impl FfmpegSource {
    pub fn open(path: &Path, tools: FfmpegTools) -> Result<Self, ReviewError> {
        let video_id = video_id_of(path);
        let unusable = |reason: String| ReviewError::VideoUnusable {
            video_id: video_id.clone(),
            reason,
        };

        if !path.is_file() {
            return Err(unusable(format!("not a file: {}", path.display())));
        }

        let frame_count = probe_frame_count(path, &tools).map_err(unusable)?;
        debug!(path = %path.display(), frame_count, "probed video");
        Ok(Self {
            path: path.to_path_buf(),
            tools,
            frame_count,
        })
    }
}

fn probe_frame_count(path: &Path, tools: &FfmpegTools) -> Result<usize, String> {
    let path_arg = path.to_string_lossy().to_string();
    let header = run_tool(
        &tools.ffprobe,
        &[
            "-v", "error", "-select_streams", "v:0", "-show_entries", "stream=nb_frames",
            "-of", "default=nokey=1:noprint_wrappers=1", &path_arg,
        ],
        tools.timeout,
    )?;
    if let Some(count) = parse_count(&header) {
        return Ok(count);
    }

    // Containers such as AVI often leave nb_frames unset; count packets instead.
    let counted = run_tool(
        &tools.ffprobe,
        &[
            "-v", "error", "-select_streams", "v:0", "-count_packets", "-show_entries",
            "stream=nb_read_packets", "-of", "default=nokey=1:noprint_wrappers=1", &path_arg,
        ],
        tools.timeout,
    )?;
    parse_count(&counted).ok_or_else(|| {
        format!(
            "ffprobe reported no frame count: {}",
            String::from_utf8_lossy(&counted).trim()
        )
    })
}

fn parse_count(raw: &[u8]) -> Option<usize> {
    String::from_utf8_lossy(raw)
        .lines()
        .find_map(|line| line.trim().parse::<usize>().ok())
}

impl FrameSource for FfmpegSource {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn seek_and_decode(&mut self, index: usize) -> Result<RgbaImage, ReviewError> {
        if index >= self.frame_count {
            return Err(ReviewError::decode(
                index,
                format!("index out of range (frame count {})", self.frame_count),
            ));
        }
        let path_arg = self.path.to_string_lossy().to_string();
        let select = format!("select=eq(n\\,{index})");
        let png = run_tool(
            &self.tools.ffmpeg,
            &[
                "-v", "error", "-i", &path_arg, "-vf", &select, "-vsync", "0", "-frames:v", "1",
                "-f", "image2pipe", "-vcodec", "png", "-",
            ],
            self.tools.timeout,
        )
        .map_err(|reason| ReviewError::decode(index, reason))?;

        if png.is_empty() {
            return Err(ReviewError::decode(index, "ffmpeg produced no image"));
        }
        image::load_from_memory(&png)
            .map(|img| img.to_rgba8())
            .map_err(|err| ReviewError::decode(index, err.to_string()))
    }
}

/// Runs `program` and returns its stdout. Both pipes are drained on helper
/// threads so a large frame cannot block the child while we wait on it.
fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Result<Vec<u8>, String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| format!("failed to spawn {program}: {err}"))?;

    let stdout_reader = child.stdout.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });
    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(format!("{program} timed out after {}ms", timeout.as_millis()));
        }
        Err(err) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(format!("failed waiting for {program}: {err}"));
        }
    };

    let stdout = stdout_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        let code = status.code().unwrap_or(1);
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        return Err(if stderr.is_empty() {
            format!("{program} failed with status {code}")
        } else {
            format!("{program} failed with status {code}: {stderr}")
        });
    }
    Ok(stdout)
}

/// A directory of frame images, ordered naturally by filename.
#[derive(Debug)]
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, ReviewError> {
        let unusable = |reason: String| ReviewError::VideoUnusable {
            video_id: video_id_of(dir),
            reason,
        };
        let entries = fs::read_dir(dir)
            .map_err(|err| unusable(format!("cannot read {}: {err}", dir.display())))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_extension(path, IMAGE_EXTENSIONS))
            .collect();
        alphanumeric_sort::sort_path_slice(&mut frames);
        Ok(Self { frames })
    }
}

impl FrameSource for ImageSequenceSource {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn seek_and_decode(&mut self, index: usize) -> Result<RgbaImage, ReviewError> {
        let path = self
            .frames
            .get(index)
            .ok_or_else(|| ReviewError::decode(index, "no such frame"))?;
        image::open(path)
            .map(|img| img.to_rgba8())
            .map_err(|err| ReviewError::decode(index, format!("{}: {err}", path.display())))
    }
}

/// Directories open as image sequences, files go through ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct MediaOpener {
    pub tools: FfmpegTools,
}

impl MediaOpener {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}

impl SourceOpener for MediaOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, ReviewError> {
        if path.is_dir() {
            Ok(Box::new(ImageSequenceSource::open(path)?))
        } else {
            Ok(Box::new(FfmpegSource::open(path, self.tools.clone())?))
        }
    }
}

/// Basename used as the corpus key for a video.
pub fn video_id_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
        .unwrap_or(false)
}

/// Names of the entries in `dir` ending in `.<ext>` (case-insensitive),
/// sorted by name.
pub fn list_videos(dir: &Path, ext: &str) -> std::io::Result<Vec<String>> {
    let suffix = format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase());
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.to_ascii_lowercase().ends_with(&suffix))
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    fn write_png(path: &Path, shade: u8) {
        RgbaImage::from_pixel(4, 3, Rgba([shade, shade, shade, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn image_sequence_orders_frames_naturally() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("frame10.png"), 100);
        write_png(&dir.path().join("frame2.png"), 20);
        write_png(&dir.path().join("frame1.png"), 10);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.frame_count(), 3);
        assert_eq!(source.seek_and_decode(1).unwrap().get_pixel(0, 0)[0], 20);
        assert_eq!(source.seek_and_decode(2).unwrap().get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn image_sequence_reports_decode_failure_with_frame_number() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("0001.png"), 1);
        fs::write(dir.path().join("0002.png"), b"not a png").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert!(matches!(
            source.seek_and_decode(1),
            Err(ReviewError::DecodeFailure { frame_number: 2, .. })
        ));
        assert!(matches!(
            source.seek_and_decode(7),
            Err(ReviewError::DecodeFailure { frame_number: 8, .. })
        ));
    }

    #[test]
    fn lists_videos_by_extension_sorted() {
        let dir = tempdir().unwrap();
        for name in ["b.avi", "A.AVI", "c.mp4", "d.avi.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(list_videos(dir.path(), "avi").unwrap(), vec!["A.AVI", "b.avi"]);
        assert_eq!(list_videos(dir.path(), ".mp4").unwrap(), vec!["c.mp4"]);
    }

    #[test]
    fn missing_video_file_is_unusable() {
        let dir = tempdir().unwrap();
        let err = FfmpegSource::open(&dir.path().join("gone.avi"), FfmpegTools::default()).unwrap_err();
        assert!(matches!(err, ReviewError::VideoUnusable { ref video_id, .. } if video_id == "gone.avi"));
    }

    #[test]
    fn parses_first_numeric_line() {
        assert_eq!(parse_count(b"N/A\n"), None);
        assert_eq!(parse_count(b"  250\n"), Some(250));
        assert_eq!(parse_count(b"N/A\n12\n"), Some(12));
    }

    #[test]
    fn opener_uses_image_sequence_for_directories() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("1.png"), 5);
        let source = MediaOpener::default().open(dir.path()).unwrap();
        assert_eq!(source.frame_count(), 1);
    }
}
