//! Ordered frame sequence with a current-frame cursor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_IMAGE_EXTENSIONS;
use crate::events::{EventQueue, FrameEvent};
use crate::model::{FrameId, IdAllocator};

/// Pixel dimensions of a frame's image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

/// Which files `open_images` accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionFilter {
    /// Accept any file.
    All,
    /// Accept files whose extension matches one of these, case-insensitively.
    Allow(Vec<String>),
}

impl ExtensionFilter {
    pub fn allow<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Allow(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        )
    }

    pub fn accepts(&self, path: &Path) -> bool {
        match self {
            ExtensionFilter::All => true,
            ExtensionFilter::Allow(allowed) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| {
                    let ext = ext.to_lowercase();
                    allowed.iter().any(|a| *a == ext)
                })
                .unwrap_or(false),
        }
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::allow(DEFAULT_IMAGE_EXTENSIONS)
    }
}

/// A readable image and its size, not yet placed in a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStub {
    pub path: PathBuf,
    pub info: ImageInfo,
}

impl FrameStub {
    /// Read the image header at `path`.
    ///
    /// Returns `None` for unreadable images and images with a zero dimension.
    pub fn probe(path: &Path) -> Option<Self> {
        match image::image_dimensions(path) {
            Ok((width, height)) if width > 0 && height > 0 => Some(Self {
                path: path.to_path_buf(),
                info: ImageInfo { width, height },
            }),
            Ok(_) => {
                log::warn!("Skipping empty image {:?}", path);
                None
            }
            Err(e) => {
                log::warn!("Skipping unreadable image {:?}: {}", path, e);
                None
            }
        }
    }
}

/// A frame placed in the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: FrameId,
    /// Position in display order.
    pub index: usize,
    pub path: PathBuf,
    pub info: ImageInfo,
}

/// Ordered frames plus the current-frame cursor.
#[derive(Debug, Default)]
pub struct FrameSequencer {
    frames: Vec<Frame>,
    index_by_id: HashMap<FrameId, usize>,
    current: Option<usize>,
    ids: IdAllocator<FrameId>,
    events: EventQueue<FrameEvent>,
}

impl FrameSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Replace the whole sequence with freshly numbered frames.
    ///
    /// The cursor moves to the first frame (or none) and a
    /// `CurrentChanged` event is always emitted.
    pub fn reset(&mut self, stubs: Vec<FrameStub>) {
        let placed = stubs
            .into_iter()
            .map(|stub| (self.ids.next(), stub))
            .collect();
        self.install(placed);
    }

    /// Replace the sequence with frames that keep previously issued ids.
    pub fn restore(&mut self, stubs: Vec<(FrameId, FrameStub)>) {
        for (id, _) in &stubs {
            self.ids.advance_past(*id);
        }
        self.install(stubs);
    }

    fn install(&mut self, stubs: Vec<(FrameId, FrameStub)>) {
        self.frames = stubs
            .into_iter()
            .enumerate()
            .map(|(index, (id, stub))| Frame {
                id,
                index,
                path: stub.path,
                info: stub.info,
            })
            .collect();
        self.index_by_id = self.frames.iter().map(|f| (f.id, f.index)).collect();
        assert_eq!(
            self.index_by_id.len(),
            self.frames.len(),
            "duplicate frame ids in sequence"
        );
        self.current = if self.frames.is_empty() { None } else { Some(0) };

        log::debug!("Frame sequence reset with {} frames", self.frames.len());
        self.events
            .push(FrameEvent::CurrentChanged(self.current_id()));
    }

    /// Open image files as a new sequence.
    ///
    /// Paths that are not files, do not pass the filter, or cannot be read
    /// as images are skipped. Returns the number of frames opened.
    pub fn open_images<P: AsRef<Path>>(&mut self, paths: &[P], filter: &ExtensionFilter) -> usize {
        let stubs = frame_stubs_from_paths(paths, filter);
        let count = stubs.len();
        log::info!("Opened {} of {} paths as frames", count, paths.len());
        self.reset(stubs);
        count
    }

    /// Open every matching file directly inside `dir`, sorted by path.
    pub fn open_folder(&mut self, dir: &Path, filter: &ExtensionFilter) -> std::io::Result<usize> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        Ok(self.open_images(&paths, filter))
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Move the cursor to `id`, or clear it with `None`.
    ///
    /// Returns whether the cursor moved. Unknown ids are ignored.
    pub fn set_current(&mut self, id: Option<FrameId>) -> bool {
        let target = match id {
            Some(id) => match self.index_by_id.get(&id) {
                Some(index) => Some(*index),
                None => {
                    log::warn!("Cannot select unknown frame {}", id);
                    return false;
                }
            },
            None => None,
        };
        self.move_cursor(target)
    }

    /// Advance to the next frame. No-op at the end of the sequence.
    pub fn next(&mut self) -> bool {
        match self.current {
            Some(index) if index + 1 < self.frames.len() => self.move_cursor(Some(index + 1)),
            _ => false,
        }
    }

    /// Go back to the previous frame. No-op at the start of the sequence.
    pub fn previous(&mut self) -> bool {
        match self.current {
            Some(index) if index > 0 => self.move_cursor(Some(index - 1)),
            _ => false,
        }
    }

    fn move_cursor(&mut self, target: Option<usize>) -> bool {
        if target == self.current {
            return false;
        }
        self.current = target;
        self.events
            .push(FrameEvent::CurrentChanged(self.current_id()));
        true
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn current_id(&self) -> Option<FrameId> {
        self.current.map(|index| self.frames[index].id)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.map(|index| &self.frames[index])
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.index_by_id.get(&id).map(|index| &self.frames[*index])
    }

    pub fn index_of(&self, id: FrameId) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    pub fn frame_path(&self, id: FrameId) -> Option<&Path> {
        self.frame(id).map(|f| f.path.as_path())
    }

    /// What a loader needs to re-open the frame: its image path.
    pub fn frame_load_info(&self, id: FrameId) -> Option<&Path> {
        self.frame_path(id)
    }

    pub fn frame_info(&self, id: FrameId) -> Option<ImageInfo> {
        self.frame(id).map(|f| f.info)
    }

    /// Frames in display order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drain queued change events.
    pub fn take_events(&mut self) -> Vec<FrameEvent> {
        self.events.drain()
    }
}

/// Probe each path and keep the ones that are readable images.
pub fn frame_stubs_from_paths<P: AsRef<Path>>(paths: &[P], filter: &ExtensionFilter) -> Vec<FrameStub> {
    paths
        .iter()
        .map(|p| p.as_ref())
        .filter(|path| path.is_file() && filter.accepts(path))
        .filter_map(FrameStub::probe)
        .collect()
}
