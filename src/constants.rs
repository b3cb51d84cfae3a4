//! Global constants for samnotator

/// Image extensions accepted when opening files, lowercase without the dot
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "gif", "webp"];

/// Default point marker size in pixels
pub const DEFAULT_MARKER_SIZE: u32 = 23;

/// Default box resize handle size in pixels
pub const DEFAULT_BBOX_HANDLE_SIZE: u32 = 8;

/// Default number of masks kept per object after sorting by score
pub const DEFAULT_MAX_MASKS_PER_OBJECT: usize = 1;

/// Default compute device handed to models on load
pub const DEFAULT_DEVICE: &str = "cpu";

/// Project file written into a project folder
pub const PROJECT_FILENAME: &str = "annotations.json";

/// Folder of rendered mask images inside a project folder
pub const MASKS_DIRNAME: &str = "masks";
