use crate::config::StorageConfig;
use crate::error::SessionError;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Number of photos taken in one session
pub const IMAGES_PER_SESSION: u8 = 4;

/// Name of the animation written next to the session images
pub const ANIMATION_FILE_NAME: &str = "animation.gif";

/// The three renditions stored for every captured photo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Full,
    Medium,
    Preview,
}

impl ImageKind {
    fn file_name(self, image_number: u8) -> String {
        match self {
            ImageKind::Full => format!("{}.jpg", image_number),
            ImageKind::Medium => format!("{}_medium.jpg", image_number),
            ImageKind::Preview => format!("{}_prev.jpg", image_number),
        }
    }
}

/// On-disk locations of one captured photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePaths {
    pub full: PathBuf,
    pub medium: PathBuf,
    pub preview: PathBuf,
}

/// A session directory found while scanning the event root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub id: u32,
    pub directory: PathBuf,
    /// All four preview images are present
    pub complete: bool,
    /// The upload-completion stamp is present
    pub uploaded: bool,
}

/// Result of scanning the event root
#[derive(Debug, Clone, Default)]
pub struct StorageScan {
    /// Every integer-named session directory, sorted by id
    pub sessions: Vec<StoredSession>,
    /// First id not used by any directory on disk
    pub next_id: u32,
    /// A directory on disk holds the largest id (or a larger one), so no
    /// fresh id is left
    pub ids_exhausted: bool,
}

impl StorageScan {
    pub fn complete(&self) -> impl Iterator<Item = &StoredSession> {
        self.sessions.iter().filter(|s| s.complete)
    }
}

/// Layout of the event directory: `<root>/<session id>/{n}.jpg`,
/// `{n}_medium.jpg`, `{n}_prev.jpg`, `animation.gif` and the upload stamp.
#[derive(Debug, Clone)]
pub struct EventStorage {
    root: PathBuf,
    stamp_name: String,
}

impl EventStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.event_root(),
            stamp_name: config.upload_stamp_name.clone(),
        }
    }

    pub fn session_dir(&self, session_id: u32) -> PathBuf {
        self.root.join(session_id.to_string())
    }

    pub fn image_path(&self, session_id: u32, image_number: u8, kind: ImageKind) -> PathBuf {
        self.session_dir(session_id).join(kind.file_name(image_number))
    }

    pub fn image_paths(&self, session_id: u32, image_number: u8) -> ImagePaths {
        ImagePaths {
            full: self.image_path(session_id, image_number, ImageKind::Full),
            medium: self.image_path(session_id, image_number, ImageKind::Medium),
            preview: self.image_path(session_id, image_number, ImageKind::Preview),
        }
    }

    /// Paths of one rendition for all photos of a session, in capture order
    pub fn session_images(&self, session_id: u32, kind: ImageKind) -> Vec<PathBuf> {
        (1..=IMAGES_PER_SESSION)
            .map(|n| self.image_path(session_id, n, kind))
            .collect()
    }

    pub fn animation_path(&self, session_id: u32) -> PathBuf {
        self.session_dir(session_id).join(ANIMATION_FILE_NAME)
    }

    pub fn stamp_path(&self, session_id: u32) -> PathBuf {
        self.session_dir(session_id).join(&self.stamp_name)
    }

    /// Create the event root if it does not exist yet
    pub fn ensure_root(&self) -> Result<(), SessionError> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(|source| SessionError::DirectoryCreation {
                path: self.root.display().to_string(),
                source,
            })?;
            info!("Created event directory: {}", self.root.display());
        }
        Ok(())
    }

    /// Create the directory of a new session. An existing directory is an
    /// error: ids are never reused.
    pub fn create_session_dir(&self, session_id: u32) -> Result<PathBuf, SessionError> {
        let dir = self.session_dir(session_id);
        fs::create_dir(&dir).map_err(|source| SessionError::DirectoryCreation {
            path: dir.display().to_string(),
            source,
        })?;
        debug!("Created session directory: {}", dir.display());
        Ok(dir)
    }

    pub fn is_complete(&self, session_id: u32) -> bool {
        (1..=IMAGES_PER_SESSION)
            .all(|n| self.image_path(session_id, n, ImageKind::Preview).is_file())
    }

    pub fn is_uploaded(&self, session_id: u32) -> bool {
        self.stamp_path(session_id).exists()
    }

    /// Persist the upload-completion marker of a session
    pub fn mark_uploaded(&self, session_id: u32) -> std::io::Result<()> {
        let stamp = self.stamp_path(session_id);
        fs::write(&stamp, chrono::Local::now().to_rfc3339())?;
        debug!("Upload stamp written: {}", stamp.display());
        Ok(())
    }

    /// Enumerate session directories under the event root. Directories with a
    /// positive integer name are sessions; everything else is ignored.
    pub fn scan(&self) -> Result<StorageScan, SessionError> {
        debug!("Scanning for existing sessions in: {}", self.root.display());

        let entries = fs::read_dir(&self.root).map_err(|e| SessionError::EventDirectory {
            path: self.root.display().to_string(),
            details: e.to_string(),
        })?;

        let mut scan = StorageScan {
            sessions: Vec::new(),
            next_id: 1,
            ids_exhausted: false,
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(session_id) = parse_session_id(name) else {
                if is_out_of_range_id(name) {
                    warn!("Session directory {} is beyond the id range", name);
                    scan.ids_exhausted = true;
                }
                continue;
            };

            let complete = self.is_complete(session_id);
            let uploaded = complete && self.is_uploaded(session_id);
            debug!(
                "Session {}: complete={} uploaded={}",
                session_id, complete, uploaded
            );

            // Incomplete sessions still burn their id
            match session_id.checked_add(1) {
                Some(next) => scan.next_id = scan.next_id.max(next),
                None => scan.ids_exhausted = true,
            }
            scan.sessions.push(StoredSession {
                id: session_id,
                directory: path,
                complete,
                uploaded,
            });
        }

        scan.sessions.sort_by_key(|s| s.id);
        info!(
            "Found {} session directories ({} complete), next id {}",
            scan.sessions.len(),
            scan.complete().count(),
            scan.next_id
        );
        Ok(scan)
    }
}

fn parse_session_id(name: &str) -> Option<u32> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    name.parse::<u32>().ok().filter(|id| *id > 0)
}

/// All digits, but too large for a session id
fn is_out_of_range_id(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) && name.parse::<u32>().is_err()
}
