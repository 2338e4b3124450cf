use crate::config::{UploadConfig, UploadDriverKind};
use crate::error::PeripheralError;
use crate::storage::EventStorage;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::request::{unsupported, PeripheralEvent, PeripheralHandler, PeripheralRequest};

const GIF_FRAME_DELAY_MS: u32 = 200;
const DROPBOX_API: &str = "https://api.dropboxapi.com/2";
const DROPBOX_CONTENT_API: &str = "https://content.dropboxapi.com/2";

pub fn create_uploader(config: &UploadConfig, storage: EventStorage) -> Box<dyn PeripheralHandler> {
    info!("Selecting upload driver: {:?}", config.driver);
    match config.driver {
        UploadDriverKind::None => Box::new(NoopUploader),
        UploadDriverKind::Atende => Box::new(SessionUploader::new(
            AtendeUploader::new(config),
            config,
            storage,
        )),
        UploadDriverKind::Dropbox => Box::new(SessionUploader::new(
            DropboxUploader::new(config),
            config,
            storage,
        )),
    }
}

/// A remote destination for session posts
pub trait UploadDriver: Send {
    fn name(&self) -> &'static str;

    /// Create a post (album, folder) and return its public URL
    fn create_post(&mut self, name: &str) -> Result<String, PeripheralError>;

    /// Attach a local file to the post at `url`
    fn upload_file(&mut self, url: &str, path: &Path) -> Result<(), PeripheralError>;
}

/// Encode the medium images into an endlessly looping animation
pub fn encode_animation(images: &[PathBuf], output: &Path) -> Result<(), PeripheralError> {
    let started = Instant::now();
    let upload_error = |details: String| PeripheralError::Upload { details };

    let file = File::create(output).map_err(|e| upload_error(format!("{}: {}", output.display(), e)))?;
    let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), 10);
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| upload_error(e.to_string()))?;

    for path in images {
        let image = image::open(path)
            .map_err(|e| upload_error(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        let frame = Frame::from_parts(
            image,
            0,
            0,
            Delay::from_numer_denom_ms(GIF_FRAME_DELAY_MS, 1),
        );
        encoder
            .encode_frame(frame)
            .map_err(|e| upload_error(e.to_string()))?;
    }

    debug!(
        "Creating GIF {} took {:?}",
        output.display(),
        started.elapsed()
    );
    Ok(())
}

/// Runs whole-session uploads on top of an [`UploadDriver`]: animation,
/// post, files, then the stamp that keeps the session from being retried.
pub struct SessionUploader<D> {
    driver: D,
    storage: EventStorage,
    title_prefix: String,
}

impl<D: UploadDriver> SessionUploader<D> {
    pub fn new(driver: D, config: &UploadConfig, storage: EventStorage) -> Self {
        Self {
            driver,
            storage,
            title_prefix: config.title_prefix.clone(),
        }
    }

    fn upload_session(
        &mut self,
        session_id: u32,
        medium_images: &[PathBuf],
        full_images: &[PathBuf],
        tags: &[String],
    ) -> Result<String, PeripheralError> {
        info!(
            "Uploading session {} ({} files, tags: {:?})",
            session_id,
            full_images.len(),
            tags
        );

        let gif = self.storage.animation_path(session_id);
        encode_animation(medium_images, &gif)?;

        let url = self
            .driver
            .create_post(&format!("{}{}", self.title_prefix, session_id))?;
        debug!("Session {} post: {}", session_id, url);

        for path in std::iter::once(&gif).chain(full_images.iter()) {
            self.driver.upload_file(&url, path)?;
        }

        self.storage
            .mark_uploaded(session_id)
            .map_err(|e| PeripheralError::Upload {
                details: format!("upload stamp for session {}: {}", session_id, e),
            })?;

        info!("Uploading session {} has finished", session_id);
        Ok(url)
    }
}

impl<D: UploadDriver> PeripheralHandler for SessionUploader<D> {
    fn name(&self) -> &'static str {
        self.driver.name()
    }

    fn handle(
        &mut self,
        request: PeripheralRequest,
    ) -> Result<Option<PeripheralEvent>, PeripheralError> {
        match request {
            PeripheralRequest::CreateUploadPost { name } => {
                let url = self.driver.create_post(&name)?;
                Ok(Some(PeripheralEvent::PostCreated { name, url }))
            }
            PeripheralRequest::UploadFile { url, path } => {
                self.driver.upload_file(&url, &path)?;
                Ok(None)
            }
            PeripheralRequest::UploadSession {
                session_id,
                medium_images,
                full_images,
                tags,
            } => {
                let url = self.upload_session(session_id, &medium_images, &full_images, &tags)?;
                Ok(Some(PeripheralEvent::SessionUploaded { session_id, url }))
            }
            other => Err(unsupported(self.driver.name(), &other)),
        }
    }
}

/// Upload disabled: requests are logged and dropped
pub struct NoopUploader;

impl PeripheralHandler for NoopUploader {
    fn name(&self) -> &'static str {
        "none"
    }

    fn handle(
        &mut self,
        request: PeripheralRequest,
    ) -> Result<Option<PeripheralEvent>, PeripheralError> {
        debug!("Upload disabled, dropping {}", request.kind());
        Ok(None)
    }
}

fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, PeripheralError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(PeripheralError::UploadStatus {
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }
}

fn file_name(path: &Path) -> Result<String, PeripheralError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| PeripheralError::Upload {
            details: format!("{} has no file name", path.display()),
        })
}

fn read_file(path: &Path) -> Result<Vec<u8>, PeripheralError> {
    fs::read(path).map_err(|e| PeripheralError::Upload {
        details: format!("{}: {}", path.display(), e),
    })
}

/// Blocking HTTP client, built on the worker thread at first use
fn lazy_client(client: &mut Option<Client>, timeout: Duration) -> Result<&Client, PeripheralError> {
    if client.is_none() {
        *client = Some(Client::builder().timeout(timeout).build()?);
    }
    client.as_ref().ok_or_else(|| PeripheralError::Upload {
        details: "HTTP client unavailable".to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct AtendePost {
    url: String,
}

/// Event gallery REST API: `POST {endpoint}/posts` creates a post,
/// `PUT {post url}/files/{name}` attaches a file.
pub struct AtendeUploader {
    endpoint: String,
    token: String,
    category_id: String,
    description: String,
    timeout: Duration,
    client: Option<Client>,
}

impl AtendeUploader {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            category_id: config.category_id.clone(),
            description: config.description.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            client: None,
        }
    }
}

impl UploadDriver for AtendeUploader {
    fn name(&self) -> &'static str {
        "atende"
    }

    fn create_post(&mut self, name: &str) -> Result<String, PeripheralError> {
        let url = format!("{}/posts", self.endpoint);
        let body = json!({
            "title": name,
            "description": self.description,
            "category_id": self.category_id,
        });

        let client = lazy_client(&mut self.client, self.timeout)?;
        let response = client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()?;
        let post: AtendePost = check_status(response)?.json()?;

        info!("Atende: created post '{}' at {}", name, post.url);
        Ok(post.url)
    }

    fn upload_file(&mut self, url: &str, path: &Path) -> Result<(), PeripheralError> {
        let target = format!("{}/files/{}", url.trim_end_matches('/'), file_name(path)?);
        let data = read_file(path)?;
        let size = data.len();

        let client = lazy_client(&mut self.client, self.timeout)?;
        let response = client
            .put(&target)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type(path))
            .body(data)
            .send()?;
        check_status(response)?;

        debug!("Atende: uploaded {} ({} bytes)", target, size);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DropboxLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct DropboxLinks {
    links: Vec<DropboxLink>,
}

impl DropboxLinks {
    fn into_first(self, folder: &str) -> Result<DropboxLink, PeripheralError> {
        self.links
            .into_iter()
            .next()
            .ok_or_else(|| PeripheralError::Upload {
                details: format!("Dropbox lists no shared link for {}", folder),
            })
    }
}

/// Dropbox API v2: one shared folder per post
pub struct DropboxUploader {
    token: String,
    root: String,
    timeout: Duration,
    client: Option<Client>,
    /// Shared link -> folder path of posts created by this worker
    folders: HashMap<String, String>,
}

impl DropboxUploader {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            token: config.dropbox_token.clone(),
            root: config.dropbox_root.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            client: None,
            folders: HashMap::new(),
        }
    }

    fn folder_path(&self, name: &str) -> String {
        format!("{}/{}", self.root, name)
    }

    fn folder_for_link(&self, url: &str) -> Option<String> {
        match self.folders.get(url) {
            Some(folder) => Some(folder.clone()),
            None if url.starts_with('/') => Some(url.to_string()),
            None => None,
        }
    }
}

impl UploadDriver for DropboxUploader {
    fn name(&self) -> &'static str {
        "dropbox"
    }

    fn create_post(&mut self, name: &str) -> Result<String, PeripheralError> {
        let folder = self.folder_path(name);
        let client = lazy_client(&mut self.client, self.timeout)?;

        let response = client
            .post(format!("{}/files/create_folder_v2", DROPBOX_API))
            .bearer_auth(&self.token)
            .json(&json!({ "path": folder, "autorename": false }))
            .send()?;
        match check_status(response) {
            Ok(_) => debug!("Dropbox: created folder {}", folder),
            // Already there after a retried upload
            Err(PeripheralError::UploadStatus { status: 409, .. }) => {
                warn!("Dropbox: folder {} already exists", folder)
            }
            Err(e) => return Err(e),
        }

        let response = client
            .post(format!("{}/sharing/create_shared_link_with_settings", DROPBOX_API))
            .bearer_auth(&self.token)
            .json(&json!({ "path": folder }))
            .send()?;
        let link: DropboxLink = match check_status(response) {
            Ok(response) => response.json()?,
            // Shared by an earlier attempt
            Err(PeripheralError::UploadStatus { status: 409, .. }) => {
                warn!("Dropbox: folder {} already shared, reusing its link", folder);
                let response = client
                    .post(format!("{}/sharing/list_shared_links", DROPBOX_API))
                    .bearer_auth(&self.token)
                    .json(&json!({ "path": folder, "direct_only": true }))
                    .send()?;
                let links: DropboxLinks = check_status(response)?.json()?;
                links.into_first(&folder)?
            }
            Err(e) => return Err(e),
        };

        info!("Dropbox: shared {} at {}", folder, link.url);
        self.folders.insert(link.url.clone(), folder);
        Ok(link.url)
    }

    /// `url` is either a shared link returned by `create_post` or a folder path
    fn upload_file(&mut self, url: &str, path: &Path) -> Result<(), PeripheralError> {
        let folder = self
            .folder_for_link(url)
            .ok_or_else(|| PeripheralError::Upload {
                details: format!("no Dropbox folder known for {}", url),
            })?;
        let target = format!("{}/{}", folder, file_name(path)?);
        let data = read_file(path)?;
        let client = lazy_client(&mut self.client, self.timeout)?;

        let response = client
            .post(format!("{}/files/upload", DROPBOX_CONTENT_API))
            .bearer_auth(&self.token)
            .header(
                "Dropbox-API-Arg",
                json!({ "path": target, "mode": "overwrite" }).to_string(),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()?;
        check_status(response)?;

        debug!("Dropbox: uploaded {}", target);
        Ok(())
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("gif") => "image/gif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_shared_link_is_reused() {
        let body = r#"{
            "links": [
                {".tag": "folder", "url": "https://www.dropbox.com/sh/abc", "name": "7"},
                {".tag": "folder", "url": "https://www.dropbox.com/sh/def", "name": "7"}
            ],
            "has_more": false
        }"#;
        let links: DropboxLinks = serde_json::from_str(body).unwrap();
        let link = links.into_first("/booth/7").unwrap();
        assert_eq!(link.url, "https://www.dropbox.com/sh/abc");

        let empty: DropboxLinks = serde_json::from_str(r#"{"links": [], "has_more": false}"#).unwrap();
        let result = empty.into_first("/booth/7");
        assert!(matches!(result, Err(PeripheralError::Upload { details }) if details.contains("/booth/7")));
    }

    #[test]
    fn test_dropbox_folder_for_link() {
        let mut config = crate::config::BoothConfig::default().upload;
        config.dropbox_root = "/booth/".to_string();
        let mut uploader = DropboxUploader::new(&config);
        let folder = uploader.folder_path("7");
        uploader
            .folders
            .insert("https://www.dropbox.com/sh/abc".to_string(), folder);

        assert_eq!(
            uploader.folder_for_link("https://www.dropbox.com/sh/abc").as_deref(),
            Some("/booth/7")
        );
        assert_eq!(uploader.folder_for_link("/booth/8").as_deref(), Some("/booth/8"));
        assert_eq!(uploader.folder_for_link("https://www.dropbox.com/sh/zzz"), None);
    }
}
