//! Scripted stand-ins for the remote service and the display.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};

use drive_photo_frame::credentials::Credentials;
use drive_photo_frame::error::{Error, Result};
use drive_photo_frame::events::DisplayFrame;
use drive_photo_frame::remote::{FilePage, RemoteFile, RemotePhotoService, RemoteRequest, RemoteResponse};
use drive_photo_frame::tasks::slideshow::DisplaySink;
use drive_photo_frame::token_store::{Token, TokenGrant};

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Connectivity,
    Unauthorized,
    Http(u16),
}

impl Failure {
    fn into_error(self, operation: &str) -> Error {
        match self {
            Failure::Connectivity => Error::connectivity(operation, "connection refused"),
            Failure::Unauthorized => Error::Unauthorized,
            Failure::Http(status) => Error::Http {
                operation: operation.to_string(),
                status,
                body: String::new(),
            },
        }
    }
}

/// In-memory folder with scripted failures.
///
/// Listing is paginated by the requested page size; the continuation token is
/// the offset of the next page. Only tokens in `accepted` authorize calls.
#[derive(Default)]
pub struct ScriptedService {
    files: Vec<RemoteFile>,
    media: HashMap<String, Vec<u8>>,
    accepted: Mutex<HashSet<String>>,
    list_failures: Mutex<VecDeque<Failure>>,
    /// 1-based list call numbers that fail with a connection error.
    list_drops: Mutex<HashSet<usize>>,
    download_failures: Mutex<VecDeque<Failure>>,
    refresh_results: Mutex<VecDeque<Result<TokenGrant>>>,
    /// When set, freshly minted tokens are not accepted either.
    reject_renewed: bool,
    pub list_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub seen_refresh_tokens: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        let svc = Self::default();
        svc.accept("valid-access");
        svc
    }

    pub fn with_photo(mut self, id: &str, bytes: Vec<u8>) -> Self {
        self.files.push(RemoteFile {
            id: id.to_string(),
            name: format!("{id}.png"),
        });
        self.media.insert(id.to_string(), bytes);
        self
    }

    pub fn with_file_ids(mut self, ids: &[&str]) -> Self {
        for id in ids {
            self.files.push(RemoteFile {
                id: id.to_string(),
                name: format!("{id}.jpg"),
            });
        }
        self
    }

    pub fn fail_lists(self, failure: Failure, times: usize) -> Self {
        self.list_failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat_n(failure, times));
        self
    }

    pub fn drop_list_call(self, call: usize) -> Self {
        self.list_drops.lock().unwrap().insert(call);
        self
    }

    pub fn fail_downloads(self, failure: Failure, times: usize) -> Self {
        self.download_failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat_n(failure, times));
        self
    }

    pub fn refresh_with(self, result: Result<TokenGrant>) -> Self {
        self.queue_refresh(result);
        self
    }

    pub fn queue_refresh(&self, result: Result<TokenGrant>) {
        self.refresh_results.lock().unwrap().push_back(result);
    }

    pub fn rejecting_renewed_tokens(mut self) -> Self {
        self.reject_renewed = true;
        self
    }

    pub fn revoke_all(&self) {
        self.accepted.lock().unwrap().clear();
    }

    pub fn accept(&self, token: &str) {
        self.accepted.lock().unwrap().insert(token.to_string());
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn list(&self, page_token: Option<&str>, page_size: Option<u32>) -> FilePage {
        let size = page_size.map_or(DEFAULT_PAGE_SIZE, |s| s as usize).max(1);
        let start: usize = page_token.map_or(0, |t| t.parse().expect("offset token"));
        let end = (start + size).min(self.files.len());
        FilePage {
            files: self.files[start..end].to_vec(),
            next_page_token: (end < self.files.len()).then(|| end.to_string()),
        }
    }
}

#[async_trait]
impl RemotePhotoService for ScriptedService {
    async fn send(&self, request: &RemoteRequest, access_token: &str) -> Result<RemoteResponse> {
        let operation = request.operation();
        match request {
            RemoteRequest::ListFiles {
                page_token,
                page_size,
                ..
            } => {
                let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(failure) = self.list_failures.lock().unwrap().pop_front() {
                    return Err(failure.into_error(operation));
                }
                if self.list_drops.lock().unwrap().contains(&call) {
                    return Err(Failure::Connectivity.into_error(operation));
                }
                if !self.accepted.lock().unwrap().contains(access_token) {
                    return Err(Error::Unauthorized);
                }
                Ok(RemoteResponse::Files(
                    self.list(page_token.as_deref(), *page_size),
                ))
            }
            RemoteRequest::Download { file_id } => {
                self.download_calls.fetch_add(1, Ordering::SeqCst);
                if let Some(failure) = self.download_failures.lock().unwrap().pop_front() {
                    return Err(failure.into_error(operation));
                }
                if !self.accepted.lock().unwrap().contains(access_token) {
                    return Err(Error::Unauthorized);
                }
                match self.media.get(file_id) {
                    Some(bytes) => Ok(RemoteResponse::Media(Bytes::from(bytes.clone()))),
                    None => Err(Failure::Http(404).into_error(operation)),
                }
            }
        }
    }

    async fn refresh(&self, _credentials: &Credentials, refresh_token: &str) -> Result<TokenGrant> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_refresh_tokens
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        let scripted = self.refresh_results.lock().unwrap().pop_front();
        let grant = match scripted {
            Some(result) => result?,
            None => TokenGrant {
                access_token: format!("renewed-access-{n}"),
                expires_in: Some(3600),
                ..TokenGrant::default()
            },
        };
        if !self.reject_renewed {
            self.accept(&grant.access_token);
        }
        Ok(grant)
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        token_uri: "https://oauth2.example/token".to_string(),
    }
}

pub fn token(access: &str) -> Token {
    Token::new(access, "refresh-1")
}

/// Solid-colour PNG; the red channel identifies the photo in recorded frames.
pub fn solid_png(width: u32, height: u32, tag: u8) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([tag, 10, 20, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Records the identifying red channel of every presented frame.
#[derive(Clone)]
pub struct RecordingSink {
    size: (u32, u32),
    pub shown: Arc<Mutex<Vec<u8>>>,
}

impl RecordingSink {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            shown: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn shown(&self) -> Vec<u8> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl DisplaySink for RecordingSink {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    async fn present(&mut self, frame: DisplayFrame) -> Result<()> {
        assert_eq!(frame.dimensions(), self.size, "partial frame submitted");
        self.shown.lock().unwrap().push(frame.pixels[0]);
        Ok(())
    }
}
