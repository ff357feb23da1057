//! Editing state for one product's image list.
//!
//! An [`EditSession`] owns the ordered images of the product being edited:
//! already-stored images are [`SessionEntry::Persisted`] URLs, and newly
//! selected ones are [`SessionEntry::Pending`] compressed payloads with a live
//! preview handle. Order is display order, and index 0 is the cover image.
//!
//! [`EditSession::commit`] uploads pending entries in order and swaps each one
//! for its public URL. It stops at the first failure, so the product record is
//! never saved with a missing or placeholder URL. Entries uploaded before the
//! failure stay persisted, and a retry only re-sends what is still pending.
//!
//! Every preview handle the session creates is revoked exactly once: on a
//! successful upload, on [`remove`](EditSession::remove), on
//! [`abandon`](EditSession::abandon), or when the session is dropped.

use crate::preview::{PreviewHandle, PreviewRegistry};
use crate::types::CompressedImage;
use crate::upload::{BatchProgressFn, ProgressFn, UploadClient, UploadError, UploadResult};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No image at position {index} (session has {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("A product needs at least one image")]
    Empty,
    #[error("Failed to upload image {} ({filename}): {source}", .index + 1)]
    Upload {
        index: usize,
        filename: String,
        #[source]
        source: UploadError,
    },
}

#[derive(Debug)]
pub enum SessionEntry {
    /// Already in storage.
    Persisted { url: String },
    /// Selected in this session, not uploaded yet.
    Pending {
        handle: PreviewHandle,
        image: CompressedImage,
        filename: String,
    },
}

impl SessionEntry {
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionEntry::Pending { .. })
    }

    /// What a UI would display: the public URL, or the preview handle.
    pub fn display_ref(&self) -> String {
        match self {
            SessionEntry::Persisted { url } => url.clone(),
            SessionEntry::Pending { handle, .. } => handle.to_string(),
        }
    }
}

pub struct EditSession {
    previews: PreviewRegistry,
    entries: Vec<SessionEntry>,
    removed_urls: Vec<String>,
}

impl EditSession {
    /// Empty session, as when creating a new product.
    pub fn new(previews: PreviewRegistry) -> Self {
        Self {
            previews,
            entries: Vec::new(),
            removed_urls: Vec::new(),
        }
    }

    /// Session over a product's existing image URLs, in stored order.
    pub fn from_urls(previews: PreviewRegistry, urls: impl IntoIterator<Item = String>) -> Self {
        let mut session = Self::new(previews);
        session.entries = urls
            .into_iter()
            .map(|url| SessionEntry::Persisted { url })
            .collect();
        session
    }

    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    /// Persisted URLs dropped during this session. Deleting them from storage
    /// is up to the caller, once the product record is saved.
    pub fn removed_urls(&self) -> &[String] {
        &self.removed_urls
    }

    /// Append a compressed image and create its preview.
    pub fn add_pending(
        &mut self,
        image: CompressedImage,
        filename: impl Into<String>,
    ) -> PreviewHandle {
        let handle = self.previews.create_preview(image.bytes.clone());
        self.entries.push(SessionEntry::Pending {
            handle,
            image,
            filename: filename.into(),
        });
        handle
    }

    pub fn add_persisted(&mut self, url: impl Into<String>) {
        self.entries.push(SessionEntry::Persisted { url: url.into() });
    }

    fn check_index(&self, index: usize) -> Result<(), SessionError> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(SessionError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            })
        }
    }

    /// Drop the entry at `index`, revoking its preview if it had one.
    pub fn remove(&mut self, index: usize) -> Result<SessionEntry, SessionError> {
        self.check_index(index)?;
        let entry = self.entries.remove(index);
        match &entry {
            SessionEntry::Pending { handle, .. } => {
                self.previews.revoke_preview(*handle);
            }
            SessionEntry::Persisted { url } => self.removed_urls.push(url.clone()),
        }
        Ok(entry)
    }

    /// Move the entry at `from` so it ends up at `to`.
    pub fn move_entry(&mut self, from: usize, to: usize) -> Result<(), SessionError> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from != to {
            let entry = self.entries.remove(from);
            self.entries.insert(to, entry);
        }
        Ok(())
    }

    /// Make the entry at `index` the cover image.
    pub fn set_cover(&mut self, index: usize) -> Result<(), SessionError> {
        self.move_entry(index, 0)
    }

    /// Revoke every pending preview of this session and discard the session.
    /// Returns how many previews were released.
    pub fn abandon(mut self) -> usize {
        self.release_pending()
    }

    fn release_pending(&mut self) -> usize {
        let mut released = 0;
        for entry in self.entries.drain(..) {
            if let SessionEntry::Pending { handle, .. } = entry {
                if self.previews.revoke_preview(handle) {
                    released += 1;
                }
            }
        }
        if released > 0 {
            debug!(released, "edit session released pending previews");
        }
        released
    }

    /// Final URL list, if nothing is pending.
    pub fn urls(&self) -> Option<Vec<String>> {
        self.entries
            .iter()
            .map(|e| match e {
                SessionEntry::Persisted { url } => Some(url.clone()),
                SessionEntry::Pending { .. } => None,
            })
            .collect()
    }

    /// Upload pending entries in order and return the complete URL list.
    ///
    /// `on_progress` receives `(global_percent, current_pending_item, pending_total)`.
    pub async fn commit(
        &mut self,
        client: &UploadClient,
        on_progress: Option<BatchProgressFn>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<String>, SessionError> {
        if self.entries.is_empty() {
            return Err(SessionError::Empty);
        }

        let total = self.pending_count();
        let mut done = 0;

        for index in 0..self.entries.len() {
            let SessionEntry::Pending {
                handle,
                image,
                filename,
            } = &self.entries[index]
            else {
                continue;
            };
            let handle = *handle;
            let filename = filename.clone();

            let item_progress = on_progress.clone().map(|cb| -> ProgressFn {
                Arc::new(move |pct: f64| {
                    cb(((done as f64 + pct / 100.0) / total as f64) * 100.0, done + 1, total)
                })
            });

            let url = client
                .upload_image(image, &filename, item_progress, cancel)
                .await
                .and_then(UploadResult::into_url)
                .map_err(|source| SessionError::Upload {
                    index,
                    filename: filename.clone(),
                    source,
                })?;

            self.previews.revoke_preview(handle);
            self.entries[index] = SessionEntry::Persisted { url };
            done += 1;
        }

        info!(images = self.entries.len(), uploaded = done, "edit session committed");
        // Every entry is persisted at this point
        Ok(self.urls().unwrap_or_default())
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        self.release_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::OutputFormat;
    use bytes::Bytes;

    fn image(tag: &'static [u8]) -> CompressedImage {
        CompressedImage {
            bytes: Bytes::from_static(tag),
            format: OutputFormat::Webp,
            width: 10,
            height: 10,
            source_width: 10,
            source_height: 10,
            source_len: 100,
        }
    }

    fn refs(session: &EditSession) -> Vec<String> {
        session.entries().iter().map(SessionEntry::display_ref).collect()
    }

    #[test]
    fn from_urls_keeps_order() {
        let session = EditSession::from_urls(
            PreviewRegistry::new(),
            vec!["https://a/1.webp".to_string(), "https://a/2.webp".to_string()],
        );
        assert_eq!(session.urls().unwrap(), vec!["https://a/1.webp", "https://a/2.webp"]);
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn add_pending_creates_preview() {
        let previews = PreviewRegistry::new();
        let mut session = EditSession::new(previews.clone());
        let handle = session.add_pending(image(b"one"), "one.webp");

        assert!(previews.is_live(handle));
        assert_eq!(previews.get(handle).unwrap(), Bytes::from_static(b"one"));
        assert_eq!(session.pending_count(), 1);
        assert!(session.urls().is_none());
    }

    #[test]
    fn remove_pending_revokes_preview() {
        let previews = PreviewRegistry::new();
        let mut session = EditSession::new(previews.clone());
        let keep = session.add_pending(image(b"a"), "a.webp");
        let drop_me = session.add_pending(image(b"b"), "b.webp");

        session.remove(1).unwrap();
        assert!(!previews.is_live(drop_me));
        assert!(previews.is_live(keep));
        assert!(session.removed_urls().is_empty());
    }

    #[test]
    fn remove_persisted_records_url() {
        let mut session = EditSession::from_urls(
            PreviewRegistry::new(),
            vec!["https://a/1.webp".to_string()],
        );
        session.remove(0).unwrap();
        assert_eq!(session.removed_urls(), ["https://a/1.webp".to_string()]);
        assert!(session.is_empty());
    }

    #[test]
    fn remove_out_of_range() {
        let mut session = EditSession::new(PreviewRegistry::new());
        assert!(matches!(
            session.remove(0),
            Err(SessionError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn move_and_cover() {
        let mut session = EditSession::from_urls(
            PreviewRegistry::new(),
            ["a", "b", "c", "d"].map(String::from),
        );
        session.move_entry(0, 2).unwrap();
        assert_eq!(refs(&session), ["b", "c", "a", "d"]);

        session.set_cover(3).unwrap();
        assert_eq!(refs(&session), ["d", "b", "c", "a"]);

        session.move_entry(1, 1).unwrap();
        assert_eq!(refs(&session), ["d", "b", "c", "a"]);

        assert!(session.move_entry(0, 4).is_err());
    }

    #[test]
    fn abandon_revokes_only_own_previews() {
        let previews = PreviewRegistry::new();
        let outside = previews.create_preview(Bytes::new());

        let mut session = EditSession::new(previews.clone());
        session.add_persisted("https://a/1.webp");
        session.add_pending(image(b"a"), "a.webp");
        session.add_pending(image(b"b"), "b.webp");

        assert_eq!(session.abandon(), 2);
        assert_eq!(previews.live_count(), 1);
        assert!(previews.is_live(outside));
    }

    #[test]
    fn drop_releases_pending() {
        let previews = PreviewRegistry::new();
        {
            let mut session = EditSession::new(previews.clone());
            session.add_pending(image(b"a"), "a.webp");
            assert_eq!(previews.live_count(), 1);
        }
        assert_eq!(previews.live_count(), 0);
    }

    #[tokio::test]
    async fn commit_empty_session_is_error() {
        let client = UploadClient::with_endpoint(
            "http://127.0.0.1:9",
            "",
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let mut session = EditSession::new(PreviewRegistry::new());
        assert!(matches!(
            session.commit(&client, None, None).await,
            Err(SessionError::Empty)
        ));
    }

    #[tokio::test]
    async fn commit_with_only_persisted_needs_no_network() {
        // Port 9 (discard) is never contacted: nothing is pending
        let client = UploadClient::with_endpoint(
            "http://127.0.0.1:9",
            "",
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let mut session =
            EditSession::from_urls(PreviewRegistry::new(), ["x", "y"].map(String::from));
        assert_eq!(session.commit(&client, None, None).await.unwrap(), ["x", "y"]);
    }

    #[test]
    fn upload_error_message_names_item() {
        let err = SessionError::Upload {
            index: 1,
            filename: "mesa.webp".into(),
            source: UploadError::Http {
                status: 500,
                message: "Internal Server Error".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("image 2"));
        assert!(msg.contains("mesa.webp"));
    }
}
