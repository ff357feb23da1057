//! # Catalog Images
//!
//! Client-side image preparation and upload for the furniture catalog admin.
//! Product photos picked by an editor are validated, scaled down to fit a
//! bounding box, re-encoded to a compact web format, given a collision-resistant
//! name, and uploaded to a storage gateway that answers with the public URL.
//! Only those URLs are persisted with the product record.
//!
//! # Architecture: Validate, Compress, Upload
//!
//! ```text
//! RawImageInput ──validate──▶ ok? ──resize + encode──▶ CompressedImage
//!                                                           │
//!                                 name ◀────────────────────┘
//!                                   │
//!                                   └──POST multipart──▶ gateway ──▶ public URL
//! ```
//!
//! Each stage is usable on its own. [`compress::Compressor`] never touches the
//! network, [`upload::UploadClient`] never decodes pixels, and
//! [`pipeline::ImagePipeline`] glues the two with staged progress.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`validate`] | Media-type, size and format checks with user-facing messages |
//! | [`imaging`] | Bounding-box geometry, the codec backend trait, the pure-Rust codec |
//! | [`compress`] | Single and batch compression on blocking threads, with cancellation |
//! | [`naming`] | `{base}-{timestamp}-{random}.{ext}` names and storage keys |
//! | [`upload`] | Multipart upload, delete and existence checks against the gateway |
//! | [`preview`] | Registry of revocable preview handles for not-yet-uploaded images |
//! | [`pipeline`] | Prepare-then-upload flow with two-stage progress, plus thumbnails |
//! | [`session`] | Ordered image list of one product edit: add, remove, reorder, commit |
//! | [`config`] | `config.toml` loading, stock defaults and validation |
//! | [`types`] | Shared value types: raw inputs, compression options, compressed images |
//! | [`inputs`] | Collecting image files from command-line paths |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Aspect Ratio Is Never Changed
//!
//! [`imaging::fit_within_bounds`] only ever scales down, and clamps width first
//! and then height, so both bounds hold and the ratio survives up to rounding.
//! Images already inside the box keep their exact size; re-encoding still happens
//! so every stored file has the configured format.
//!
//! ## Codec Behind a Trait
//!
//! Decoding and encoding go through [`imaging::ImageBackend`]. The production
//! [`imaging::RustBackend`] uses the `image` crate (Lanczos3) and `webp`; tests
//! use a recording mock so orchestration logic is checked without pixels.
//!
//! ## Explicit Resource Lifecycle
//!
//! Every preview handle is revoked exactly once: on removal from the session, on
//! successful upload, when a [`preview::PreviewGuard`] drops, or when the session
//! is abandoned. Revoking twice is a no-op.
//!
//! ## Sequential Batches
//!
//! Batch compression and uploads run one item at a time, in input order. Progress
//! callbacks are therefore monotonic and results line up with inputs by index.
//!
//! ## Cancellation Everywhere
//!
//! Every long-running operation takes an optional
//! [`tokio_util::sync::CancellationToken`]. A cancelled item resolves to a
//! `Cancelled` error instead of hanging or being silently dropped.

pub mod compress;
pub mod config;
pub mod imaging;
pub mod inputs;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod preview;
pub mod session;
pub mod types;
pub mod upload;
pub mod validate;
