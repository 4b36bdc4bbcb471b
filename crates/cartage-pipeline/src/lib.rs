#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Stateful selection-and-pipeline engine for aged-file archiving and
//! storage-deal submission.
//!
//! Layout: `cursor.rs` (durable resume pointer), `scanner.rs` (eligibility
//! scan), `sequence.rs` (archive numbering and retention), `archive.rs` +
//! `crypt.rs` (tar packaging and chunked encryption), `deal.rs` (provider
//! sharding and command rendering), `service.rs` (the orchestrating state
//! machine).

pub mod archive;
pub mod crypt;
pub mod cursor;
pub mod deal;
pub mod error;
pub mod model;
pub mod scanner;
pub mod sequence;
pub mod service;

pub use cursor::CursorStore;
pub use error::{PipelineError, PipelineResult};
pub use model::{ArchiveSlot, CandidateFile, Cursor, RunOutcome, Selection, StageKind};
pub use scanner::Scanner;
pub use service::PipelineService;
