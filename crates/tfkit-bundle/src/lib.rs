//! # tfkit-bundle
//!
//! Source bundle handling for tfkit:
//! - **Archive codec**: zip packing with path exclusions, extraction with
//!   sub-path rebasing, tar/tar.gz template sources
//! - **Text transcoding**: base64 storage of bundle archives in a property
//! - **Source fetching**: blueprint-relative paths, local paths and HTTP(S)
//!   URLs with basic auth
//! - **Scoped checkout**: materialize the bundle for one driver run and
//!   always repack it afterwards
//!
//! # Examples
//!
//! ```no_run
//! use tfkit_bundle::with_source;
//! use tfkit_core::{OperationContext, Side};
//!
//! async fn list_template(ctx: &OperationContext) -> anyhow::Result<()> {
//!     with_source(ctx, Side::Current, |workspace| async move {
//!         for entry in std::fs::read_dir(&workspace.working_dir)? {
//!             println!("{}", entry?.path().display());
//!         }
//!         Ok(())
//!     })
//!     .await
//! }
//! ```

pub mod archive;
pub mod download;
pub mod encoding;
pub mod fetch;
pub mod filters;
pub mod material;

pub use archive::{
    list_entries, pack_directory, unpack_any, unpack_archive, unpack_tar, ArchiveKind,
};
pub use download::{Credentials, Downloader};
pub use encoding::{decode_text, decode_to_file, encode_bytes, encode_file};
pub use fetch::fetch_source;
pub use filters::ExclusionSet;
pub use material::{
    pack_to_text, unpack_text, with_source, write_backend_file, Checkout, SourceMaterial,
    Workspace,
};
