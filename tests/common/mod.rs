//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{admin, good, ScriptedSource, TestEngine};
//!
//! #[tokio::test(flavor = "multi_thread")]
//! async fn test_import() {
//!     let test = TestEngine::new(ScriptedSource::new().with_catalog_archive("a", vec![good(1)]));
//!     let id = test.engine.start_data_import(&admin(), false).await.unwrap();
//!     let job = test.wait_for_terminal(id).await;
//! }
//! ```

mod constants;
mod engine;
mod fixtures;

#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use engine::{admin, reader, RecordingNotifier, TestEngine};
#[allow(unused_imports)]
pub use fixtures::*;
