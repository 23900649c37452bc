//! Batch extraction of planimetric coordinates from geodetic record sheets.
//!
//! Each identifier's sheet is downloaded, turned into layout-preserving text by an external
//! converter and parsed for its zone, Y, X and orthometric elevation. Jobs run on a worker
//! pool and their rows are appended to one tab-separated file by a single writer thread.

pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod model;
pub mod orchestrator;
pub mod sink;

pub use config::RunConfig;
pub use convert::{Pdf2TxtConverter, TextConverter};
pub use error::{ConvertError, FetchError, JobError, ParseError};
pub use fetch::{HttpRecordFetcher, RecordSource};
pub use layout::{extract_fxyz, normalize};
pub use model::ExtractionResult;
pub use orchestrator::{run, worker_count, RecordPipeline, RunSummary};
pub use sink::{JobProgress, ResultWriter, TsvResultWriter};
