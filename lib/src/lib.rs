mod dataset;
mod error;
pub mod lttb;
mod record;
mod reporters;
mod segment;
mod series;

pub use dataset::*;
pub use error::{Error, Result};
pub use lttb::{downsample, downsample_with, lttb_indices, Threshold};
pub use record::*;
pub use reporters::*;
pub use segment::*;
pub use series::*;
