pub mod config;
pub mod error;
pub mod subsetter;

pub use config::{parse_bracket_list, read_table, subset_from_table, BatchRow};
pub use error::SubsetError;
pub use subsetter::{
    load_features, subset_file, write_feature_collection, Bbox, CrsSpec, SubsetFeature,
    SubsetRequest, SubsetSummary,
};
