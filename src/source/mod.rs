pub mod row_source;

pub use row_source::{pks_for_rows, Cursor, FetchResult, RowSource, SourceError};
