pub mod address;
pub mod kpi;
pub mod pivot;
pub mod result;
pub mod spec;

pub use pivot::{flatten_rows, fold_rows, PivotDimension, NOT_AVAILABLE};
pub use result::{AggregationResult, AggregationResults, Bucket};
pub use spec::{AggregationKind, AggregationMap, AggregationSpec, CalendarInterval};
