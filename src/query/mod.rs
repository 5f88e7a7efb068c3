pub mod age;
pub mod compiler;
pub mod dsl;
pub mod form;
pub mod geo;
pub mod tokens;

pub use age::AgeCategory;
pub use dsl::{BoolQuery, DateExpr, Query, Scalar, SortSpec};
pub use form::{FormCriterion, FormFilterSpec, FormKind, FormValue};
pub use geo::GeoPoint;
pub use tokens::{AddressLookup, NearbyLookup, SearchFilters, SearchMode};
