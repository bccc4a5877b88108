pub mod datasets;
pub mod table;
