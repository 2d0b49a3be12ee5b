// crates/tracking-client/src/components/mod.rs

pub mod fleet_table;
pub mod status_bar;
