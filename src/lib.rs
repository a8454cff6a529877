// Copyright: Lastmile Dashboard contributors
// Route shape synthesis for the last-mile delivery dashboard

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::op_ref
)]

pub mod config;
pub mod demo_data;
pub mod geo_math;
pub mod kpi;
pub mod optimise;
pub mod palette;
pub mod render;
pub mod road_snap;
pub mod session;
pub mod shape_synthesis;

#[cfg(test)]
mod test_end_to_end;
