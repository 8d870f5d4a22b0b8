//! Post-build checks: store structure and cross-build chart id stability.

pub mod stability;
pub mod structural;

pub use stability::{
    check_chart_id_stability, check_chart_id_stability_at, load_chart_key_map, ChartKey,
    MissingPolicy, StabilitySummary,
};
pub use structural::{validate_structure, validate_structure_at};
