//! KiCad-specific S-expression helpers.
//!
//! - [`props`] - `(tag value)` queries and in-place edits
//! - [`lib_table`] - `fp_lib_table` / `sym_lib_table` files

pub mod lib_table;
pub mod props;

pub use lib_table::{LibTableEntry, append_lib_table_entry, format_lib_table, parse_lib_table};
pub use props::{
    child_list, number_list, property_value, remove_children, set_child, set_property,
    string_prop,
};
