//! Terminal output helpers

mod printer;
pub mod table;

pub use printer::{print_header, print_key_value, print_success, print_warning};
pub use table::render_coverage;
