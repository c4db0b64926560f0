//! CLI formatting utilities.
//!
//! Colors, headers, tables and progress reporting shared by the commands.

mod headers;
mod output;
mod progress;
mod status;
mod tables;

pub use headers::{print_section_header, SectionStyle};
pub use output::{format_duration, print_key_value, print_summary_box};
pub use progress::create_task_progress;
pub use status::{print_success, print_warning};
pub use tables::print_entry_point_table;
