//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `list`   | `List`           |
//! | `config` | `Config`         |
//! | `report` | `Report`         |

pub mod config;
pub mod list;
pub mod report;
pub mod run;

pub use config::cmd_config;
pub use list::cmd_list;
pub use report::cmd_report;
pub use run::{RunOverrides, cmd_run};
