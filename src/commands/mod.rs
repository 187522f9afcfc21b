pub mod archive;
pub mod backup;
pub mod history;
pub mod run;
pub mod stats;

pub use archive::handle_archive;
pub use backup::handle_backup;
pub use history::handle_history;
pub use run::handle_run;
pub use stats::handle_stats;
