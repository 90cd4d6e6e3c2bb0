pub use ytdlp_run_core::models::settings::*;
