pub mod backend;
pub mod clipboard;
pub mod desktop_notifier;
pub mod filename;
pub mod notify;
pub mod process;
pub mod reveal;
pub mod url_parser;
pub mod ytdlp;
