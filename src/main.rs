fn setup_environment() {
    std::env::remove_var("PYTHONHOME");
    std::env::remove_var("PYTHONPATH");
}

fn main() -> std::process::ExitCode {
    setup_environment();
    ytdlp_run_lib::run()
}
