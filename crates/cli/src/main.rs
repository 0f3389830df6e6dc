fn main() -> std::process::ExitCode {
    canvass_cli::run()
}
