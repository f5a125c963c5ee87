fn main() -> std::process::ExitCode {
    clinimetrics_lib::run()
}
