fn main() -> std::process::ExitCode {
    sumgr_lib::run()
}
