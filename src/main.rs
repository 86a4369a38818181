fn main() -> std::process::ExitCode {
    snackgate::run_cli()
}
