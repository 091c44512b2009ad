fn main() {
    rpa_cli::init_tracing();
    std::process::exit(rpa_cli::run_cli_from_args(std::env::args_os()));
}
