fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    perch::cli::run_cli(args);
    // 모든 종료 경로에서 종료 코드 0
    std::process::exit(0);
}
