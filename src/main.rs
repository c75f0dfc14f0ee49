fn main() {
    std::process::exit(ascmhl::cli::run());
}
