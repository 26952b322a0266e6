fn main() {
    scan_motion::cli::run();
}
