fn main() {
    map_complement::cli::run();
}
