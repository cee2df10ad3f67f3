fn main() {
    if let Err(err) = esg_rollup::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
