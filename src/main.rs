fn main() {
    if let Err(err) = addr_remap::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
