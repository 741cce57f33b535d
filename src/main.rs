fn main() {
    if let Err(err) = synthea_parquet::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
