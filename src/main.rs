fn main() {
    if let Err(err) = roomscan_lib::run() {
        eprintln!("roomscan: {err:#}");
        std::process::exit(1);
    }
}
