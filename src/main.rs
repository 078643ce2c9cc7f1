fn main() {
    if let Err(err) = datagrid::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
