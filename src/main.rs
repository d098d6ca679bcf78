fn main() {
    #[cfg(feature = "cli")]
    ipsy::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("ipsy: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
