use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("threadcard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turn forum links in chat messages into summary cards")
        .arg(clap::arg!([MESSAGE] ... "Chat messages to handle, or '-' to read one message per line from stdin"))
        .arg(clap::arg!(--session <ID> "Session the messages come from").default_value("console"))
        .arg(
            clap::arg!(-c --config <FILE> "Config file")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            clap::arg!(--cache_dir <DIR> "Directory for downloaded media and rendered cards")
                .value_name("DIR")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--proxy <URL> "Proxy for every site"))
        .arg(clap::arg!(--timeout <SECS> "HTTP timeout in seconds"))
        .arg(clap::arg!(--forward_threshold <N> "Content count above which media are bundled into one forward"))
        .arg(clap::arg!(--json "Print outbound messages as JSON lines"))
        .arg(clap::arg!(-v --verbose "Enable debug logging"));

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "threadcard", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "threadcard", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "threadcard", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "threadcard", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
