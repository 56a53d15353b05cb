use clap::Parser;

#[derive(Parser)]
#[command(name = "playlist-mirror")]
#[command(author = "Utsav Balar")]
#[command(version, about, long_about)]
pub struct Args {
    /// Only sync the targets with these names or playlists (default: all)
    pub targets: Vec<String>,

    /// Ignore the ledger and re-copy or re-convert every file
    #[clap(short, long)]
    pub force: bool,

    /// Show what would be copied, converted and removed without doing it
    #[clap(short = 'n', long)]
    pub dry_run: bool,

    /// Prints a new config file template
    #[clap(long)]
    pub new: bool,

    /// Print the contents of the config file
    #[clap(short, long)]
    pub print: bool,

    /// The path of the config file (default: ~/.config/playlist-mirror/config.ron)
    #[clap(long = "cpath")]
    pub config_path: Option<String>,
}

pub fn get_env_args() -> Args {
    Args::parse()
}
