use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[clap(about = "Flies a two-waypoint offboard mission and lands")]
pub struct MainArgs {
    /// The path to the config file for the mission supervisor
    #[clap(long, short)]
    pub config: PathBuf,
}
