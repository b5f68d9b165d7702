//! Prints the registration setting actions for one configure pass as JSON.

use clap::Parser;
use farmstead::configure::ConfigureArgs;
use farmstead::{FarmsteadResult, init_logging_for};

fn main() -> FarmsteadResult<()> {
    init_logging_for(None)?;

    let args = ConfigureArgs::parse();
    let actions = args.plan()?;
    println!("{}", serde_json::to_string_pretty(&actions)?);
    Ok(())
}
