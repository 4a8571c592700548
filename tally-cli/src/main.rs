use anyhow::Result;
use tally_cli::app;

fn main() -> Result<()> {
    app::run()
}
