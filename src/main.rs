mod cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::CommandLineInterface::load();
    specimen::logging::init(cli.log_level())?;
    cli.run()
}
