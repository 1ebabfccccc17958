use clap::Parser;
use log::debug;

use clipsearch::Opts;
use clipsearch::cli::SubCommandExtend;
use clipsearch::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    debug!("配置目录: {}", opts.conf_dir.path().display());

    match &opts.subcmd {
        SubCommand::Update(cmd) => cmd.run(&opts).await,
        SubCommand::Search(cmd) => cmd.run(&opts).await,
        SubCommand::Interactive(cmd) => cmd.run(&opts).await,
        SubCommand::Export(cmd) => cmd.run(&opts).await,
        SubCommand::Show(cmd) => cmd.run(&opts).await,
    }
}
