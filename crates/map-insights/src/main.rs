mod logging;
mod replay;
mod settings;

use clap::Parser;
use settings::Settings;

fn main() -> Result<(), replay::ReplayError> {
    logging::setup_logging();
    let settings = Settings::parse();
    tracing::debug!("Settings: {:?}", settings);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(replay::run(settings))
}
