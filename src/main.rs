use std::error::Error;
use clap::Parser;
use log::{debug, LevelFilter};
use rsa_transfer::{Config, SILENT};

fn main() -> Result<(), Box<dyn Error>> {
    let mut config = Config::parse();
    let mut logger = env_logger::Builder::new();
    logger.filter_level(LevelFilter::Info).parse_default_env();
    if config.silent { logger.filter_level(LevelFilter::Off); }
    logger.init();
    if !SILENT.is_set().map_err(|e| e.to_string())? {
        SILENT.set(config.silent).map_err(|e| e.to_string())?;
    }
    debug!("Run args: {:?}", config);
    config.run()
}
