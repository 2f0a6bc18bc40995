//! yoloc server executable.

use dotenvy::dotenv;
use yoloc_core::Settings;
use yoloc_server::{ServeOptions, build_state, serve};

fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env();
    let options = ServeOptions::from_env(&settings).map_err(std::io::Error::other)?;
    let state = build_state(&settings, &options).map_err(std::io::Error::other)?;
    serve(state, &options.host, options.port)
}
