// Entrypoint for the CLI application.
// - Installs env_logger (`RUST_LOG` overrides the default `info` level).
// - Reads the environment once and hands everything to the UI loop.

use volume_uploader::api::HttpConnector;
use volume_uploader::config::{self, AppEnvironment};
use volume_uploader::logging::Logger;
use volume_uploader::ui::{main_menu, App};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();
    let logger = Logger::global();

    let env = AppEnvironment::from_env();
    let headers = config::headers_from_env();
    config::log_startup(&logger, &env, &headers);

    // Blocks until the user exits.
    main_menu(App::new(env, headers, HttpConnector, &logger))?;
    Ok(())
}
